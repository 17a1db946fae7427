use chrono::FixedOffset;
use escalation_core::thresholds::{format_utc_offset, parse_utc_offset};
use escalation_core::{EscalationError, ThresholdTable};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
pub const DEFAULT_REFRESH_SECS: u64 = 15;
pub const MIN_REFRESH_SECS: u64 = 5;
pub const MAX_REFRESH_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("OFFISPHERE_REFRESH_SECS must be a whole number of seconds, got {0:?}")]
    RefreshSecs(String),
    #[error("OFFISPHERE_UTC_OFFSET must look like +05:30, got {0:?}")]
    UtcOffset(String),
    #[error(transparent)]
    Table(#[from] EscalationError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoardConfig {
    pub snapshot_dir: PathBuf,
    pub thresholds_path: Option<PathBuf>,
    pub refresh_interval: Duration,
    /// Overrides the table's own offset when set.
    pub utc_offset: Option<FixedOffset>,
    pub once: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            thresholds_path: None,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            utc_offset: None,
            once: false,
        }
    }
}

impl BoardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BoardConfig::from_env`] with variables supplied by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let refresh_secs = match var("OFFISPHERE_REFRESH_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::RefreshSecs(raw))?,
            None => DEFAULT_REFRESH_SECS,
        };
        let utc_offset = match var("OFFISPHERE_UTC_OFFSET") {
            Some(raw) => Some(parse_utc_offset(&raw).ok_or(ConfigError::UtcOffset(raw))?),
            None => None,
        };

        Ok(Self {
            snapshot_dir: var("OFFISPHERE_SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            thresholds_path: var("OFFISPHERE_THRESHOLDS").map(PathBuf::from),
            refresh_interval: Duration::from_secs(
                refresh_secs.clamp(MIN_REFRESH_SECS, MAX_REFRESH_SECS),
            ),
            utc_offset,
            once: var("OFFISPHERE_ONCE")
                .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
        })
    }

    /// The configured table file, or the built-in table, with the offset
    /// override applied.
    pub fn load_table(&self) -> Result<ThresholdTable, ConfigError> {
        let table = match &self.thresholds_path {
            Some(path) => ThresholdTable::from_path(path)?,
            None => ThresholdTable::builtin().clone(),
        };
        Ok(match self.utc_offset {
            Some(offset) => {
                tracing::info!(offset = %format_utc_offset(offset), "cutoff offset overridden");
                table.with_utc_offset(offset)
            }
            None => table,
        })
    }
}
