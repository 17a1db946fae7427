//! Declarative threshold table.
//!
//! One flat list of `(domain, lower bound, level, label, effect)` rules shared
//! by every dashboard. The table is loaded once at startup, validated, and
//! then only read; the classifier walks it without knowing which domain it
//! is looking at.

use crate::error::{EscalationError, Result};
use crate::subject::Domain;
use chrono::{DateTime, FixedOffset, NaiveTime, Offset, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

// ── Level ────────────────────────────────────────────────────────────────────

/// Escalation severity tier. `0` means not yet due; configured rules start
/// at `1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(pub u8);

impl Level {
    pub const NOT_DUE: Level = Level(0);

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_due(self) -> bool {
        self > Level::NOT_DUE
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Effect ───────────────────────────────────────────────────────────────────

/// What reaching a level means for the workflow the backend enforces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Informational only; submissions still allowed.
    #[default]
    None,
    /// A notification goes out.
    Notify,
    /// Submissions are locked until a manual unlock.
    BlockSubmission,
}

// ── Boundary ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryKind {
    Elapsed,
    Cutoff,
}

/// Inclusive lower bound of a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoundarySpec", into = "BoundarySpec")]
pub enum Boundary {
    /// Time elapsed since the subject's reference timestamp.
    Elapsed(TimeDelta),
    /// Wall-clock time of day, compared naively on the same day.
    Cutoff(NaiveTime),
}

impl Boundary {
    pub fn after_days(days: i64) -> Self {
        Boundary::Elapsed(TimeDelta::days(days))
    }

    pub fn after_hours(hours: i64) -> Self {
        Boundary::Elapsed(TimeDelta::hours(hours))
    }

    /// Time-of-day cutoff. Out-of-range input falls back to midnight.
    pub fn cutoff(hour: u32, minute: u32) -> Self {
        Boundary::Cutoff(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
    }

    pub fn kind(&self) -> BoundaryKind {
        match self {
            Boundary::Elapsed(_) => BoundaryKind::Elapsed,
            Boundary::Cutoff(_) => BoundaryKind::Cutoff,
        }
    }

    /// How far `now` is past this bound; negative while not yet reached.
    pub fn distance(
        &self,
        reference: DateTime<Utc>,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> TimeDelta {
        match self {
            Boundary::Elapsed(after) => (now - reference) - *after,
            Boundary::Cutoff(at) => now.with_timezone(&offset).time().signed_duration_since(*at),
        }
    }

    fn sort_key(&self) -> i64 {
        match self {
            Boundary::Elapsed(after) => after.num_milliseconds(),
            Boundary::Cutoff(at) => i64::from(at.num_seconds_from_midnight()) * 1_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BoundarySpec {
    AfterSeconds(i64),
    AfterHours(i64),
    AfterDays(i64),
    Cutoff(String),
}

impl TryFrom<BoundarySpec> for Boundary {
    type Error = String;

    fn try_from(spec: BoundarySpec) -> std::result::Result<Self, Self::Error> {
        let elapsed = |delta: Option<TimeDelta>| {
            delta
                .map(Boundary::Elapsed)
                .ok_or_else(|| "elapsed bound out of range".to_string())
        };
        match spec {
            BoundarySpec::AfterSeconds(secs) => elapsed(TimeDelta::try_seconds(secs)),
            BoundarySpec::AfterHours(hours) => elapsed(TimeDelta::try_hours(hours)),
            BoundarySpec::AfterDays(days) => elapsed(TimeDelta::try_days(days)),
            BoundarySpec::Cutoff(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M"))
                .map(Boundary::Cutoff)
                .map_err(|_| format!("invalid cutoff '{raw}', expected HH:MM")),
        }
    }
}

impl From<Boundary> for BoundarySpec {
    fn from(boundary: Boundary) -> Self {
        match boundary {
            Boundary::Elapsed(after) => BoundarySpec::AfterSeconds(after.num_seconds()),
            Boundary::Cutoff(at) => BoundarySpec::Cutoff(at.format("%H:%M:%S").to_string()),
        }
    }
}

// ── ThresholdRule ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub domain: Domain,
    pub lower_bound_inclusive: Boundary,
    pub level: Level,
    pub label: String,
    #[serde(default)]
    pub effect: Effect,
}

impl ThresholdRule {
    pub fn new(domain: Domain, bound: Boundary, level: u8, label: impl Into<String>) -> Self {
        Self {
            domain,
            lower_bound_inclusive: bound,
            level: Level(level),
            label: label.into(),
            effect: Effect::None,
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }
}

// ── ThresholdTable ───────────────────────────────────────────────────────────

/// The static rule set. Rules are kept grouped by domain and ascending by
/// bound, whatever order they were supplied in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThresholdTable {
    rules: Vec<ThresholdRule>,
    utc_offset: FixedOffset,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableDocument {
    #[serde(default)]
    utc_offset: Option<String>,
    rules: Vec<ThresholdRule>,
}

impl ThresholdTable {
    pub fn new(mut rules: Vec<ThresholdRule>, utc_offset: FixedOffset) -> Self {
        rules.sort_by_key(|rule| (rule.domain, rule.lower_bound_inclusive.sort_key()));
        Self { rules, utc_offset }
    }

    /// Built-in thresholds, constructed once per process.
    pub fn builtin() -> &'static ThresholdTable {
        static BUILTIN: OnceLock<ThresholdTable> = OnceLock::new();
        BUILTIN.get_or_init(builtin_table)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: TableDocument =
            serde_json::from_str(json).map_err(|e| EscalationError::InvalidTable(e.to_string()))?;
        let utc_offset = match doc.utc_offset.as_deref() {
            Some(raw) => parse_utc_offset(raw).ok_or_else(|| {
                EscalationError::InvalidTable(format!("invalid utc_offset '{raw}'"))
            })?,
            None => utc(),
        };
        let table = Self::new(doc.rules, utc_offset);
        table.validate(&Domain::ALL)?;
        Ok(table)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| EscalationError::TableUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let table = Self::from_json_str(&json)?;
        info!(path = %path.display(), rules = table.rules.len(), "threshold table loaded");
        Ok(table)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let doc = TableDocument {
            utc_offset: Some(format_utc_offset(self.utc_offset)),
            rules: self.rules.clone(),
        };
        serde_json::to_string_pretty(&doc).map_err(|e| EscalationError::InvalidTable(e.to_string()))
    }

    pub fn with_utc_offset(mut self, utc_offset: FixedOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }

    /// Offset used to read wall-clock time for cutoff rules.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Rules of one domain, ascending by bound. Empty when unconfigured.
    pub fn rules_for(&self, domain: Domain) -> &[ThresholdRule] {
        let start = self.rules.partition_point(|rule| rule.domain < domain);
        let end = self.rules.partition_point(|rule| rule.domain <= domain);
        &self.rules[start..end]
    }

    pub fn domains(&self) -> BTreeSet<Domain> {
        self.rules.iter().map(|rule| rule.domain).collect()
    }

    /// Startup check: every `required` domain configured, and each domain's
    /// rules share one boundary kind with strictly increasing bounds and
    /// levels.
    pub fn validate(&self, required: &[Domain]) -> Result<()> {
        for domain in required {
            if self.rules_for(*domain).is_empty() {
                return Err(EscalationError::DomainNotConfigured(*domain));
            }
        }

        for domain in self.domains() {
            let rules = self.rules_for(domain);
            let kind = rules[0].lower_bound_inclusive.kind();

            for rule in rules {
                if rule.lower_bound_inclusive.kind() != kind {
                    return Err(invalid(domain, "mixes elapsed and cutoff bounds"));
                }
                if !rule.level.is_due() {
                    return Err(invalid(domain, "levels start at 1"));
                }
                if rule.label.trim().is_empty() {
                    return Err(invalid(domain, "rule label is empty"));
                }
                if let Boundary::Elapsed(after) = rule.lower_bound_inclusive {
                    if after < TimeDelta::zero() {
                        return Err(invalid(domain, "elapsed bound is negative"));
                    }
                }
            }

            for pair in rules.windows(2) {
                let lower = pair[0].lower_bound_inclusive.sort_key();
                let upper = pair[1].lower_bound_inclusive.sort_key();
                if lower >= upper {
                    return Err(invalid(domain, "bounds are not strictly increasing"));
                }
                if pair[0].level >= pair[1].level {
                    return Err(invalid(domain, "levels do not increase with the bound"));
                }
            }
        }

        Ok(())
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

fn invalid(domain: Domain, reason: &str) -> EscalationError {
    EscalationError::InvalidTable(format!("{domain}: {reason}"))
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn builtin_table() -> ThresholdTable {
    use Domain::{Attendance, Task, Timesheet};

    ThresholdTable::new(
        vec![
            ThresholdRule::new(Task, Boundary::after_days(0), 1, "Warning (0–3 days)"),
            ThresholdRule::new(Task, Boundary::after_days(3), 2, "Urgent (3–5 days)")
                .with_effect(Effect::Notify),
            ThresholdRule::new(Task, Boundary::after_days(5), 3, "Critical (5+ days)")
                .with_effect(Effect::Notify),
            ThresholdRule::new(Timesheet, Boundary::cutoff(20, 0), 1, "Warning"),
            ThresholdRule::new(Timesheet, Boundary::cutoff(20, 5), 2, "Urgent")
                .with_effect(Effect::Notify),
            ThresholdRule::new(Timesheet, Boundary::cutoff(20, 10), 3, "Locked")
                .with_effect(Effect::BlockSubmission),
            ThresholdRule::new(Attendance, Boundary::after_hours(0), 1, "Pending review"),
            ThresholdRule::new(Attendance, Boundary::after_hours(24), 2, "Overdue review")
                .with_effect(Effect::Notify),
            ThresholdRule::new(Attendance, Boundary::after_hours(72), 3, "Escalated to HR")
                .with_effect(Effect::Notify),
        ],
        utc(),
    )
}

/// Parses `+05:30`, `-0800`, `+02` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Some(utc());
    }

    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60))
}

pub fn format_utc_offset(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{sign}{:02}:{:02}", secs / 3_600, (secs % 3_600) / 60)
}
