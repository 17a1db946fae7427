use escalation_core::Domain;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no payload available for {0}")]
    Missing(Domain),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where a refresh tick gets each domain's raw endpoint payload from.
pub trait SubjectSource: Send + Sync + 'static {
    fn fetch(&self, domain: Domain) -> Result<Value, SourceError>;
}

/// Reads payloads saved from the REST endpoints, one file per endpoint:
/// `/api/tasks/overdue` lives at `<dir>/api_tasks_overdue.json`.
#[derive(Clone, Debug)]
pub struct SnapshotSource {
    dir: PathBuf,
}

impl SnapshotSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, domain: Domain) -> PathBuf {
        self.dir.join(snapshot_file_name(domain))
    }
}

pub fn snapshot_file_name(domain: Domain) -> String {
    format!("{}.json", domain.endpoint().trim_start_matches('/').replace('/', "_"))
}

impl SubjectSource for SnapshotSource {
    fn fetch(&self, domain: Domain) -> Result<Value, SourceError> {
        let path = self.path_for(domain);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::Missing(domain))
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };
        serde_json::from_str(&raw).map_err(|source| SourceError::Json { path, source })
    }
}

/// In-memory payloads; can be swapped between ticks.
#[derive(Debug, Default)]
pub struct StaticSource {
    payloads: Mutex<BTreeMap<Domain, Value>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, domain: Domain, payload: Value) -> Self {
        self.set(domain, payload);
        self
    }

    pub fn set(&self, domain: Domain, payload: Value) {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(domain, payload);
    }
}

impl SubjectSource for StaticSource {
    fn fetch(&self, domain: Domain) -> Result<Value, SourceError> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&domain)
            .cloned()
            .ok_or(SourceError::Missing(domain))
    }
}

impl<S: SubjectSource> SubjectSource for std::sync::Arc<S> {
    fn fetch(&self, domain: Domain) -> Result<Value, SourceError> {
        (**self).fetch(domain)
    }
}

pub fn write_snapshot(dir: &Path, domain: Domain, payload: &Value) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(domain));
    std::fs::write(&path, serde_json::to_vec_pretty(payload)?)?;
    Ok(path)
}
