use crate::subject::Domain;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EscalationError {
    /// The subject's reference timestamp is missing or unparseable. Callers
    /// list such subjects under the unknown bucket instead of dropping them.
    #[error("subject '{id}' cannot be classified: {reason}")]
    InvalidSubject { id: String, reason: String },

    /// Configuration error: the domain has no rules. Surfaced by
    /// [`ThresholdTable::validate`](crate::ThresholdTable::validate) at startup.
    #[error("domain '{0}' is not configured in the threshold table")]
    DomainNotConfigured(Domain),

    #[error("invalid threshold table: {0}")]
    InvalidTable(String),

    #[error("cannot read threshold table {path}: {reason}")]
    TableUnreadable { path: String, reason: String },

    #[error("unknown domain '{0}'")]
    UnknownDomain(String),
}

pub type Result<T, E = EscalationError> = std::result::Result<T, E>;
