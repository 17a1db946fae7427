use serde::{Deserialize, Serialize};

pub const SUBJECT_SCHEMA_V1: &str = "subject.v1";

pub const KNOWN_DOMAINS: [&str; 3] = ["task", "timesheet", "attendance"];

/// Canonical form of one row from an escalation endpoint, before it becomes
/// a classifiable subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecordV1 {
    pub schema: String,
    pub id: String,
    pub domain: String,
    /// Raw due/cutoff/event time as the backend sent it. Left unparsed so a
    /// bad value still reaches the unknown bucket downstream.
    #[serde(default)]
    pub reference_timestamp: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("unsupported schema '{0}'")]
    UnsupportedSchema(String),
    #[error("id is required")]
    MissingId,
    #[error("unknown domain '{0}'")]
    UnknownDomain(String),
    #[error("id '{0}' already appears earlier in the payload")]
    DuplicateId(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

pub fn validate_subject_v1(record: &SubjectRecordV1) -> Result<(), RecordError> {
    if record.schema != SUBJECT_SCHEMA_V1 {
        return Err(RecordError::UnsupportedSchema(record.schema.clone()));
    }
    if record.id.trim().is_empty() {
        return Err(RecordError::MissingId);
    }
    let domain = record.domain.to_lowercase();
    if !KNOWN_DOMAINS.contains(&domain.as_str()) {
        return Err(RecordError::UnknownDomain(record.domain.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SubjectRecordV1 {
        SubjectRecordV1 {
            schema: SUBJECT_SCHEMA_V1.into(),
            id: "T-1".into(),
            domain: "task".into(),
            reference_timestamp: Some("2024-01-01".into()),
            status: "pending".into(),
            title: Some("Quarterly payroll review".into()),
        }
    }

    #[test]
    fn validates_subject_v1() {
        assert!(validate_subject_v1(&record()).is_ok());
    }

    #[test]
    fn unparseable_timestamp_is_still_valid() {
        let mut r = record();
        r.reference_timestamp = Some("next tuesday".into());
        assert!(validate_subject_v1(&r).is_ok());
        r.reference_timestamp = None;
        assert!(validate_subject_v1(&r).is_ok());
    }

    #[test]
    fn rejects_blank_id_and_wrong_schema() {
        let mut r = record();
        r.id = "  ".into();
        assert_eq!(validate_subject_v1(&r), Err(RecordError::MissingId));

        let mut r = record();
        r.schema = "alert.v1".into();
        assert_eq!(
            validate_subject_v1(&r),
            Err(RecordError::UnsupportedSchema("alert.v1".into()))
        );
    }

    #[test]
    fn rejects_unknown_domain() {
        let mut r = record();
        r.domain = "payroll".into();
        assert_eq!(validate_subject_v1(&r), Err(RecordError::UnknownDomain("payroll".into())));
    }

    #[test]
    fn deserializes_with_optional_fields_absent() {
        let r: SubjectRecordV1 = serde_json::from_value(serde_json::json!({
            "schema": "subject.v1",
            "id": "A-3",
            "domain": "attendance"
        }))
        .unwrap();
        assert_eq!(r.reference_timestamp, None);
        assert!(r.status.is_empty());
        assert!(validate_subject_v1(&r).is_ok());
    }
}
