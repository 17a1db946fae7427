use chrono::{DateTime, SecondsFormat};
use escalation_core::{Domain, EscalationSubject, ReferenceTime};
use serde_json::Value;
use std::collections::BTreeSet;
use subject_registry::{validate_subject_v1, RecordError, SubjectRecordV1, SUBJECT_SCHEMA_V1};
use tracing::warn;

/// Turns one row of an endpoint's JSON array into a canonical record.
pub trait SubjectAdapter: Send + Sync + 'static {
    fn domain(&self) -> Domain;
    fn parse(&self, item: &Value) -> Result<SubjectRecordV1, RecordError>;
}

pub struct TaskAdapter;
pub struct TimesheetAdapter;
pub struct AttendanceAdapter;

impl SubjectAdapter for TaskAdapter {
    fn domain(&self) -> Domain {
        Domain::Task
    }

    fn parse(&self, item: &Value) -> Result<SubjectRecordV1, RecordError> {
        canonical(
            self.domain(),
            item,
            &["id", "task_id", "taskId"],
            &["due_date", "dueDate", "deadline", "due_at"],
            &["title", "task_name", "name"],
        )
    }
}

impl SubjectAdapter for TimesheetAdapter {
    fn domain(&self) -> Domain {
        Domain::Timesheet
    }

    fn parse(&self, item: &Value) -> Result<SubjectRecordV1, RecordError> {
        canonical(
            self.domain(),
            item,
            &["id", "timesheet_id", "timesheetId"],
            &["cutoff_at", "cutoffAt", "period_date", "date", "work_date"],
            &["employee_name", "employee", "title"],
        )
    }
}

impl SubjectAdapter for AttendanceAdapter {
    fn domain(&self) -> Domain {
        Domain::Attendance
    }

    fn parse(&self, item: &Value) -> Result<SubjectRecordV1, RecordError> {
        canonical(
            self.domain(),
            item,
            &["id", "anomaly_id", "attendance_id"],
            &["event_time", "eventTime", "timestamp", "created_at", "date"],
            &["anomaly_type", "type", "employee_name"],
        )
    }
}

pub fn adapter_for(domain: Domain) -> &'static dyn SubjectAdapter {
    match domain {
        Domain::Task => &TaskAdapter,
        Domain::Timesheet => &TimesheetAdapter,
        Domain::Attendance => &AttendanceAdapter,
    }
}

/// Subjects parsed from one endpoint payload. Rows that could not even be
/// identified are kept in `rejected` with their index.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub subjects: Vec<EscalationSubject>,
    pub rejected: Vec<(usize, RecordError)>,
}

/// Accepts a bare JSON array or an object wrapping one under `data` or
/// `items`. Ids are unique per batch; a repeated id (`5` and `"5"` count as
/// the same) is rejected and the first row kept.
pub fn parse_batch(domain: Domain, payload: &Value) -> Result<ParsedBatch, RecordError> {
    let items = payload
        .as_array()
        .or_else(|| payload.get("data").and_then(Value::as_array))
        .or_else(|| payload.get("items").and_then(Value::as_array))
        .ok_or_else(|| {
            RecordError::Malformed(format!("{} payload is not a list", domain.endpoint()))
        })?;

    let adapter = adapter_for(domain);
    let mut batch = ParsedBatch::default();
    let mut seen = BTreeSet::new();
    for (index, item) in items.iter().enumerate() {
        let parsed = adapter.parse(item).and_then(into_subject).and_then(|subject| {
            if seen.insert(subject.id.clone()) {
                Ok(subject)
            } else {
                Err(RecordError::DuplicateId(subject.id))
            }
        });
        match parsed {
            Ok(subject) => batch.subjects.push(subject),
            Err(err) => {
                warn!(domain = %domain, index, error = %err, "rejected subject record");
                batch.rejected.push((index, err));
            }
        }
    }
    Ok(batch)
}

pub fn into_subject(record: SubjectRecordV1) -> Result<EscalationSubject, RecordError> {
    validate_subject_v1(&record)?;
    let domain: Domain = record
        .domain
        .parse()
        .map_err(|_| RecordError::UnknownDomain(record.domain.clone()))?;
    Ok(EscalationSubject {
        id: record.id,
        domain,
        reference_timestamp: ReferenceTime::parse(record.reference_timestamp.as_deref()),
        current_status: record.status,
    })
}

fn canonical(
    domain: Domain,
    item: &Value,
    id_keys: &[&str],
    time_keys: &[&str],
    title_keys: &[&str],
) -> Result<SubjectRecordV1, RecordError> {
    if !item.is_object() {
        return Err(RecordError::Malformed("row is not an object".into()));
    }

    let record = SubjectRecordV1 {
        schema: SUBJECT_SCHEMA_V1.into(),
        id: first_scalar(item, id_keys).unwrap_or_default(),
        domain: domain.as_str().into(),
        reference_timestamp: first_timestamp(item, time_keys),
        status: first_scalar(item, &["status", "escalation_status"])
            .unwrap_or_else(|| "pending".into()),
        title: first_scalar(item, title_keys),
    };
    validate_subject_v1(&record)?;
    Ok(record)
}

fn first_scalar(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Strings pass through untouched; integers are read as Unix seconds, or
/// milliseconds when too large to be seconds. Any other number is passed on
/// as text and ends up unparseable downstream.
fn first_timestamp(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            let Some(raw) = n.as_i64() else {
                return Some(n.to_string());
            };
            let ts = if raw.abs() >= 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            };
            Some(ts.map_or_else(
                || n.to_string(),
                |ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            ))
        }
        _ => None,
    })
}
