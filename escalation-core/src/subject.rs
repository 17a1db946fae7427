use crate::error::EscalationError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Task,
    Timesheet,
    Attendance,
}

impl Domain {
    /// The closed set of domains the dashboards know about.
    pub const ALL: [Domain; 3] = [Domain::Task, Domain::Timesheet, Domain::Attendance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Task => "task",
            Domain::Timesheet => "timesheet",
            Domain::Attendance => "attendance",
        }
    }

    /// REST path the subject list for this domain is read from.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Domain::Task => "/api/tasks/overdue",
            Domain::Timesheet => "/api/timesheets/escalations",
            Domain::Attendance => "/api/attendance/anomalies",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = EscalationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "task" | "tasks" => Ok(Domain::Task),
            "timesheet" | "timesheets" => Ok(Domain::Timesheet),
            "attendance" | "attendance_anomaly" => Ok(Domain::Attendance),
            other => Err(EscalationError::UnknownDomain(other.to_string())),
        }
    }
}

/// The due/cutoff instant of a subject as it arrived from the backend.
///
/// Parsing never fails outright: a missing or garbled value is kept so the
/// subject can still be listed, just not classified.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ReferenceTime {
    At(DateTime<Utc>),
    #[default]
    Missing,
    Invalid(String),
}

impl ReferenceTime {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => ReferenceTime::Missing,
            Some(s) if s.trim().is_empty() => ReferenceTime::Missing,
            Some(s) => match parse_timestamp(s) {
                Some(ts) => ReferenceTime::At(ts),
                None => ReferenceTime::Invalid(s.to_string()),
            },
        }
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            ReferenceTime::At(ts) => Some(*ts),
            ReferenceTime::Missing | ReferenceTime::Invalid(_) => None,
        }
    }

    /// Why this value cannot be classified, if it can't.
    pub fn problem(&self) -> Option<String> {
        match self {
            ReferenceTime::At(_) => None,
            ReferenceTime::Missing => Some("reference timestamp is missing".into()),
            ReferenceTime::Invalid(raw) => Some(format!("unparseable reference timestamp '{raw}'")),
        }
    }
}

impl From<DateTime<Utc>> for ReferenceTime {
    fn from(ts: DateTime<Utc>) -> Self {
        ReferenceTime::At(ts)
    }
}

impl From<Option<DateTime<Utc>>> for ReferenceTime {
    fn from(ts: Option<DateTime<Utc>>) -> Self {
        ts.map_or(ReferenceTime::Missing, ReferenceTime::At)
    }
}

impl From<Option<String>> for ReferenceTime {
    fn from(raw: Option<String>) -> Self {
        ReferenceTime::parse(raw.as_deref())
    }
}

impl From<ReferenceTime> for Option<String> {
    fn from(value: ReferenceTime) -> Self {
        match value {
            ReferenceTime::At(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            ReferenceTime::Missing => None,
            ReferenceTime::Invalid(raw) => Some(raw),
        }
    }
}

/// Accepts RFC 3339, naive date-times (read as UTC) and bare dates
/// (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Identity of a subject across refreshes.
pub type SubjectKey = (Domain, String);

/// A record eligible for time-based classification.
///
/// `current_status` is owned by the backend workflow; nothing in this crate
/// writes to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationSubject {
    pub id: String,
    pub domain: Domain,
    #[serde(default)]
    pub reference_timestamp: ReferenceTime,
    #[serde(default)]
    pub current_status: String,
}

impl EscalationSubject {
    pub fn new(id: impl Into<String>, domain: Domain, reference: impl Into<ReferenceTime>) -> Self {
        Self {
            id: id.into(),
            domain,
            reference_timestamp: reference.into(),
            current_status: String::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.current_status = status.into();
        self
    }

    pub fn key(&self) -> SubjectKey {
        (self.domain, self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_parses_singular_and_plural_names() {
        assert_eq!("task".parse::<Domain>().unwrap(), Domain::Task);
        assert_eq!(" Timesheets ".parse::<Domain>().unwrap(), Domain::Timesheet);
        assert_eq!("attendance".parse::<Domain>().unwrap(), Domain::Attendance);
        assert!(matches!(
            "payroll".parse::<Domain>(),
            Err(EscalationError::UnknownDomain(name)) if name == "payroll"
        ));
    }

    #[test]
    fn every_domain_has_an_endpoint() {
        for domain in Domain::ALL {
            assert!(domain.endpoint().starts_with("/api/"));
        }
    }

    #[test]
    fn parses_supported_timestamp_shapes() {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01T05:30:00+05:30"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00.000"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01"), Some(midnight));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("   "), None);
    }

    #[test]
    fn reference_time_keeps_bad_input_for_listing() {
        assert_eq!(ReferenceTime::parse(None), ReferenceTime::Missing);
        assert_eq!(ReferenceTime::parse(Some("")), ReferenceTime::Missing);
        assert_eq!(
            ReferenceTime::parse(Some("31/12/2024")),
            ReferenceTime::Invalid("31/12/2024".into())
        );
        assert!(ReferenceTime::Missing.problem().is_some());
        assert!(ReferenceTime::parse(Some("2024-01-01")).problem().is_none());
    }

    #[test]
    fn subject_deserializes_from_backend_json() {
        let subject: EscalationSubject = serde_json::from_value(serde_json::json!({
            "id": "T-17",
            "domain": "task",
            "reference_timestamp": "2024-01-01T00:00:00Z",
            "current_status": "pending"
        }))
        .unwrap();

        assert_eq!(subject.domain, Domain::Task);
        assert_eq!(
            subject.reference_timestamp.instant(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        let missing: EscalationSubject = serde_json::from_value(serde_json::json!({
            "id": "T-18",
            "domain": "task",
            "reference_timestamp": null
        }))
        .unwrap();
        assert_eq!(missing.reference_timestamp, ReferenceTime::Missing);
        assert!(missing.current_status.is_empty());
    }

    #[test]
    fn subject_serializes_reference_as_plain_string() {
        let at = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap();
        let subject = EscalationSubject::new("T-1", Domain::Task, at).with_status("pending");
        let json = serde_json::to_value(&subject).unwrap();
        assert_eq!(json["reference_timestamp"], "2024-01-04T00:00:00Z");
        assert_eq!(json["domain"], "task");
    }
}
