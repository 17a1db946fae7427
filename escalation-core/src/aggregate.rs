//! Level/status grouping for stat cards and filtered lists.
//!
//! Nothing is cached: dashboards call these on every refresh tick and get a
//! fresh view computed from the subjects and instant they pass in.

use crate::classifier::{classify, Classification};
use crate::error::{EscalationError, Result};
use crate::subject::EscalationSubject;
use crate::thresholds::{Level, ThresholdTable};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Level(Level),
    /// Subjects that could not be classified. Still listed, never dropped.
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelSummary {
    pub by_level: BTreeMap<Level, usize>,
    pub unknown: usize,
}

impl LevelSummary {
    pub fn count(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Level(level) => self.by_level.get(&level).copied().unwrap_or(0),
            Bucket::Unknown => self.unknown,
        }
    }

    /// Number of subjects that landed in a level bucket.
    pub fn classified(&self) -> usize {
        self.by_level.values().sum()
    }

    /// Always equals the number of subjects aggregated.
    pub fn total(&self) -> usize {
        self.classified() + self.unknown
    }

    /// Subjects at level 1 or above.
    pub fn due(&self) -> usize {
        self.by_level
            .iter()
            .filter(|(level, _)| level.is_due())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn record(&mut self, bucket: Bucket) {
        match bucket {
            Bucket::Level(level) => *self.by_level.entry(level).or_insert(0) += 1,
            Bucket::Unknown => self.unknown += 1,
        }
    }
}

impl FromIterator<Bucket> for LevelSummary {
    fn from_iter<I: IntoIterator<Item = Bucket>>(buckets: I) -> Self {
        let mut summary = LevelSummary::default();
        for bucket in buckets {
            summary.record(bucket);
        }
        summary
    }
}

/// Bucket for one subject. Unclassifiable subjects go to [`Bucket::Unknown`].
pub fn bucket_of(
    subject: &EscalationSubject,
    now: DateTime<Utc>,
    table: &ThresholdTable,
) -> Bucket {
    bucket_from(subject, &classify(subject, now, table))
}

/// Bucket for an already computed classification result.
pub fn bucket_from(subject: &EscalationSubject, result: &Result<Classification>) -> Bucket {
    match result {
        Ok(classification) => Bucket::Level(classification.level),
        Err(err @ EscalationError::InvalidSubject { .. }) => {
            warn!(
                subject = %subject.id,
                domain = %subject.domain,
                error = %err,
                "unclassifiable subject"
            );
            Bucket::Unknown
        }
        Err(err) => {
            error!(
                subject = %subject.id,
                domain = %subject.domain,
                error = %err,
                "threshold table misconfigured"
            );
            Bucket::Unknown
        }
    }
}

/// Classifies every subject, keeping input order. A failure for one subject
/// does not affect the others.
pub fn classify_all<'a>(
    subjects: &'a [EscalationSubject],
    now: DateTime<Utc>,
    table: &ThresholdTable,
) -> Vec<(&'a EscalationSubject, Result<Classification>)> {
    subjects
        .iter()
        .map(|subject| (subject, classify(subject, now, table)))
        .collect()
}

/// Counts per level, plus the unknown bucket.
pub fn aggregate(
    subjects: &[EscalationSubject],
    now: DateTime<Utc>,
    table: &ThresholdTable,
) -> LevelSummary {
    subjects.iter().map(|subject| bucket_of(subject, now, table)).collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LevelFilter {
    #[default]
    All,
    Level(Level),
    Unknown,
}

impl LevelFilter {
    fn admits(&self, bucket: Bucket) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Level(level) => bucket == Bucket::Level(*level),
            LevelFilter::Unknown => bucket == Bucket::Unknown,
        }
    }
}

/// Subjects in the selected bucket, in insertion order. [`LevelFilter::All`]
/// returns every subject without classifying anything.
pub fn filter_by_level<'a>(
    subjects: &'a [EscalationSubject],
    filter: LevelFilter,
    now: DateTime<Utc>,
    table: &ThresholdTable,
) -> Vec<&'a EscalationSubject> {
    if filter == LevelFilter::All {
        return subjects.iter().collect();
    }
    subjects
        .iter()
        .filter(|subject| filter.admits(bucket_of(subject, now, table)))
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Status(String),
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            StatusFilter::All
        } else {
            StatusFilter::Status(raw.to_lowercase())
        }
    }

    fn admits(&self, subject: &EscalationSubject) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Status(status) => {
                subject.current_status.trim().eq_ignore_ascii_case(status)
            }
        }
    }
}

pub fn filter_by_status<'a>(
    subjects: &'a [EscalationSubject],
    filter: &StatusFilter,
) -> Vec<&'a EscalationSubject> {
    subjects.iter().filter(|subject| filter.admits(subject)).collect()
}

/// Counts per workflow status, lowercased. A blank status counts as
/// `"unknown"`.
pub fn count_by_status(subjects: &[EscalationSubject]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for subject in subjects {
        let status = subject.current_status.trim().to_lowercase();
        let status = if status.is_empty() { "unknown".to_string() } else { status };
        *counts.entry(status).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::{Domain, ReferenceTime};
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn board() -> Vec<EscalationSubject> {
        vec![
            EscalationSubject::new("T-1", Domain::Task, at(1, 0)).with_status("pending"),
            EscalationSubject::new("T-2", Domain::Task, at(6, 0)).with_status("Escalated"),
            EscalationSubject::new("T-3", Domain::Task, ReferenceTime::Missing)
                .with_status("pending"),
            EscalationSubject::new("T-4", Domain::Task, at(9, 0)).with_status("resolved"),
            EscalationSubject::new("T-5", Domain::Task, at(5, 0)).with_status(""),
        ]
    }

    #[test]
    fn aggregate_counts_every_subject_once() {
        let subjects = board();
        let summary = aggregate(&subjects, at(7, 0), ThresholdTable::builtin());

        assert_eq!(summary.count(Bucket::Level(Level(3))), 1);
        assert_eq!(summary.count(Bucket::Level(Level(1))), 2);
        assert_eq!(summary.count(Bucket::Level(Level::NOT_DUE)), 1);
        assert_eq!(summary.count(Bucket::Unknown), 1);
        assert_eq!(summary.classified(), 4);
        assert_eq!(summary.total(), subjects.len());
        assert_eq!(summary.due(), 3);
    }

    #[test]
    fn aggregate_of_empty_list_is_empty() {
        let summary = aggregate(&[], at(1, 0), ThresholdTable::builtin());
        assert_eq!(summary, LevelSummary::default());
        assert_eq!(summary.total(), 0);
    }

    #[test]
    fn all_filter_returns_input_untouched() {
        let subjects = board();
        let all = filter_by_level(&subjects, LevelFilter::All, at(7, 0), ThresholdTable::builtin());
        let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["T-1", "T-2", "T-3", "T-4", "T-5"]);
    }

    #[test]
    fn level_filter_keeps_insertion_order() {
        let subjects = board();
        let warning = filter_by_level(
            &subjects,
            LevelFilter::Level(Level(1)),
            at(7, 0),
            ThresholdTable::builtin(),
        );
        let ids: Vec<&str> = warning.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["T-2", "T-5"]);

        let unknown = filter_by_level(
            &subjects,
            LevelFilter::Unknown,
            at(7, 0),
            ThresholdTable::builtin(),
        );
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].id, "T-3");
    }

    #[test]
    fn classify_all_isolates_failures() {
        let subjects = board();
        let results = classify_all(&subjects, at(7, 0), ThresholdTable::builtin());

        assert_eq!(results.len(), subjects.len());
        assert!(results[2].1.is_err());
        assert!(results.iter().enumerate().all(|(i, (_, r))| i == 2 || r.is_ok()));
    }

    #[test]
    fn status_filter_is_case_insensitive() {
        let subjects = board();
        let escalated = filter_by_status(&subjects, &StatusFilter::parse("escalated"));
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].id, "T-2");

        assert_eq!(filter_by_status(&subjects, &StatusFilter::parse("All")).len(), 5);
        assert_eq!(StatusFilter::parse(""), StatusFilter::All);
    }

    #[test]
    fn status_counts_group_blank_as_unknown() {
        let counts = count_by_status(&board());
        assert_eq!(counts.get("pending"), Some(&2));
        assert_eq!(counts.get("escalated"), Some(&1));
        assert_eq!(counts.get("resolved"), Some(&1));
        assert_eq!(counts.get("unknown"), Some(&1));
    }
}
