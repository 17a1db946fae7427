use crate::error::{EscalationError, Result};
use crate::subject::{Domain, EscalationSubject};
use crate::thresholds::{Boundary, BoundaryKind, Effect, Level, ThresholdTable};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

pub const NOT_DUE_LABEL: &str = "Not due";

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Outcome of classifying one subject at one instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub subject_id: String,
    pub domain: Domain,
    pub level: Level,
    pub label: String,
    /// Time past the domain's origin (the reference timestamp for elapsed
    /// domains, the first cutoff for cutoff domains). Never negative.
    pub elapsed: TimeDelta,
    /// Time left until the next level, `None` at the top level.
    pub until_next: Option<TimeDelta>,
    pub effect: Effect,
}

impl Classification {
    pub fn is_due(&self) -> bool {
        self.level.is_due()
    }

    /// Fractional days overdue; zero while not due.
    pub fn days_overdue(&self) -> f64 {
        self.elapsed.num_milliseconds() as f64 / MILLIS_PER_DAY
    }
}

/// Maps a subject onto the highest rule of its domain whose lower bound
/// `now` has reached.
///
/// Pure in `(subject.reference_timestamp, subject.domain, now, table)`.
pub fn classify(
    subject: &EscalationSubject,
    now: DateTime<Utc>,
    table: &ThresholdTable,
) -> Result<Classification> {
    let Some(reference) = subject.reference_timestamp.instant() else {
        return Err(EscalationError::InvalidSubject {
            id: subject.id.clone(),
            reason: subject
                .reference_timestamp
                .problem()
                .unwrap_or_else(|| "reference timestamp is unusable".into()),
        });
    };

    let rules = table.rules_for(subject.domain);
    let Some(first) = rules.first() else {
        return Err(EscalationError::DomainNotConfigured(subject.domain));
    };

    let offset = table.utc_offset();
    let origin = match first.lower_bound_inclusive.kind() {
        BoundaryKind::Elapsed => Boundary::Elapsed(TimeDelta::zero()),
        BoundaryKind::Cutoff => first.lower_bound_inclusive,
    };
    let elapsed = origin.distance(reference, now, offset).max(TimeDelta::zero());

    // Bounds ascend, so the reached rules form a prefix.
    let reached = rules
        .iter()
        .take_while(|rule| {
            rule.lower_bound_inclusive.distance(reference, now, offset) >= TimeDelta::zero()
        })
        .count();
    let until_next = rules
        .get(reached)
        .map(|next| -next.lower_bound_inclusive.distance(reference, now, offset));

    let classification = match reached.checked_sub(1).map(|i| &rules[i]) {
        Some(rule) => Classification {
            subject_id: subject.id.clone(),
            domain: subject.domain,
            level: rule.level,
            label: rule.label.clone(),
            elapsed,
            until_next,
            effect: rule.effect,
        },
        None => Classification {
            subject_id: subject.id.clone(),
            domain: subject.domain,
            level: Level::NOT_DUE,
            label: NOT_DUE_LABEL.to_string(),
            elapsed: TimeDelta::zero(),
            until_next,
            effect: Effect::None,
        },
    };

    debug!(
        subject = %subject.id,
        domain = %subject.domain,
        level = classification.level.value(),
        "classified subject"
    );
    Ok(classification)
}
