//! Explicit notification channel for escalation changes.
//!
//! Dashboards subscribe by handing an [`EventSink`] to whatever drives their
//! refresh loop. The previous level snapshot is owned by that caller; this
//! module only diffs two snapshots it is given.

use crate::aggregate::classify_all;
use crate::subject::{EscalationSubject, SubjectKey};
use crate::thresholds::{Level, ThresholdTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::Sender;

pub const SUMMARY_EVENT: &str = "escalation-summary";
pub const RAISED_EVENT: &str = "escalation-raised";
pub const LOWERED_EVENT: &str = "escalation-lowered";
pub const CLEARED_EVENT: &str = "escalation-cleared";
pub const UNCLASSIFIABLE_EVENT: &str = "subject-unclassifiable";

pub trait EventSink: Send + Sync + 'static {
    fn emit_json(&self, event: &str, payload: serde_json::Value);
}

pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit_json(&self, _event: &str, _payload: serde_json::Value) {}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Forwards every notice into a channel. A dropped receiver is ignored.
pub struct ChannelSink {
    tx: Sender<Notice>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Notice>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit_json(&self, event: &str, payload: serde_json::Value) {
        let _ = self.tx.send(Notice {
            event: event.to_string(),
            payload,
        });
    }
}

/// Levels of the classifiable subjects at one instant.
pub type LevelSnapshot = BTreeMap<SubjectKey, Level>;

pub fn snapshot(
    subjects: &[EscalationSubject],
    now: DateTime<Utc>,
    table: &ThresholdTable,
) -> LevelSnapshot {
    classify_all(subjects, now, table)
        .into_iter()
        .filter_map(|(subject, result)| result.ok().map(|c| (subject.key(), c.level)))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Raised { key: SubjectKey, from: Level, to: Level },
    /// Moved back, e.g. after the due date was extended.
    Lowered { key: SubjectKey, from: Level, to: Level },
    /// An escalated subject left the listing.
    Cleared { key: SubjectKey, from: Level },
}

impl Transition {
    pub fn event(&self) -> &'static str {
        match self {
            Transition::Raised { .. } => RAISED_EVENT,
            Transition::Lowered { .. } => LOWERED_EVENT,
            Transition::Cleared { .. } => CLEARED_EVENT,
        }
    }

    pub fn key(&self) -> &SubjectKey {
        match self {
            Transition::Raised { key, .. }
            | Transition::Lowered { key, .. }
            | Transition::Cleared { key, .. } => key,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        let (domain, id) = self.key();
        match self {
            Transition::Raised { from, to, .. } | Transition::Lowered { from, to, .. } => {
                serde_json::json!({
                    "domain": domain,
                    "id": id,
                    "from_level": from.value(),
                    "to_level": to.value(),
                })
            }
            Transition::Cleared { from, .. } => serde_json::json!({
                "domain": domain,
                "id": id,
                "from_level": from.value(),
            }),
        }
    }

    pub fn emit(&self, sink: &dyn EventSink) {
        sink.emit_json(self.event(), self.payload());
    }
}

/// Differences between two snapshots, in key order. A subject seen for the
/// first time counts as coming from level 0; a subject that disappears only
/// produces a transition if it was due.
pub fn level_changes(previous: &LevelSnapshot, current: &LevelSnapshot) -> Vec<Transition> {
    let mut out = Vec::new();

    for (key, &to) in current {
        let from = previous.get(key).copied().unwrap_or(Level::NOT_DUE);
        if to > from {
            out.push(Transition::Raised { key: key.clone(), from, to });
        } else if to < from {
            out.push(Transition::Lowered { key: key.clone(), from, to });
        }
    }

    for (key, &from) in previous {
        if from.is_due() && !current.contains_key(key) {
            out.push(Transition::Cleared { key: key.clone(), from });
        }
    }

    out
}
