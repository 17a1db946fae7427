use crate::aggregate::{self, LevelFilter, LevelSummary};
use crate::classifier::{self, Classification};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::subject::{Domain, EscalationSubject};
use crate::thresholds::ThresholdTable;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A validated threshold table paired with a clock.
///
/// Holds no state of its own beyond those two; cloning is cheap and clones
/// share the table.
#[derive(Clone, Debug)]
pub struct EscalationEngine<C = SystemClock> {
    table: Arc<ThresholdTable>,
    clock: C,
}

impl EscalationEngine<SystemClock> {
    /// Built-in thresholds on the wall clock.
    pub fn with_builtin_table() -> Self {
        Self {
            table: Arc::new(ThresholdTable::builtin().clone()),
            clock: SystemClock,
        }
    }
}

impl<C: Clock> EscalationEngine<C> {
    /// Fails when the table does not configure every [`Domain`].
    pub fn new(table: Arc<ThresholdTable>, clock: C) -> Result<Self> {
        table.validate(&Domain::ALL)?;
        Ok(Self { table, clock })
    }

    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn classify_now(&self, subject: &EscalationSubject) -> Result<Classification> {
        classifier::classify(subject, self.now(), &self.table)
    }

    pub fn summarize_now(&self, subjects: &[EscalationSubject]) -> LevelSummary {
        aggregate::aggregate(subjects, self.now(), &self.table)
    }

    pub fn filter_now<'a>(
        &self,
        subjects: &'a [EscalationSubject],
        filter: LevelFilter,
    ) -> Vec<&'a EscalationSubject> {
        aggregate::filter_by_level(subjects, filter, self.now(), &self.table)
    }
}
