//! Time-based escalation classification for Offisphere dashboards.
//!
//! Maps a timestamp-bearing record (task, timesheet, attendance anomaly) and
//! the current instant onto a discrete escalation level using a single,
//! declarative threshold table. Everything here is synchronous and free of
//! shared mutable state; polling, fetching, and notification delivery belong
//! to the caller.

pub mod aggregate;
pub mod classifier;
pub mod clock;
pub mod engine;
pub mod error;
pub mod notify;
pub mod subject;
pub mod thresholds;

pub use aggregate::{Bucket, LevelFilter, LevelSummary, StatusFilter};
pub use classifier::{classify, Classification};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::EscalationEngine;
pub use error::{EscalationError, Result};
pub use notify::{EventSink, Notice, Transition};
pub use subject::{Domain, EscalationSubject, ReferenceTime, SubjectKey};
pub use thresholds::{Boundary, Effect, Level, ThresholdRule, ThresholdTable};
