use crate::adapters::parse_batch;
use crate::source::SubjectSource;
use escalation_core::aggregate::{bucket_from, classify_all, count_by_status, LevelSummary};
use escalation_core::notify::{
    level_changes, EventSink, LevelSnapshot, SUMMARY_EVENT, UNCLASSIFIABLE_EVENT,
};
use escalation_core::{Bucket, Clock, Domain, EscalationEngine, SubjectKey};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// What the board knew after the previous tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardSnapshot {
    /// Last known level per listed subject. A subject that turned
    /// unclassifiable keeps the level it had before.
    pub levels: LevelSnapshot,
    pub unknown: BTreeSet<SubjectKey>,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub summaries: BTreeMap<Domain, LevelSummary>,
    pub transitions: usize,
    pub rejected: usize,
    pub failed: Vec<Domain>,
}

/// One refresh: fetch every domain, classify at a single instant, emit a
/// summary per domain and every level change since `last`.
pub fn emit_updates<C: Clock>(
    engine: &EscalationEngine<C>,
    source: &dyn SubjectSource,
    sink: &dyn EventSink,
    last: &mut BoardSnapshot,
) -> TickReport {
    tick(engine, source, sink, last, true)
}

/// Like [`emit_updates`] but without transition events, so a fresh board
/// does not announce everything that was already escalated.
pub fn prime<C: Clock>(
    engine: &EscalationEngine<C>,
    source: &dyn SubjectSource,
    sink: &dyn EventSink,
) -> (BoardSnapshot, TickReport) {
    let mut snapshot = BoardSnapshot::default();
    let report = tick(engine, source, sink, &mut snapshot, false);
    (snapshot, report)
}

fn tick<C: Clock>(
    engine: &EscalationEngine<C>,
    source: &dyn SubjectSource,
    sink: &dyn EventSink,
    last: &mut BoardSnapshot,
    announce: bool,
) -> TickReport {
    let now = engine.now();
    let table = engine.table();
    let mut current = BoardSnapshot::default();
    let mut report = TickReport::default();

    for domain in Domain::ALL {
        let fetched = source
            .fetch(domain)
            .map_err(|e| e.to_string())
            .and_then(|payload| parse_batch(domain, &payload).map_err(|e| e.to_string()));
        let batch = match fetched {
            Ok(batch) => batch,
            Err(err) => {
                warn!(domain = %domain, error = %err, "skipping domain this tick");
                report.failed.push(domain);
                // Keep what we knew so a failed fetch does not read as cleared.
                carry_over(last, &mut current, domain);
                continue;
            }
        };

        let results = classify_all(&batch.subjects, now, table);
        let mut unknown_ids = Vec::new();
        let mut summary = LevelSummary::default();

        for (subject, result) in &results {
            summary.record(bucket_from(subject, result));
            match result {
                Ok(classification) => {
                    current.levels.insert(subject.key(), classification.level);
                }
                Err(err) => {
                    let key = subject.key();
                    if announce && !last.unknown.contains(&key) {
                        sink.emit_json(
                            UNCLASSIFIABLE_EVENT,
                            serde_json::json!({
                                "domain": domain,
                                "id": subject.id,
                                "reason": err.to_string(),
                            }),
                        );
                    }
                    // Still listed, so not cleared: hold the previous level.
                    if let Some(level) = last.levels.get(&key) {
                        current.levels.insert(key.clone(), *level);
                    }
                    unknown_ids.push(subject.id.clone());
                    current.unknown.insert(key);
                }
            }
        }

        let levels: BTreeMap<String, usize> = summary
            .by_level
            .iter()
            .map(|(level, count)| (level.to_string(), *count))
            .collect();
        sink.emit_json(
            SUMMARY_EVENT,
            serde_json::json!({
                "domain": domain,
                "endpoint": domain.endpoint(),
                "total": summary.total(),
                "due": summary.due(),
                "unknown": summary.count(Bucket::Unknown),
                "unknown_ids": unknown_ids,
                "levels": levels,
                "statuses": count_by_status(&batch.subjects),
                "rejected": batch.rejected.len(),
            }),
        );

        report.rejected += batch.rejected.len();
        report.summaries.insert(domain, summary);
    }

    if announce {
        let transitions = level_changes(&last.levels, &current.levels);
        for transition in &transitions {
            transition.emit(sink);
        }
        report.transitions = transitions.len();
    }

    info!(
        at = %now,
        transitions = report.transitions,
        failed = report.failed.len(),
        "refresh tick"
    );
    *last = current;
    report
}

fn carry_over(last: &BoardSnapshot, current: &mut BoardSnapshot, domain: Domain) {
    current.levels.extend(
        last.levels
            .iter()
            .filter(|((d, _), _)| *d == domain)
            .map(|(k, v)| (k.clone(), *v)),
    );
    current
        .unknown
        .extend(last.unknown.iter().filter(|(d, _)| *d == domain).cloned());
}

#[derive(Debug, thiserror::Error)]
#[error("refresh loop panicked: {0}")]
pub struct RefreshPanicked(pub String);

pub struct RefreshHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signals the loop and waits for the in-flight tick to finish.
    pub fn stop(self) -> Result<(), RefreshPanicked> {
        self.stop.store(true, Ordering::SeqCst);
        self.thread.thread().unpark();
        self.join()
    }

    /// Blocks until the loop exits.
    pub fn join(self) -> Result<(), RefreshPanicked> {
        self.thread.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            error!(error = %message, "refresh loop died");
            RefreshPanicked(message)
        })
    }
}

/// Runs [`prime`] once, then [`emit_updates`] every `interval` on a
/// background thread until stopped.
pub fn start_with_sink<C, S, K>(
    engine: EscalationEngine<C>,
    source: S,
    sink: K,
    interval: Duration,
) -> RefreshHandle
where
    C: Clock + 'static,
    S: SubjectSource,
    K: EventSink,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let thread = std::thread::spawn(move || {
        let (mut last, _) = prime(&engine, &source, &sink);
        while wait(interval, &stop_flag) {
            emit_updates(&engine, &source, &sink, &mut last);
        }
    });

    RefreshHandle { stop, thread }
}

/// Sleeps for `interval`; returns `false` as soon as a stop is requested.
fn wait(interval: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::park_timeout(deadline - now);
    }
}

/// Prints every notice as one JSON line.
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit_json(&self, event: &str, payload: serde_json::Value) {
        println!("{}", serde_json::json!({ "event": event, "payload": payload }));
    }
}
