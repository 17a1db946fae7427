use chrono::{TimeZone, Utc};
use escalation_board::runtime::{emit_updates, prime};
use escalation_board::source::{write_snapshot, SnapshotSource};
use escalation_core::notify::{
    ChannelSink, Notice, CLEARED_EVENT, LOWERED_EVENT, RAISED_EVENT, SUMMARY_EVENT,
};
use escalation_core::{Domain, EscalationEngine, FixedClock, ThresholdTable};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

fn engine(day: u32, hour: u32, minute: u32) -> EscalationEngine<FixedClock> {
    let now = Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap();
    let table = Arc::new(ThresholdTable::builtin().clone());
    EscalationEngine::new(table, FixedClock::new(now)).expect("engine")
}

fn drain(rx: &Receiver<Notice>) -> Vec<Notice> {
    rx.try_iter().collect()
}

fn summary<'a>(notices: &'a [Notice], domain: &str) -> &'a serde_json::Value {
    &notices
        .iter()
        .find(|n| n.event == SUMMARY_EVENT && n.payload["domain"] == domain)
        .expect("summary")
        .payload
}

#[test]
fn board_follows_saved_endpoint_payloads() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_snapshot(
        dir.path(),
        Domain::Task,
        &serde_json::json!([
            {"id": 1, "title": "Quarterly report", "due_date": "2024-01-01", "status": "pending"},
            {"id": 2, "title": "Expense claims", "due_date": "2024-01-06", "status": "in_progress"},
            {"id": 3, "title": "No date yet", "status": "pending"}
        ]),
    )
    .expect("tasks");
    write_snapshot(
        dir.path(),
        Domain::Timesheet,
        &serde_json::json!({"data": [
            {"id": "TS-7", "employee_name": "R. Iyer", "period_date": "2024-01-07"}
        ]}),
    )
    .expect("timesheets");
    write_snapshot(
        dir.path(),
        Domain::Attendance,
        &serde_json::json!([
            {"id": "A-1", "event_time": "2024-01-05T09:00:00Z", "anomaly_type": "late_checkin"}
        ]),
    )
    .expect("attendance");

    let source = SnapshotSource::new(dir.path());
    let (tx, rx) = std::sync::mpsc::channel();
    let sink = ChannelSink::new(tx);

    // 7 Jan 20:07 UTC: task 1 is 6 days late, timesheet past the second cutoff.
    let (mut last, report) = prime(&engine(7, 20, 7), &source, &sink);
    assert!(report.failed.is_empty());
    let notices = drain(&rx);
    assert!(notices.iter().all(|n| n.event == SUMMARY_EVENT));

    let tasks = summary(&notices, "task");
    assert_eq!(tasks["total"], 3);
    assert_eq!(tasks["unknown"], 1);
    assert_eq!(tasks["levels"]["3"], 1);
    assert_eq!(tasks["levels"]["1"], 1);
    assert_eq!(summary(&notices, "timesheet")["levels"]["2"], 1);
    assert_eq!(summary(&notices, "attendance")["levels"]["2"], 1);

    // Task 1 is done and gone, task 2's due date moved out, the timesheet locks.
    write_snapshot(
        dir.path(),
        Domain::Task,
        &serde_json::json!([
            {"id": 2, "due_date": "2024-01-20", "status": "in_progress"},
            {"id": 3, "status": "pending"}
        ]),
    )
    .expect("tasks");

    let report = emit_updates(&engine(7, 20, 15), &source, &sink, &mut last);
    let notices = drain(&rx);
    let changes: Vec<(&str, &str)> = notices
        .iter()
        .filter(|n| n.event != SUMMARY_EVENT)
        .map(|n| (n.event.as_str(), n.payload["id"].as_str().unwrap_or_default()))
        .collect();

    assert_eq!(report.transitions, 3);
    assert_eq!(
        changes,
        vec![(LOWERED_EVENT, "2"), (RAISED_EVENT, "TS-7"), (CLEARED_EVENT, "1")]
    );
}

#[test]
fn missing_snapshots_are_reported_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_snapshot(dir.path(), Domain::Task, &serde_json::json!([])).expect("tasks");

    let (tx, rx) = std::sync::mpsc::channel();
    let source = SnapshotSource::new(dir.path());
    let (_, report) = prime(&engine(7, 0, 0), &source, &ChannelSink::new(tx));

    assert_eq!(report.failed, vec![Domain::Timesheet, Domain::Attendance]);
    assert_eq!(drain(&rx).len(), 1);
}
