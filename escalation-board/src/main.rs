use anyhow::Context;
use escalation_board::config::BoardConfig;
use escalation_board::runtime::{emit_updates, start_with_sink, BoardSnapshot, StdoutSink};
use escalation_board::source::SnapshotSource;
use escalation_core::{EscalationEngine, SystemClock};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("escalation_board=info,escalation_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BoardConfig::from_env().context("reading OFFISPHERE_* settings")?;
    let table = config.load_table().context("loading threshold table")?;
    let engine = EscalationEngine::new(Arc::new(table), SystemClock)
        .context("threshold table is incomplete")?;
    let source = SnapshotSource::new(&config.snapshot_dir);

    tracing::info!(
        snapshots = %config.snapshot_dir.display(),
        interval_secs = config.refresh_interval.as_secs(),
        once = config.once,
        "escalation board starting"
    );

    if config.once {
        let report = emit_updates(&engine, &source, &StdoutSink, &mut BoardSnapshot::default());
        if report.failed.len() == escalation_core::Domain::ALL.len() {
            anyhow::bail!(
                "no endpoint snapshot could be read from {}",
                config.snapshot_dir.display()
            );
        }
        return Ok(());
    }

    start_with_sink(engine, source, StdoutSink, config.refresh_interval).join()?;
    Ok(())
}
