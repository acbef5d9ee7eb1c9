use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;

use tracewatch_worker::{
    ClickHouseStore, ConclusionDetector, ConclusionOrchestrator, HttpCompletionNotifier, Notifier,
    Scheduler, SharedClient, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracewatch_observability::init();

    let config = WorkerConfig::from_env().context("failed to load worker configuration")?;

    let clickhouse = SharedClient::<ClickHouseStore>::new("clickhouse");
    let store = clickhouse
        .get_or_try_init(|| async { ClickHouseStore::connect(config.clickhouse_config()) })
        .await
        .context("failed to build clickhouse client")?;

    let notifier = HttpCompletionNotifier::new(config.notifier_config())
        .context("failed to build notification client")?;

    tracing::info!(
        threshold_secs = config.threshold_secs,
        interval_ms = config.interval.as_millis() as u64,
        batch_limit = config.batch_limit,
        endpoint = notifier.url(),
        "starting trace conclusion worker"
    );

    let orchestrator = Arc::new(ConclusionOrchestrator::new(
        ConclusionDetector::new(store, &config.detection_settings()),
        Notifier::new(notifier),
    ));

    let scheduler = Scheduler::new("trace-conclusion", config.interval);
    let handle = scheduler.start(move || {
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator.run_cycle().await;
            Ok::<(), Infallible>(())
        }
    })?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutdown requested; waiting for the current cycle");
    handle.shutdown().await;
    clickhouse.teardown().await;
    tracing::info!("trace conclusion worker stopped");

    Ok(())
}
