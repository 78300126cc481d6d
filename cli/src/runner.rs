//! Scan orchestration: endpoint failover, the daily loop and the `run` daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use richscan_core::{
    profile_for_endpoint, IndexerSource, JsonFileSnapshotStore, ProfileOverrides, ScanEngine,
    ScanEngineBuilder, ScanError, ScanOutcome,
};
use richscan_http::HttpIndexerClient;
use richscan_server::SnapshotServer;

use crate::config::{IndexerArgs, ScanArgs, ScheduleArgs, ServeArgs};

/// One HTTP client per configured endpoint, each tuned for its own class.
pub fn connect(endpoints: &[String], overrides: &ProfileOverrides) -> Result<Vec<Arc<dyn IndexerSource>>> {
    endpoints
        .iter()
        .map(|url| {
            let profile = profile_for_endpoint(url, overrides);
            let client = HttpIndexerClient::new(url, &profile)
                .with_context(|| format!("invalid indexer URL '{url}'"))?;
            Ok(Arc::new(client) as Arc<dyn IndexerSource>)
        })
        .collect()
}

/// Rotates the engine across indexer endpoints when a pass fails in transport.
pub struct Failover {
    sources: Vec<Arc<dyn IndexerSource>>,
    current: usize,
}

impl Failover {
    pub fn new(sources: Vec<Arc<dyn IndexerSource>>) -> Self {
        Self { sources, current: 0 }
    }

    pub fn current(&self) -> Option<&Arc<dyn IndexerSource>> {
        self.sources.get(self.current)
    }

    /// Run one pass. A transport failure moves the engine to the next
    /// endpoint and retries, at most once per endpoint.
    pub async fn run_pass(&mut self, engine: &ScanEngine) -> Result<ScanOutcome, ScanError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match engine.run_pass().await {
                Err(e) if e.is_transport() && self.sources.len() > 1 && attempts < self.sources.len() => {
                    self.current = (self.current + 1) % self.sources.len();
                    let next = self.sources[self.current].clone();
                    warn!(
                        error = %e,
                        endpoint = next.endpoint(),
                        "indexer unavailable, failing over"
                    );
                    engine.set_source(next).await;
                }
                other => return other,
            }
        }
    }
}

pub fn build_engine(source: Arc<dyn IndexerSource>, scan: &ScanArgs, shutdown: CancellationToken) -> ScanEngine {
    ScanEngineBuilder::new(source)
        .data_dir(&scan.data_dir)
        .min_balance(scan.min_balance)
        .overrides(scan.overrides())
        .shutdown(shutdown)
        .build()
}

pub fn log_outcome(outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::UpToDate { height } => info!(height, "rich list already up to date"),
        ScanOutcome::SnapshotRegenerated { height } => {
            info!(height, "rich list regenerated from checkpoint")
        }
        ScanOutcome::Completed(report) => info!(
            from = report.from_height,
            to = report.to_height,
            blocks = report.blocks,
            transactions = report.transactions,
            addresses = report.addresses,
            listed = report.listed_addresses,
            total_supply = report.total_supply,
            elapsed_ms = report.elapsed_ms,
            "scan pass completed"
        ),
        ScanOutcome::Interrupted { height } => {
            warn!(height, "scan pass interrupted, progress checkpointed")
        }
    }
}

/// Connect to the configured indexers and build an engine on the primary.
pub fn prepare(
    indexer: &IndexerArgs,
    scan: &ScanArgs,
    shutdown: CancellationToken,
) -> Result<(ScanEngine, Failover)> {
    let sources = connect(&indexer.endpoints(), &scan.overrides())?;
    let failover = Failover::new(sources);
    let primary = failover
        .current()
        .cloned()
        .context("no indexer URL configured")?;
    Ok((build_engine(primary, scan, shutdown), failover))
}

/// `richscan scan`: one pass, then exit. Cancelling `shutdown` stops the pass
/// at the next block boundary with its progress checkpointed.
pub async fn scan_once(indexer: &IndexerArgs, scan: &ScanArgs, shutdown: CancellationToken) -> Result<ScanOutcome> {
    let (engine, mut failover) = prepare(indexer, scan, shutdown)?;
    let outcome = failover.run_pass(&engine).await.context("scan pass failed")?;
    log_outcome(&outcome);
    Ok(outcome)
}

/// `richscan serve`: snapshot API only.
pub async fn serve(scan: &ScanArgs, serve: &ServeArgs, shutdown: CancellationToken) -> Result<()> {
    let store = Arc::new(JsonFileSnapshotStore::in_dir(&scan.data_dir));
    SnapshotServer::new(serve.bind_addr, store)
        .with_shutdown(shutdown)
        .run()
        .await
        .context("snapshot server stopped with an error")
}

/// Scheduled scanning until `shutdown` fires. Failed passes are logged and
/// the loop keeps going. The engine must share `shutdown` so a running pass
/// stops on its own after flushing its checkpoint.
pub async fn scan_loop(
    engine: Arc<ScanEngine>,
    mut failover: Failover,
    schedule: ScheduleArgs,
    shutdown: CancellationToken,
) {
    let mut run_now = schedule.scan_on_startup;
    loop {
        if !run_now {
            let wait = schedule.scan_schedule.until_next(chrono::Utc::now());
            info!(
                next = %schedule.scan_schedule,
                wait_secs = wait.as_secs(),
                "waiting for next scheduled scan"
            );
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        run_now = false;

        match failover.run_pass(&engine).await {
            Ok(outcome) => log_outcome(&outcome),
            Err(e) => error!(error = %e, height = ?e.failed_height(), "scan pass failed"),
        }
        if shutdown.is_cancelled() {
            break;
        }
    }
    info!("scan scheduler stopped");
}

/// `richscan run`: snapshot server plus scheduled scanning.
pub async fn run_daemon(
    indexer: &IndexerArgs,
    scan: &ScanArgs,
    serve_args: &ServeArgs,
    schedule: ScheduleArgs,
    shutdown: CancellationToken,
) -> Result<()> {
    let (engine, failover) = prepare(indexer, scan, shutdown.clone())?;
    let engine = Arc::new(engine);

    let scanner = tokio::spawn(scan_loop(engine, failover, schedule, shutdown.clone()));
    let served = serve(scan, serve_args, shutdown.clone()).await;

    // server exit (error or shutdown) takes the scanner down with it
    shutdown.cancel();
    scanner.await.context("scan scheduler panicked")?;
    served
}
