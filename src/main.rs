//! TACFEED - Tactical Detection Feed Gateway
//!
//! Validates, standardizes, and delivers AI object-detection events to a
//! tactical awareness feed, with durable store-and-forward across endpoint
//! outages.
//!
//! # Usage
//!
//! ```bash
//! # Ingest NDJSON detections from stdin (daemon mode)
//! detector | ./tacfeed
//!
//! # Replay a recorded detection file
//! ./tacfeed --replay detections.ndjson --replay-delay-ms 50
//!
//! # Point at a different feed endpoint
//! ./tacfeed --endpoint https://tak.example/inbound
//! ```
//!
//! # Environment Variables
//!
//! - `TACFEED_CONFIG`: Path to a TOML config file (default: ./tacfeed.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tacfeed::alerts::LogAlertSink;
use tacfeed::audit::{AuditSink, AuditTrail};
use tacfeed::config::{defaults, GatewayConfig};
use tacfeed::delivery::{Deliverer, HttpTacticalSink};
use tacfeed::offline::{OfflineQueue, SledQueueStorage, SyncWorker};
use tacfeed::pipeline::{DetectionSource, Pipeline, ReplaySource, StdinSource};
use tacfeed::validator::Validator;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "tacfeed")]
#[command(about = "Tactical Detection Feed Gateway")]
#[command(version)]
struct CliArgs {
    /// Replay detections from an NDJSON file instead of reading stdin
    #[arg(long, value_name = "PATH")]
    replay: Option<String>,

    /// Milliseconds between replayed detections (0 = no delay)
    #[arg(long, default_value = "0")]
    replay_delay_ms: u64,

    /// Path to a TOML config file (overrides TACFEED_CONFIG and ./tacfeed.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Override the delivery endpoint URL from the config
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    Ingest,
    SyncWorker,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::Ingest => write!(f, "Ingest"),
            TaskName::SyncWorker => write!(f, "SyncWorker"),
        }
    }
}

// ============================================================================
// Gateway Initialization
// ============================================================================

/// Everything the runtime tasks need, built once at startup.
struct GatewayCore {
    pipeline: Arc<Pipeline>,
    queue: Arc<OfflineQueue>,
    worker: SyncWorker,
    /// Held open for the life of the process; trees borrow from it
    _db: sled::Db,
}

/// Open storage, recover queue state, and wire the pipeline together.
fn init_gateway(config: &GatewayConfig) -> Result<GatewayCore> {
    info!("💾 Opening queue database at {}...", config.queue.data_dir.display());
    std::fs::create_dir_all(&config.queue.data_dir)
        .with_context(|| format!("Failed to create {}", config.queue.data_dir.display()))?;
    let db = sled::open(config.queue.data_dir.join("tacfeed_db"))
        .context("Failed to open queue database")?;

    let audit = Arc::new(AuditTrail::open(&db).context("Failed to open audit trail")?);
    let storage = Arc::new(SledQueueStorage::open(&db).context("Failed to open queue storage")?);
    let queue = Arc::new(
        OfflineQueue::open(storage, &config.queue).context("Failed to recover offline queue")?,
    );
    info!("✓ Offline queue ready");

    let pending = queue.pending_count();
    if pending > 0 {
        info!("📦 {} features awaiting sync from a previous run", pending);
    }

    // Retention sweep for terminal rows kept around for audit
    match queue.prune_terminal(ChronoDuration::days(config.queue.retention_days)) {
        Ok(0) => {}
        Ok(n) => info!(
            "Pruned {} synced/failed items older than {} days",
            n, config.queue.retention_days
        ),
        Err(e) => warn!("Failed to prune terminal queue items: {}", e),
    }

    let sink = HttpTacticalSink::new(&config.delivery)
        .context("Failed to build HTTP delivery client")?;
    let deliverer = Deliverer::new(
        Arc::new(sink),
        Duration::from_secs(config.delivery.timeout_secs),
    );
    info!("✓ Delivery client ready: {}", deliverer.destination());

    let alerts = Arc::new(LogAlertSink);

    let worker = SyncWorker::new(
        Arc::clone(&queue),
        deliverer.clone(),
        alerts.clone(),
        Some(Arc::clone(&audit) as Arc<dyn AuditSink>),
        config.sync.clone(),
    );

    let pipeline = Arc::new(
        Pipeline::new(
            Validator::new(config.validation.clone()),
            Arc::clone(&queue),
            deliverer,
            alerts,
        )
        .with_audit(audit)
        .with_sync_handle(worker.handle()),
    );

    Ok(GatewayCore {
        pipeline,
        queue,
        worker,
        _db: db,
    })
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Spawn the background sync worker into the JoinSet.
fn spawn_sync_worker(
    task_set: &mut JoinSet<Result<TaskName>>,
    worker: SyncWorker,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[SyncWorker] Task starting");
        worker.run(cancel_token).await;
        info!("[SyncWorker] Graceful shutdown complete");
        Ok(TaskName::SyncWorker)
    });
}

/// Spawn the ingest task. For finite sources (`drain_on_eof`) the task waits
/// for the queue to empty after EOF, then cancels the whole gateway so replay
/// runs exit on their own.
fn spawn_ingest<S: DetectionSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    pipeline: Arc<Pipeline>,
    queue: Arc<OfflineQueue>,
    source: S,
    drain_on_eof: bool,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[Ingest] Task starting");
        pipeline.run_ingest(source, cancel_token.clone()).await?;

        if drain_on_eof && !cancel_token.is_cancelled() {
            let pending = queue.pending_count();
            if pending > 0 {
                info!("[Ingest] Source exhausted, waiting for {} queued features", pending);
            }
            while queue.pending_count() > 0 && !cancel_token.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            info!("[Ingest] Queue drained, shutting down");
            cancel_token.cancel();
        }

        Ok(TaskName::Ingest)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Wait out the shutdown grace period, then abort stragglers.
async fn drain_tasks(task_set: &mut JoinSet<Result<TaskName>>) {
    let grace = Duration::from_secs(defaults::SHUTDOWN_GRACE_SECS);
    let all_done = tokio::time::timeout(grace, async {
        while let Some(result) = task_set.join_next().await {
            if let Ok(Ok(task_name)) = result {
                info!("✓ Task {} finished", task_name);
            }
        }
    })
    .await;

    if all_done.is_err() {
        warn!(
            "Tasks still running after {}s grace period, aborting",
            defaults::SHUTDOWN_GRACE_SECS
        );
        task_set.abort_all();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Load gateway configuration
    let mut config = match &args.config {
        Some(path) => GatewayConfig::load_from_file(std::path::Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => GatewayConfig::load(),
    };
    if let Some(endpoint) = args.endpoint {
        config.delivery.endpoint_url = endpoint;
        config.validate().context("Config invalid after --endpoint override")?;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  TACFEED - Tactical Detection Feed Gateway");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");
    info!(
        "  Gateway: {}{}",
        config.gateway.name,
        if config.gateway.zone.is_empty() {
            String::new()
        } else {
            format!(" | Zone: {}", config.gateway.zone)
        }
    );
    info!(
        "  Feed: {} ({})",
        config.delivery.endpoint_url, config.delivery.format
    );
    info!(
        "  Queue: capacity {} | {} retries | {}d retention",
        config.queue.max_size, config.queue.max_retries, config.queue.retention_days
    );
    info!("");

    let core = init_gateway(&config)?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: background sync worker
    spawn_sync_worker(&mut task_set, core.worker, cancel_token.clone());

    // Task 2: detection ingest
    if let Some(path) = args.replay {
        info!("📥 Input: replay from {} ({}ms between detections)", path, args.replay_delay_ms);
        let source =
            ReplaySource::from_ndjson_file(std::path::Path::new(&path), args.replay_delay_ms)?;
        spawn_ingest(
            &mut task_set,
            Arc::clone(&core.pipeline),
            Arc::clone(&core.queue),
            source,
            true,
            cancel_token.clone(),
        );
    } else {
        info!("📥 Input: stdin (NDJSON, one detection per line)");
        spawn_ingest(
            &mut task_set,
            Arc::clone(&core.pipeline),
            Arc::clone(&core.queue),
            StdinSource::new(),
            false,
            cancel_token.clone(),
        );
    }

    let supervisor_result = run_supervisor(&mut task_set, cancel_token.clone()).await;

    // Cancelled or failed — give the remaining tasks a bounded window to stop
    cancel_token.cancel();
    drain_tasks(&mut task_set).await;

    info!("");
    info!("📊 Final counters: {}", core.pipeline.stats());
    match core.queue.stats() {
        Ok(stats) => info!("📦 Queue: {}", stats),
        Err(e) => warn!("Could not read final queue stats: {}", e),
    }
    info!("✓ TACFEED shutdown complete");

    supervisor_result
}
