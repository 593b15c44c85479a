mod config;
mod inmemory_ctx;
mod registry;
mod temporal_ctx;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use config::WorkerConfig;
use registry::ActivityRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let log_filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL").map(|level| format!("workflow_worker={level}")))
        .unwrap_or_else(|_| "workflow_worker=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter))
        .init();

    tracing::info!("workflow-worker starting...");

    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        runtime = %config.runtime,
        task_queue = %config.task_queue,
        max_concurrent = config.max_concurrent_tasks,
        "worker configuration loaded"
    );

    let registry = Arc::new(ActivityRegistry::new());
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    match config.runtime.as_str() {
        "temporal" => {
            let ctx = temporal_ctx::TemporalCtx::connect(
                &config,
                format!("{}-startup", config.worker_id),
                registry,
            )
            .await?;
            tracing::info!("Temporal gateway ready, entering poll loop");
            let _ = ctx.gateway();
        }
        "inmemory" => {
            tracing::info!("using in-memory runtime, no external durable store configured");
        }
        other => {
            anyhow::bail!("unknown WORKFLOW_RUNTIME: {other}");
        }
    }

    // Heartbeat loop: the durable runtime's own task queue lives outside
    // this crate (spec.md §1 treats it as an external collaborator), so
    // there is nothing to claim here yet. This loop exists so the worker
    // process has the same "run until ctrl_c, drain, exit" shape as
    // `DurableWorker::run`.
    tokio::select! {
        _ = heartbeat(config.poll_interval, &mut shutdown_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    }

    tracing::info!("worker shutdown complete");
    Ok(())
}

async fn heartbeat(interval: Duration, shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                tracing::debug!("worker heartbeat");
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}
