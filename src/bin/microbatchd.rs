//! Batch processing server.
//!
//! Wires an explicitly constructed simulated processor into a coordinator
//! and serves the JSON API. Configuration comes from environment variables
//! with sensible defaults; Ctrl-C triggers a graceful shutdown that drains
//! the pending queue.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use microbatch::processor::DEFAULT_COMPUTE_LATENCY_MS;
use microbatch::server::{router, AppState};
use microbatch::{BatchCoordinator, CoordinatorConfig, SimulatedProcessor};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid value for {key}")),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr: SocketAddr = env_or("MICROBATCH_ADDR", "0.0.0.0:8080".parse()?)?;
    let config = CoordinatorConfig {
        max_batch_size: env_or("MICROBATCH_BATCH_SIZE", CoordinatorConfig::default().max_batch_size)?,
        flush_interval_ms: env_or(
            "MICROBATCH_FLUSH_INTERVAL_MS",
            CoordinatorConfig::default().flush_interval_ms,
        )?,
        request_timeout_ms: env_or(
            "MICROBATCH_REQUEST_TIMEOUT_MS",
            CoordinatorConfig::default().request_timeout_ms,
        )?,
    };
    let latency_ms = env_or("MICROBATCH_COMPUTE_LATENCY_MS", DEFAULT_COMPUTE_LATENCY_MS)?;

    let shutdown = CancellationToken::new();
    let processor = Arc::new(SimulatedProcessor::new(latency_ms));
    let coordinator = BatchCoordinator::new(processor, config.clone(), shutdown.clone());
    let app = router(AppState { coordinator });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        max_batch_size = config.max_batch_size,
        flush_interval_ms = config.flush_interval_ms,
        request_timeout_ms = config.request_timeout_ms,
        compute_latency_ms = latency_ms,
        "Server listening"
    );

    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("server error")?;

    Ok(())
}
