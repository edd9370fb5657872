//! satwatch -- housekeeping telemetry simulation and nightly anomaly
//! detection for a small satellite.
//!
//! This crate provides the packet codec, the fault-injecting generator,
//! the isolation-forest detector, summary statistics and the nightly
//! pipeline with its scheduler, run history and HTTP surface.

pub mod analysis;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod generator;
pub mod packet;
pub mod pipeline;
pub mod scheduler;
pub mod storage;

use std::time::Duration;

use anyhow::Result;

use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::pipeline::PipelineContext;
use crate::scheduler::{NightlyRunner, NightlyScheduler};

/// Build the run executor shared by the scheduler, the API and the CLI.
pub fn build_runner(config: &Config) -> Result<NightlyRunner> {
    tracing::info!(db_path = %config.paths.history_db.display(), "Initializing database");
    let pool = storage::open_pool(&config.paths.history_db)?;
    let ctx = PipelineContext::from_config(config)?;
    Ok(NightlyRunner::new(
        ctx,
        Collaborators::from_config(&config.narrator),
        Some(pool),
        Duration::from_secs(config.schedule.timeout_secs),
    ))
}

/// Start the daemon: API server plus the nightly scheduler.
pub async fn serve(config: &Config) -> Result<()> {
    let runner = build_runner(config)?;
    let nightly = NightlyScheduler::from_config(&config.schedule)?;

    let loop_runner = runner.clone();
    tokio::spawn(async move {
        scheduler::run_loop(nightly, loop_runner).await;
    });

    let addr: std::net::SocketAddr = config.server.bind.parse()?;
    let app = api::router(api::state::AppState { runner });

    tracing::info!(%addr, "satwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
