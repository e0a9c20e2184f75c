//! gateway-daemon — hosts the Autonetwork orchestrator behind the splitter
//! bus and a wall-clock scheduler.
//!
//! Reads config from env vars:
//!   AUTONETWORK_DPA_TIMEOUT_MS            — default 500
//!   AUTONETWORK_RETRY_BACKOFF_MS          — default 2000
//!   AUTONETWORK_WAVE_PACING_MS            — default 500
//!   AUTONETWORK_ACTION_RETRIES_DEFAULT    — default 1
//!   AUTONETWORK_COORDINATOR_DPA_VERSION   — default 0x0414 (DPA_VERSION_MULTI_AUTH)

mod autonetwork_handler;
mod config;
mod publisher_bridge;

use std::sync::Arc;

use autonetwork::RunConfig;
use dpa_client::{fake::FakeDpaClient, ExclusiveLease};
use scheduler::{InMemoryTaskStore, Scheduler};
use splitter::Splitter;

use autonetwork_handler::AutonetworkHandler;
use config::AutonetworkConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,autonetwork=debug".into()),
        )
        .init();

    let config = AutonetworkConfig::from_env();
    tracing::info!(?config, "loaded Autonetwork daemon config");

    // This repo has no real serial/MQ transport to the coordinator; a
    // production build wires a real `DpaClient` here instead.
    let dpa_client: Arc<dyn dpa_client::DpaClient> = Arc::new(FakeDpaClient::new(Vec::new()));
    let lease = Arc::new(ExclusiveLease::new());

    let run_config = RunConfig {
        coordinator_dpa_version: config.coordinator_dpa_version,
        retry_backoff: config.retry_backoff,
        wave_pacing: config.wave_pacing,
    };

    // No inbound transport is wired in this repo (see SPEC_FULL.md §6); a
    // production build would bind the real MQ/WS bus here and call
    // `splitter.dispatch` on each inbound frame.
    let splitter = Arc::new(Splitter::new());
    let handler = Arc::new(AutonetworkHandler::new(
        Arc::clone(&dpa_client),
        Arc::clone(&lease),
        run_config,
    ));
    splitter.register(handler).await;
    tracing::info!("registered Autonetwork handler for mType=iqmeshNetwork_AutoNetwork");

    let scheduler = Arc::new(Scheduler::new(Arc::new(InMemoryTaskStore::new())));
    let scheduler_for_timer = Arc::clone(&scheduler);
    tokio::spawn(async move {
        scheduler_for_timer.run().await;
    });
    tracing::info!("scheduler timer spawned");

    tracing::info!("gateway-daemon ready");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("gateway-daemon shutting down");
}
