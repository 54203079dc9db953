//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use readiness_core::Config;
use readiness_infra::{CpuStats, RawdataPoller, RawdataPollerConfig, ReadinessState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "readiness-api";
const RAWDATA_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;

    readiness_infra::init_telemetry(SERVICE_NAME, config.environment(), config.log_json())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        ready_path = %config.ready_path(),
        ready_cpu_limit = config.ready_cpu_limit(),
        dry_run = config.dry_run(),
        "Configuration loaded and validated successfully"
    );

    let cpu_stats = Arc::new(CpuStats::new(
        config.cgroup_root(),
        config.cpu_sample_interval(),
    ));
    if cpu_stats.is_degraded() {
        tracing::warn!(
            num_cpus = cpu_stats.num_cpus(),
            "CPU sampler running without cgroup accounting, load will always read 0"
        );
    }

    let cancel_token = CancellationToken::new();
    let poller = RawdataPoller::new(RawdataPollerConfig {
        url: config.traefik_api_rawdata_url(),
        poll_interval: config.rawdata_poll_interval(),
        request_timeout: RAWDATA_REQUEST_TIMEOUT,
    })?;
    let rawdata_settled = poller.settled_flag();
    let rawdata_handle = poller.spawn(cancel_token.clone());

    let readiness = ReadinessState::new(
        cpu_stats.clone(),
        rawdata_settled.clone(),
        config.ready_path(),
        config.ready_cpu_limit(),
        config.dry_run(),
    );
    let router = routes::setup_routes(readiness);

    let state = Arc::new(AppState::new(
        cpu_stats,
        rawdata_settled,
        cancel_token,
        Some(rawdata_handle),
    ));

    Ok((state, router))
}
