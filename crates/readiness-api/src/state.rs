//! Application state shared between the router and the shutdown path.

use readiness_infra::CpuStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background workers owned by the server
pub struct AppState {
    pub cpu_stats: Arc<CpuStats>,
    pub rawdata_settled: Arc<AtomicBool>,
    pub cancel_token: CancellationToken,
    rawdata_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    pub fn new(
        cpu_stats: Arc<CpuStats>,
        rawdata_settled: Arc<AtomicBool>,
        cancel_token: CancellationToken,
        rawdata_handle: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            cpu_stats,
            rawdata_settled,
            cancel_token,
            rawdata_handle: Mutex::new(rawdata_handle),
        }
    }

    pub fn is_rawdata_settled(&self) -> bool {
        self.rawdata_settled.load(Ordering::Acquire)
    }

    /// Stop the sampler and the poller, waiting for the poller to exit.
    pub async fn shutdown(&self) {
        self.cpu_stats.stop();
        self.cancel_token.cancel();

        if let Some(handle) = self.rawdata_handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Raw data poller task ended abnormally");
            }
        }
    }
}
