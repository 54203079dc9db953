use axum::http::StatusCode;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use readiness_core::CpuCapacity;

pub const MSG_READY: &str = "Ready";
pub const MSG_CPU_LIMIT: &str = "Not ready: CPU Limit reached";
pub const MSG_NOT_SETTLED: &str = "Not ready: Traefik raw data has not yet settled";

/// Shared state of the readiness middleware
#[derive(Clone)]
pub struct ReadinessState {
    pub capacity: Arc<dyn CpuCapacity>,
    pub rawdata_settled: Arc<AtomicBool>,
    pub ready_path: String,
    pub ready_cpu_limit: f64,
    pub dry_run: bool,
}

/// Outcome of one readiness evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessCheck {
    pub status: StatusCode,
    pub message: &'static str,
    pub num_cpus: f64,
    pub cpu_load: f64,
    pub cpu_limit: f64,
}

impl ReadinessState {
    pub fn new(
        capacity: Arc<dyn CpuCapacity>,
        rawdata_settled: Arc<AtomicBool>,
        ready_path: impl Into<String>,
        ready_cpu_limit: f64,
        dry_run: bool,
    ) -> Self {
        Self {
            capacity,
            rawdata_settled,
            ready_path: ready_path.into(),
            ready_cpu_limit,
            dry_run,
        }
    }

    /// Evaluate readiness. CPU saturation is reported before the settle state.
    pub fn evaluate(&self) -> ReadinessCheck {
        let num_cpus = self.capacity.num_cpus();
        let cpu_load = self.capacity.cpu_load();

        let (status, message) = if cpu_load > self.ready_cpu_limit {
            (StatusCode::NOT_ACCEPTABLE, MSG_CPU_LIMIT)
        } else if !self.rawdata_settled.load(Ordering::Acquire) {
            (StatusCode::NOT_ACCEPTABLE, MSG_NOT_SETTLED)
        } else {
            (StatusCode::OK, MSG_READY)
        };

        ReadinessCheck {
            status,
            message,
            num_cpus,
            cpu_load,
            cpu_limit: self.ready_cpu_limit,
        }
    }
}

impl ReadinessCheck {
    pub fn is_ready(&self) -> bool {
        self.status == StatusCode::OK
    }

    fn body(&self) -> String {
        format!(
            "{}\n\nNum CPUs: {}\nCPU Load: {} / {}\n",
            self.message, self.num_cpus, self.cpu_load, self.cpu_limit
        )
    }
}

/// Readiness middleware
///
/// Answers requests on the ready path with 200 or 406 depending on CPU load
/// and whether the upstream proxy's routing data has settled. All other
/// requests are passed through untouched.
pub async fn readiness_middleware(
    State(state): State<Arc<ReadinessState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() != state.ready_path {
        return next.run(request).await;
    }

    tracing::info!(path = %request.uri().path(), "Readiness request received");

    let check = state.evaluate();
    let mut status = check.status;

    if !check.is_ready() {
        tracing::warn!(
            status = status.as_u16(),
            message = check.message,
            num_cpus = check.num_cpus,
            cpu_load = check.cpu_load,
            cpu_limit = check.cpu_limit,
            dry_run = state.dry_run,
            "Readiness check not ok"
        );

        if state.dry_run {
            status = StatusCode::OK;
        }
    }

    (status, check.body()).into_response()
}
