use anyhow::{anyhow, Result};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use readiness_core::CpuCapacity;

use super::{select_probe, CpuProbe, ProbeKind};

/// Callback invoked with every freshly published idle reading.
///
/// Runs on the sampling task. A panic inside the listener is caught and
/// logged; sampling carries on.
pub type SampleListener = Box<dyn Fn(f64) + Send + Sync>;

type SharedProbe = Arc<Mutex<Box<dyn CpuProbe>>>;

/// Latest published reading.
///
/// Readers load the `f64` bits atomically. `publish_lock` is only taken by the
/// sampling task around the store and by `stop`, so that no store can land
/// after `stop` has returned.
struct Slot {
    idle_bits: AtomicU64,
    publish_lock: Mutex<()>,
}

impl Slot {
    fn new(initial: f64) -> Self {
        Self {
            idle_bits: AtomicU64::new(initial.to_bits()),
            publish_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.idle_bits.load(Ordering::Acquire))
    }

    /// Returns false when the sampler was stopped and nothing was stored.
    fn publish(&self, idle: f64, cancel_token: &CancellationToken) -> bool {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if cancel_token.is_cancelled() {
            return false;
        }
        self.idle_bits.store(idle.to_bits(), Ordering::Release);
        true
    }

    /// Wait for an in-flight publish to finish.
    fn fence(&self) {
        drop(
            self.publish_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
    }
}

/// Background CPU idle sampler.
///
/// Construction selects a probe and spawns the sampling task on the current
/// Tokio runtime; it must therefore be called from within a runtime. Until the
/// first tick completes the published value is the entitled CPU count.
pub struct CpuStats {
    slot: Arc<Slot>,
    num_cpus: f64,
    kind: ProbeKind,
    cancel_token: CancellationToken,
}

impl CpuStats {
    /// Monitor the cgroup mounted at `cgroup_root`, sampling every `period`.
    pub fn new(cgroup_root: &Path, period: Duration) -> Self {
        Self::start(select_probe(cgroup_root), period, None)
    }

    /// Like [`CpuStats::new`], additionally pushing each reading to `listener`.
    pub fn with_listener(cgroup_root: &Path, period: Duration, listener: SampleListener) -> Self {
        Self::start(select_probe(cgroup_root), period, Some(listener))
    }

    /// Start sampling an already constructed probe.
    pub fn start(
        probe: Box<dyn CpuProbe>,
        period: Duration,
        listener: Option<SampleListener>,
    ) -> Self {
        let num_cpus = probe.entitled_cpus();
        let kind = probe.kind();
        let slot = Arc::new(Slot::new(num_cpus));
        let cancel_token = CancellationToken::new();

        info!(
            probe = ?kind,
            num_cpus,
            period_ms = period.as_millis() as u64,
            "Starting CPU monitor"
        );

        tokio::spawn(monitor_cpu_load(
            Arc::new(Mutex::new(probe)),
            slot.clone(),
            num_cpus,
            period,
            cancel_token.clone(),
            listener,
        ));

        Self {
            slot,
            num_cpus,
            kind,
            cancel_token,
        }
    }

    /// Most recent idle CPU count. Never blocks.
    pub fn idle_cpus(&self) -> f64 {
        self.slot.load()
    }

    /// Entitled CPU count, constant for the lifetime of the sampler.
    pub fn num_cpus(&self) -> f64 {
        self.num_cpus
    }

    pub fn probe_kind(&self) -> ProbeKind {
        self.kind
    }

    /// True when readings come from the null probe.
    pub fn is_degraded(&self) -> bool {
        self.kind == ProbeKind::Null
    }

    /// Stop the sampling task. The last published value stays readable.
    pub fn stop(&self) {
        self.cancel_token.cancel();
        self.slot.fence();
        info!(idle_cpus = self.idle_cpus(), "CPU monitor stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl CpuCapacity for CpuStats {
    fn idle_cpus(&self) -> f64 {
        CpuStats::idle_cpus(self)
    }

    fn num_cpus(&self) -> f64 {
        CpuStats::num_cpus(self)
    }
}

impl Drop for CpuStats {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn monitor_cpu_load(
    probe: SharedProbe,
    slot: Arc<Slot>,
    num_cpus: f64,
    period: Duration,
    cancel_token: CancellationToken,
    listener: Option<SampleListener>,
) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                break;
            }
            _ = ticker.tick() => {
                let idle = match sample_idle(&probe).await {
                    Ok(idle) => idle.clamp(0.0, num_cpus),
                    Err(e) => {
                        warn!(error = %e, "Failed retrieving CPU idle, retaining previous value");
                        continue;
                    }
                };

                if !slot.publish(idle, &cancel_token) {
                    break;
                }
                debug!(idle_cpus = idle, num_cpus, "Published CPU idle sample");

                if let Some(listener) = &listener {
                    if panic::catch_unwind(AssertUnwindSafe(|| listener(idle))).is_err() {
                        warn!(idle_cpus = idle, "Sample listener panicked");
                    }
                }
            }
        }
    }

    debug!("CPU monitor task exited");
}

/// Run one probe read on the blocking pool; accounting reads are file I/O.
async fn sample_idle(probe: &SharedProbe) -> Result<f64> {
    let probe = probe.clone();
    let idle = tokio::task::spawn_blocking(move || -> Result<f64> {
        let mut probe = probe
            .lock()
            .map_err(|_| anyhow!("CPU probe mutex poisoned"))?;
        Ok(probe.sample_idle()?)
    })
    .await
    .map_err(|e| anyhow!("spawn_blocking for CPU sample: {}", e))??;

    if idle.is_nan() {
        return Err(anyhow!("CPU probe returned NaN"));
    }
    Ok(idle)
}
