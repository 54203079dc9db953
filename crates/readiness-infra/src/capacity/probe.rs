use std::path::Path;

use readiness_core::CapacityError;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{info, warn};

use super::{CgroupProbe, NullProbe};

/// Which accounting mechanism a probe reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    CgroupAware,
    Null,
}

/// A source of idle CPU readings.
///
/// Probes may keep state between calls (the cgroup probe differences a
/// cumulative counter), so sampling takes `&mut self`.
pub trait CpuProbe: Send {
    fn kind(&self) -> ProbeKind;

    /// Perform one accounting read and return the idle CPU estimate.
    fn sample_idle(&mut self) -> Result<f64, CapacityError>;

    /// CPUs this process is entitled to, fixed at construction.
    fn entitled_cpus(&self) -> f64;
}

/// Pick the best probe available under `cgroup_root`.
///
/// Never fails: when the cgroup interface cannot be opened the null probe is
/// returned and capacity-aware decisions are effectively disabled.
pub fn select_probe(cgroup_root: &Path) -> Box<dyn CpuProbe> {
    let logical_cpus = logical_cpu_count();
    let host_cpus = host_cpu_count();

    match CgroupProbe::open(cgroup_root, logical_cpus) {
        Ok(probe) => {
            info!(
                cgroup_root = %cgroup_root.display(),
                entitled_cpus = probe.entitled_cpus(),
                logical_cpus,
                host_cpus,
                "CPU monitoring using cgroup accounting"
            );
            Box::new(probe)
        }
        Err(e) => {
            warn!(
                error = %e,
                logical_cpus,
                host_cpus,
                "CPU monitoring unsupported on current platform, server capacity management will be disabled"
            );
            Box::new(NullProbe::new(logical_cpus))
        }
    }
}

/// Number of logical CPUs this process may run on, at least 1.
///
/// Honours the scheduler affinity mask, so a container pinned with a cpuset
/// reports only its pinned CPUs rather than every CPU of the host.
pub fn logical_cpu_count() -> f64 {
    num_cpus::get().max(1) as f64
}

/// Number of CPUs present on the host, regardless of affinity. Zero when the
/// platform does not expose them.
pub fn host_cpu_count() -> usize {
    System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()))
        .cpus()
        .len()
}

/// Convert "CPUs used over the window" into "CPUs left idle".
///
/// The result is clamped to `[0, entitled]`: bursts above the quota read as
/// saturated rather than negative.
pub(crate) fn idle_from_usage(entitled: f64, used_cpu_secs: f64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 || !used_cpu_secs.is_finite() {
        return entitled;
    }
    let used_cpus = used_cpu_secs / elapsed_secs;
    (entitled - used_cpus).clamp(0.0, entitled)
}
