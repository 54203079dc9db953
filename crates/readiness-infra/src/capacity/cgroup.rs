//! Cgroup CPU accounting.
//!
//! Supports both hierarchies:
//! - v2: `cpu.max` (`"<quota> <period>"` or `"max <period>"`) and the
//!   `usage_usec` line of `cpu.stat`.
//! - v1: `cpu/cpu.cfs_quota_us` (`-1` when unlimited), `cpu/cpu.cfs_period_us`
//!   and `cpuacct/cpuacct.usage` in nanoseconds.
//!
//! v2 is detected by the presence of `cgroup.controllers` at the root.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use readiness_core::CapacityError;

use super::probe::idle_from_usage;
use super::{CpuProbe, ProbeKind};

const V1_CPU_DIRS: &[&str] = &["cpu", "cpu,cpuacct", "cpuacct,cpu"];
const V1_CPUACCT_DIRS: &[&str] = &["cpuacct", "cpu,cpuacct", "cpuacct,cpu"];

#[derive(Debug, Clone)]
enum Layout {
    V2 {
        cpu_max: PathBuf,
        cpu_stat: PathBuf,
    },
    V1 {
        cfs_quota: PathBuf,
        cfs_period: PathBuf,
        usage: PathBuf,
    },
}

impl Layout {
    fn detect(root: &Path) -> Result<Self, CapacityError> {
        if root.join("cgroup.controllers").exists() {
            return Ok(Layout::V2 {
                cpu_max: root.join("cpu.max"),
                cpu_stat: root.join("cpu.stat"),
            });
        }

        let cpu_dir = first_existing(root, V1_CPU_DIRS);
        let cpuacct_dir = first_existing(root, V1_CPUACCT_DIRS);
        match (cpu_dir, cpuacct_dir) {
            (Some(cpu_dir), Some(cpuacct_dir)) => Ok(Layout::V1 {
                cfs_quota: cpu_dir.join("cpu.cfs_quota_us"),
                cfs_period: cpu_dir.join("cpu.cfs_period_us"),
                usage: cpuacct_dir.join("cpuacct.usage"),
            }),
            _ => Err(CapacityError::ProbeUnavailable {
                path: root.display().to_string(),
                reason: "no cgroup v2 hierarchy or v1 cpu/cpuacct controllers found".to_string(),
            }),
        }
    }

    /// Quota in CPUs, `None` when unlimited.
    fn read_quota(&self) -> Result<Option<f64>, CapacityError> {
        match self {
            Layout::V2 { cpu_max, .. } => {
                // The root cgroup has no cpu.max; it is never limited.
                if !cpu_max.exists() {
                    return Ok(None);
                }
                parse_cpu_max(&read_trimmed(cpu_max)?, cpu_max)
            }
            Layout::V1 {
                cfs_quota,
                cfs_period,
                ..
            } => {
                let quota: i64 = parse_number(&read_trimmed(cfs_quota)?, cfs_quota)?;
                if quota < 0 {
                    return Ok(None);
                }
                let period: u64 = parse_number(&read_trimmed(cfs_period)?, cfs_period)?;
                if period == 0 {
                    return Err(CapacityError::malformed(
                        cfs_period.display().to_string(),
                        "period is zero",
                    ));
                }
                Ok(Some(quota as f64 / period as f64))
            }
        }
    }

    /// Cumulative CPU time consumed by the cgroup.
    fn read_usage(&self) -> Result<Duration, CapacityError> {
        match self {
            Layout::V2 { cpu_stat, .. } => {
                let content = read_trimmed(cpu_stat)?;
                let usec = content
                    .lines()
                    .find_map(|line| line.strip_prefix("usage_usec "))
                    .ok_or_else(|| {
                        CapacityError::malformed(
                            cpu_stat.display().to_string(),
                            "usage_usec not found",
                        )
                    })?;
                Ok(Duration::from_micros(parse_number(usec.trim(), cpu_stat)?))
            }
            Layout::V1 { usage, .. } => {
                let nanos: u64 = parse_number(&read_trimmed(usage)?, usage)?;
                Ok(Duration::from_nanos(nanos))
            }
        }
    }

    fn usage_path(&self) -> &Path {
        match self {
            Layout::V2 { cpu_stat, .. } => cpu_stat,
            Layout::V1 { usage, .. } => usage,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct UsageSample {
    usage: Duration,
    at: Instant,
}

/// Probe reading the cgroup the process belongs to.
#[derive(Debug)]
pub struct CgroupProbe {
    layout: Layout,
    entitled_cpus: f64,
    last: Option<UsageSample>,
}

impl CgroupProbe {
    /// Open the accounting interface under `root`.
    ///
    /// The entitled CPU count is the quota when one is set, bounded by
    /// `logical_cpus`; otherwise `logical_cpus`.
    pub fn open(root: &Path, logical_cpus: f64) -> Result<Self, CapacityError> {
        let layout = Layout::detect(root)?;

        let unavailable = |e: CapacityError| CapacityError::ProbeUnavailable {
            path: root.display().to_string(),
            reason: e.to_string(),
        };
        let quota = layout.read_quota().map_err(unavailable)?;
        layout.read_usage().map_err(unavailable)?;

        let entitled_cpus = match quota {
            Some(quota) if quota > 0.0 => quota.min(logical_cpus),
            _ => logical_cpus,
        };

        tracing::debug!(
            usage_path = %layout.usage_path().display(),
            quota_cpus = ?quota,
            entitled_cpus,
            "Opened cgroup CPU accounting"
        );

        Ok(Self {
            layout,
            entitled_cpus,
            last: None,
        })
    }

    pub(crate) fn sample_idle_at(&mut self, now: Instant) -> Result<f64, CapacityError> {
        let current = UsageSample {
            usage: self.layout.read_usage()?,
            at: now,
        };

        let idle = match self.last.replace(current) {
            // Counter went backwards (cgroup recreated): treat as a fresh start.
            Some(previous) if current.usage >= previous.usage => {
                let used = (current.usage - previous.usage).as_secs_f64();
                let elapsed = current.at.saturating_duration_since(previous.at).as_secs_f64();
                idle_from_usage(self.entitled_cpus, used, elapsed)
            }
            _ => self.entitled_cpus,
        };

        Ok(idle)
    }
}

impl CpuProbe for CgroupProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::CgroupAware
    }

    fn sample_idle(&mut self) -> Result<f64, CapacityError> {
        self.sample_idle_at(Instant::now())
    }

    fn entitled_cpus(&self) -> f64 {
        self.entitled_cpus
    }
}

fn first_existing(root: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| root.join(name))
        .find(|dir| dir.is_dir())
}

fn read_trimmed(path: &Path) -> Result<String, CapacityError> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| CapacityError::read_failed(path.display().to_string(), &e))
}

fn parse_number<T: std::str::FromStr>(value: &str, path: &Path) -> Result<T, CapacityError> {
    value.parse::<T>().map_err(|_| {
        CapacityError::malformed(
            path.display().to_string(),
            format!("expected integer, got '{value}'"),
        )
    })
}

fn parse_cpu_max(content: &str, path: &Path) -> Result<Option<f64>, CapacityError> {
    let mut fields = content.split_whitespace();
    let quota = fields.next().ok_or_else(|| {
        CapacityError::malformed(path.display().to_string(), "empty cpu.max")
    })?;
    if quota == "max" {
        return Ok(None);
    }

    let quota: u64 = parse_number(quota, path)?;
    let period: u64 = match fields.next() {
        Some(period) => parse_number(period, path)?,
        None => 100_000,
    };
    if period == 0 {
        return Err(CapacityError::malformed(
            path.display().to_string(),
            "period is zero",
        ));
    }
    Ok(Some(quota as f64 / period as f64))
}
