//! CPU capacity monitoring
//!
//! This module estimates how many CPUs are idle inside the cgroup the process
//! runs in. A [`CpuProbe`] reads the accounting interface; [`CpuStats`] samples
//! it periodically in the background and publishes the latest reading.

pub use cgroup::CgroupProbe;
pub use null::NullProbe;
pub use probe::{host_cpu_count, logical_cpu_count, select_probe, CpuProbe, ProbeKind};
pub use sampler::{CpuStats, SampleListener};

mod cgroup;
mod null;
mod probe;
mod sampler;

#[cfg(test)]
mod test_support;
