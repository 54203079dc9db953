use readiness_core::CapacityError;

use super::{CpuProbe, ProbeKind};

/// Probe used when no CPU accounting is reachable.
///
/// Always reports every logical CPU as idle, so capacity checks never fail
/// because of missing data.
#[derive(Debug, Clone)]
pub struct NullProbe {
    num_cpus: f64,
}

impl NullProbe {
    pub fn new(num_cpus: f64) -> Self {
        Self { num_cpus }
    }
}

impl CpuProbe for NullProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Null
    }

    fn sample_idle(&mut self) -> Result<f64, CapacityError> {
        Ok(self.num_cpus)
    }

    fn entitled_cpus(&self) -> f64 {
        self.num_cpus
    }
}
