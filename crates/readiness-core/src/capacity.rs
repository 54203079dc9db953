//! CPU capacity trait for readiness decisions.
//!
//! Implementations report how many CPUs are currently idle and how many the
//! process is entitled to. Used by the readiness middleware to decide whether
//! this instance should receive traffic.

/// Source of the current idle CPU estimate.
///
/// Both methods are total and must not block: callers hit them on every
/// readiness request.
pub trait CpuCapacity: Send + Sync {
    /// Idle CPU count, in `[0, num_cpus()]`.
    fn idle_cpus(&self) -> f64;

    /// Entitled CPU count. Constant for the lifetime of the implementation.
    fn num_cpus(&self) -> f64;

    /// Fraction of the entitled CPUs currently in use, in `[0, 1]`.
    fn cpu_load(&self) -> f64 {
        let num_cpus = self.num_cpus();
        if num_cpus <= 0.0 {
            return 0.0;
        }
        (1.0 - self.idle_cpus() / num_cpus).clamp(0.0, 1.0)
    }
}
