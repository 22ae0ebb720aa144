//! Process-wide atomic counters.
//!
//! Incremented silently at call sites. [`Metrics::flush`] emits them as a
//! single `info!` event, typically once per iteration loop.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    phases_executed: AtomicU64,
    gates_raised: AtomicU64,
    roles_fired: AtomicU64,
    iterations: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            phases_executed: AtomicU64::new(0),
            gates_raised: AtomicU64::new(0),
            roles_fired: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
        }
    }

    pub fn inc_phases_executed(&self) {
        self.phases_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "phases_executed", "counter incremented");
    }

    pub fn inc_gates_raised(&self) {
        self.gates_raised.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gates_raised", "counter incremented");
    }

    pub fn inc_roles_fired(&self) {
        self.roles_fired.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "roles_fired", "counter incremented");
    }

    pub fn inc_iterations(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "iterations", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            phases_executed = self.phases_executed(),
            gates_raised = self.gates_raised(),
            roles_fired = self.roles_fired(),
            iterations = self.iterations(),
        );
    }

    pub fn phases_executed(&self) -> u64 {
        self.phases_executed.load(Ordering::Relaxed)
    }

    pub fn gates_raised(&self) -> u64 {
        self.gates_raised.load(Ordering::Relaxed)
    }

    pub fn roles_fired(&self) -> u64 {
        self.roles_fired.load(Ordering::Relaxed)
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        self.phases_executed.store(0, Ordering::Relaxed);
        self.gates_raised.store(0, Ordering::Relaxed);
        self.roles_fired.store(0, Ordering::Relaxed);
        self.iterations.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let m = Metrics::new();
        m.inc_phases_executed();
        m.inc_phases_executed();
        m.inc_gates_raised();
        m.inc_roles_fired();
        m.inc_iterations();
        m.inc_iterations();
        m.inc_iterations();
        assert_eq!(m.phases_executed(), 2);
        assert_eq!(m.gates_raised(), 1);
        assert_eq!(m.roles_fired(), 1);
        assert_eq!(m.iterations(), 3);
    }

    #[test]
    fn test_reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_phases_executed();
        m.inc_gates_raised();
        m.reset();
        assert_eq!(m.phases_executed(), 0);
        assert_eq!(m.gates_raised(), 0);
    }
}
