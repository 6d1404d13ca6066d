//! Global atomic counters.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a command finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    template_acquisitions: AtomicU64,
    template_fallbacks: AtomicU64,
    runs_executed: AtomicU64,
    bisect_steps: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            template_acquisitions: AtomicU64::new(0),
            template_fallbacks: AtomicU64::new(0),
            runs_executed: AtomicU64::new(0),
            bisect_steps: AtomicU64::new(0),
        }
    }

    pub fn inc_template_acquisitions(&self) {
        self.template_acquisitions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "template_acquisitions", "counter incremented");
    }

    pub fn inc_template_fallbacks(&self) {
        self.template_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "template_fallbacks", "counter incremented");
    }

    pub fn inc_runs(&self) {
        self.runs_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_executed", "counter incremented");
    }

    pub fn inc_bisect_steps(&self) {
        self.bisect_steps.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "bisect_steps", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            template_acquisitions = self.template_acquisitions(),
            template_fallbacks = self.template_fallbacks(),
            runs_executed = self.runs_executed(),
            bisect_steps = self.bisect_steps(),
        );
    }

    pub fn template_acquisitions(&self) -> u64 {
        self.template_acquisitions.load(Ordering::Relaxed)
    }

    pub fn template_fallbacks(&self) -> u64 {
        self.template_fallbacks.load(Ordering::Relaxed)
    }

    pub fn runs_executed(&self) -> u64 {
        self.runs_executed.load(Ordering::Relaxed)
    }

    pub fn bisect_steps(&self) -> u64 {
        self.bisect_steps.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.template_acquisitions.store(0, Ordering::Relaxed);
        self.template_fallbacks.store(0, Ordering::Relaxed);
        self.runs_executed.store(0, Ordering::Relaxed);
        self.bisect_steps.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_template_acquisitions();
        m.inc_template_acquisitions();
        assert_eq!(m.template_acquisitions(), 2);

        m.inc_template_fallbacks();
        assert_eq!(m.template_fallbacks(), 1);

        m.inc_runs();
        m.inc_bisect_steps();
        m.inc_bisect_steps();
        assert_eq!(m.runs_executed(), 1);
        assert_eq!(m.bisect_steps(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_template_acquisitions();
        m.inc_runs();
        m.inc_bisect_steps();
        m.reset();
        assert_eq!(m.template_acquisitions(), 0);
        assert_eq!(m.runs_executed(), 0);
        assert_eq!(m.bisect_steps(), 0);
    }
}
