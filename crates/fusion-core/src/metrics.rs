//! Process-wide invocation counters.
//!
//! Incremented at the call site without locking. [`Metrics::flush`] logs the
//! current values as one event, typically when a command finishes.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    invocations: AtomicU64,
    failures: AtomicU64,
    fallbacks_applied: AtomicU64,
    chains_aborted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            fallbacks_applied: AtomicU64::new(0),
            chains_aborted: AtomicU64::new(0),
        }
    }

    pub fn inc_invocations(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallbacks(&self) {
        self.fallbacks_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_chains_aborted(&self) {
        self.chains_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn fallbacks_applied(&self) -> u64 {
        self.fallbacks_applied.load(Ordering::Relaxed)
    }

    pub fn chains_aborted(&self) -> u64 {
        self.chains_aborted.load(Ordering::Relaxed)
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            invocations = self.invocations(),
            failures = self.failures(),
            fallbacks_applied = self.fallbacks_applied(),
            chains_aborted = self.chains_aborted(),
        );
    }

    pub fn reset(&self) {
        self.invocations.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.fallbacks_applied.store(0, Ordering::Relaxed);
        self.chains_aborted.store(0, Ordering::Relaxed);
    }
}
