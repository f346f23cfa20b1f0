//! Atomic counters for scan observability.
//!
//! All counters use relaxed ordering. They are advisory totals across every
//! scan in the process, never consulted by the scans themselves.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide scan counters.
pub struct CodecMetrics {
    /// Buffers scanned by a verifier.
    pub scans: AtomicU64,
    /// Scans that found at least one mismatch.
    pub failed_scans: AtomicU64,
    /// Mismatching bytes reported to trackers.
    pub mismatches: AtomicU64,
    /// Corruption ranges opened.
    pub ranges: AtomicU64,
    /// Ranges attributed to a foreign owner.
    pub indiscretions: AtomicU64,
    /// Calls to `identify` made while summarizing ranges.
    pub identify_attempts: AtomicU64,
    /// Of those, calls that resolved an owner.
    pub identify_hits: AtomicU64,
}

impl CodecMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scans: AtomicU64::new(0),
            failed_scans: AtomicU64::new(0),
            mismatches: AtomicU64::new(0),
            ranges: AtomicU64::new(0),
            indiscretions: AtomicU64::new(0),
            identify_attempts: AtomicU64::new(0),
            identify_hits: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment a counter by `n`.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans: Self::get(&self.scans),
            failed_scans: Self::get(&self.failed_scans),
            mismatches: Self::get(&self.mismatches),
            ranges: Self::get(&self.ranges),
            indiscretions: Self::get(&self.indiscretions),
            identify_attempts: Self::get(&self.identify_attempts),
            identify_hits: Self::get(&self.identify_hits),
        }
    }
}

impl Default for CodecMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scans: u64,
    pub failed_scans: u64,
    pub mismatches: u64,
    pub ranges: u64,
    pub indiscretions: u64,
    pub identify_attempts: u64,
    pub identify_hits: u64,
}

impl MetricsSnapshot {
    /// Counts accumulated since `earlier`.
    #[must_use]
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            scans: self.scans.saturating_sub(earlier.scans),
            failed_scans: self.failed_scans.saturating_sub(earlier.failed_scans),
            mismatches: self.mismatches.saturating_sub(earlier.mismatches),
            ranges: self.ranges.saturating_sub(earlier.ranges),
            indiscretions: self.indiscretions.saturating_sub(earlier.indiscretions),
            identify_attempts: self.identify_attempts.saturating_sub(earlier.identify_attempts),
            identify_hits: self.identify_hits.saturating_sub(earlier.identify_hits),
        }
    }
}

static GLOBAL_METRICS: CodecMetrics = CodecMetrics::new();

/// Access the global metrics singleton.
#[must_use]
pub fn global_metrics() -> &'static CodecMetrics {
    &GLOBAL_METRICS
}
