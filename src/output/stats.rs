//! Flush counters
//!
//! Updated from the timer task and from every in-flight cycle, so each
//! field is a standalone atomic. Read them through `snapshot`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct FlushStats {
    ticks: AtomicU64,
    cycles_completed: AtomicU64,
    samples_drained: AtomicU64,
    samples_dropped: AtomicU64,
    conversion_failures: AtomicU64,
    series_rejected: AtomicU64,
    pushes_succeeded: AtomicU64,
    pushes_failed: AtomicU64,
    pushes_skipped: AtomicU64,
    last_series_count: AtomicU64,
}

/// Point-in-time copy of `FlushStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    pub ticks: u64,
    pub cycles_completed: u64,
    pub samples_drained: u64,
    /// Samples whose kind had no converter
    pub samples_dropped: u64,
    /// Samples whose conversion returned an error or panicked
    pub conversion_failures: u64,
    /// Series refused by the per-cycle registry or lost at gather time
    pub series_rejected: u64,
    pub pushes_succeeded: u64,
    pub pushes_failed: u64,
    /// Cycles that produced no series and so made no push attempt
    pub pushes_skipped: u64,
    pub last_series_count: u64,
}

impl FlushStats {
    pub fn new() -> Self {
        FlushStats::default()
    }

    pub(crate) fn record_tick(&self, drained: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.samples_drained
            .fetch_add(drained as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conversion_failure(&self) {
        self.conversion_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self, series: usize) {
        self.series_rejected
            .fetch_add(series as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_push(&self, series: usize, ok: bool) {
        self.last_series_count
            .store(series as u64, Ordering::Relaxed);
        if ok {
            self.pushes_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pushes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_skipped(&self) {
        self.last_series_count.store(0, Ordering::Relaxed);
        self.pushes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Acquire),
            samples_drained: self.samples_drained.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            series_rejected: self.series_rejected.load(Ordering::Relaxed),
            pushes_succeeded: self.pushes_succeeded.load(Ordering::Relaxed),
            pushes_failed: self.pushes_failed.load(Ordering::Relaxed),
            pushes_skipped: self.pushes_skipped.load(Ordering::Relaxed),
            last_series_count: self.last_series_count.load(Ordering::Relaxed),
        }
    }
}
