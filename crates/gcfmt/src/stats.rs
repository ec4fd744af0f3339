//! Stats Module - Allocation Handshake Counters
//!
//! Counts what the handshake does so races with the collector are visible:
//! - Reserve attempts (one per loop iteration)
//! - Successful commits and committed bytes
//! - Commit races (commits rejected because a collection intervened)
//! - Reserve failures

use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// AllocStats - counters shared by every buffer of one collector
#[derive(Debug, Default)]
pub struct AllocStats {
    reserve_attempts: AtomicU64,
    reserve_failures: AtomicU64,
    commits: AtomicU64,
    commit_races: AtomicU64,
    bytes_committed: AtomicU64,
}

impl AllocStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reserve(&self) {
        self.reserve_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reserve_failure(&self) {
        self.reserve_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self, size: usize) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.bytes_committed
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_commit_race(&self) {
        self.commit_races.fetch_add(1, Ordering::Relaxed);
    }

    /// Get summary statistics
    pub fn summary(&self) -> AllocSummary {
        AllocSummary {
            reserve_attempts: self.reserve_attempts.load(Ordering::Relaxed),
            reserve_failures: self.reserve_failures.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_races: self.commit_races.load(Ordering::Relaxed),
            bytes_committed: self.bytes_committed.load(Ordering::Relaxed),
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        self.reserve_attempts.store(0, Ordering::Relaxed);
        self.reserve_failures.store(0, Ordering::Relaxed);
        self.commits.store(0, Ordering::Relaxed);
        self.commit_races.store(0, Ordering::Relaxed);
        self.bytes_committed.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`AllocStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocSummary {
    pub reserve_attempts: u64,
    pub reserve_failures: u64,
    pub commits: u64,
    pub commit_races: u64,
    pub bytes_committed: u64,
}

impl AllocSummary {
    /// Named counters in a stable order
    pub fn metrics(&self) -> IndexMap<&'static str, u64> {
        let mut metrics = IndexMap::new();
        metrics.insert("gcfmt_reserve_attempts", self.reserve_attempts);
        metrics.insert("gcfmt_reserve_failures", self.reserve_failures);
        metrics.insert("gcfmt_commits", self.commits);
        metrics.insert("gcfmt_commit_races", self.commit_races);
        metrics.insert("gcfmt_bytes_committed", self.bytes_committed);
        metrics
    }

    /// Export in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        for (name, value) in self.metrics() {
            output.push_str(&format!("{} {}\n", name, value));
        }
        output
    }
}
