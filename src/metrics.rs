//! Cache metrics collection.
//!
//! The collector is handed to the manager at construction and shared by
//! every client it builds, so tests can inject their own and read it back.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Which tier answered a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Local,
    Remote,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Local => f.write_str("local"),
            Tier::Remote => f.write_str("remote"),
        }
    }
}

/// Sink for cache events, keyed by type prefix.
pub trait Metrics: Send + Sync {
    fn record_hit(&self, prefix: &str, tier: Tier);
    fn record_miss(&self, prefix: &str);
    fn record_load(&self, prefix: &str);
    fn record_load_error(&self, prefix: &str);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_hit(&self, _prefix: &str, _tier: Tier) {}
    fn record_miss(&self, _prefix: &str) {}
    fn record_load(&self, _prefix: &str) {}
    fn record_load_error(&self, _prefix: &str) {}
}

/// Per-prefix counters.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    counters: DashMap<String, PrefixCounters>,
}

#[derive(Debug, Default)]
struct PrefixCounters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_errors: AtomicU64,
}

/// Point-in-time copy of one prefix's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_errors: u64,
}

impl MetricsSnapshot {
    pub fn hits(&self) -> u64 {
        self.local_hits + self.remote_hits
    }

    /// Hit rate in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, prefix: &str, pick: impl Fn(&PrefixCounters) -> &AtomicU64) {
        if let Some(counters) = self.counters.get(prefix) {
            pick(counters.value()).fetch_add(1, Ordering::Relaxed);
            return;
        }
        let counters = self.counters.entry(prefix.to_string()).or_default();
        pick(counters.value()).fetch_add(1, Ordering::Relaxed);
    }

    /// Counters for `prefix`; all zero if nothing was recorded.
    pub fn snapshot(&self, prefix: &str) -> MetricsSnapshot {
        self.counters
            .get(prefix)
            .map(|c| MetricsSnapshot {
                local_hits: c.local_hits.load(Ordering::Relaxed),
                remote_hits: c.remote_hits.load(Ordering::Relaxed),
                misses: c.misses.load(Ordering::Relaxed),
                loads: c.loads.load(Ordering::Relaxed),
                load_errors: c.load_errors.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    /// Number of loader invocations recorded for `prefix`.
    pub fn loads(&self, prefix: &str) -> u64 {
        self.snapshot(prefix).loads
    }
}

impl Metrics for CountingMetrics {
    fn record_hit(&self, prefix: &str, tier: Tier) {
        match tier {
            Tier::Local => self.bump(prefix, |c| &c.local_hits),
            Tier::Remote => self.bump(prefix, |c| &c.remote_hits),
        }
    }

    fn record_miss(&self, prefix: &str) {
        self.bump(prefix, |c| &c.misses);
    }

    fn record_load(&self, prefix: &str) {
        self.bump(prefix, |c| &c.loads);
    }

    fn record_load_error(&self, prefix: &str) {
        self.bump(prefix, |c| &c.load_errors);
    }
}
