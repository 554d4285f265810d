//! Process-lifetime pipeline statistics.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;

#[derive(Debug, Default)]
struct Counters {
    total_queries: u64,
    successful_queries: u64,
    failed_queries: u64,
    cache_hits: u64,
    total_processing_time: f64,
}

/// Monotonic counters shared across requests.
#[derive(Debug, Default)]
pub struct StatsCounters {
    inner: Mutex<Counters>,
}

/// A point-in-time view of the pipeline statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub cache_hits: u64,
    /// Mean wall-clock seconds over successful (non-cached) queries, rounded
    /// to two decimals.
    pub average_processing_time: f64,
    pub cache: CacheStats,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A query entered the pipeline (cache hits included).
    pub fn record_started(&self) {
        self.lock().total_queries += 1;
    }

    /// A full (non-cached) run completed.
    pub fn record_success(&self, processing_time: f64) {
        let mut counters = self.lock();
        counters.successful_queries += 1;
        counters.total_processing_time += processing_time;
    }

    pub fn record_failure(&self) {
        self.lock().failed_queries += 1;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn snapshot(&self, cache: CacheStats) -> Statistics {
        let counters = self.lock();
        let average = if counters.successful_queries > 0 {
            let avg = counters.total_processing_time / counters.successful_queries as f64;
            (avg * 100.0).round() / 100.0
        } else {
            0.0
        };
        Statistics {
            total_queries: counters.total_queries,
            successful_queries: counters.successful_queries,
            failed_queries: counters.failed_queries,
            cache_hits: counters.cache_hits,
            average_processing_time: average,
            cache,
        }
    }
}
