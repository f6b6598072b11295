use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of an [`ImageFinder`](super::ImageFinder)'s counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinderStats {
    /// Calls to `find`
    pub requests: u64,
    /// Requests served straight from the source
    pub fast_path: u64,
    /// Requests served from a fresh cached rendition
    pub cache_hits: u64,
    /// Renditions computed because the cache missed or was stale
    pub recomputes: u64,
    /// Write-backs that stored their rendition
    pub write_backs_completed: u64,
    /// Write-backs that failed and were dropped
    pub write_back_failures: u64,
    /// Times a request blocked on another request's write-back
    pub waits: u64,
}

impl FinderStats {
    /// Fraction of cache-eligible requests (hits plus recomputes) that hit.
    pub fn hit_ratio(&self) -> f64 {
        let eligible = self.cache_hits + self.recomputes;
        if eligible == 0 {
            0.0
        } else {
            self.cache_hits as f64 / eligible as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) requests: AtomicU64,
    pub(crate) fast_path: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) recomputes: AtomicU64,
    pub(crate) write_backs_completed: AtomicU64,
    pub(crate) write_back_failures: AtomicU64,
    pub(crate) waits: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FinderStats {
        FinderStats {
            requests: self.requests.load(Ordering::Relaxed),
            fast_path: self.fast_path.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            recomputes: self.recomputes.load(Ordering::Relaxed),
            write_backs_completed: self.write_backs_completed.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
        }
    }
}
