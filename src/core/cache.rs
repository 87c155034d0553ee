//! Process-local result cache keyed by plan fingerprint.
//!
//! LRU eviction with per-entry TTL. Expired entries are dropped lazily on
//! read; `cleanup_expired` exists for periodic housekeeping. The tabular
//! payload is serialized at the cache boundary so handing a bundle back to
//! a caller never deep-copies row data structures.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use super::plan::{ChartSpec, Insight, PlanFingerprint, TableRows};

/// The value bundle stored per fingerprint: rows plus whichever artifacts
/// the pipeline managed to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBundle {
    pub rows: TableRows,
    pub chart: Option<ChartSpec>,
    pub insight: Option<Insight>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheEntry {
    /// Rows serialized once at store time; `Arc` so a hit hands out a copy
    /// without duplicating the payload under the lock.
    rows_json: Arc<str>,
    chart: Option<ChartSpec>,
    insight: Option<Insight>,
    expires_at: Instant,
    /// Generation stamp of this entry's newest recency-queue slot.
    stamp: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

struct CacheInner {
    entries: HashMap<PlanFingerprint, CacheEntry>,
    /// Recency queue of (key, stamp) pairs, oldest first. Slots whose stamp
    /// no longer matches the entry are stale and skipped during eviction.
    recency: VecDeque<(PlanFingerprint, u64)>,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl CacheInner {
    fn touch(&mut self, key: PlanFingerprint) -> u64 {
        self.clock += 1;
        self.recency.push_back((key, self.clock));
        self.clock
    }

    /// Evict exactly the least-recently-used live entry.
    fn evict_lru(&mut self) {
        while let Some((key, stamp)) = self.recency.pop_front() {
            let live = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.stamp == stamp);
            if live {
                self.entries.remove(&key);
                debug!(evicted = %key, "cache evicted LRU entry");
                return;
            }
        }
    }

    /// Drop stale recency slots once the queue grows well past capacity.
    /// Each slot is pushed once and popped once, so operations stay O(1)
    /// amortized.
    fn compact_recency(&mut self, max_entries: usize) {
        if self.recency.len() <= max_entries.saturating_mul(8).max(64) {
            return;
        }
        let entries = &self.entries;
        self.recency
            .retain(|(key, stamp)| entries.get(key).is_some_and(|entry| entry.stamp == *stamp));
    }
}

/// Capacity-bounded TTL cache shared by all concurrent pipeline runs.
///
/// One lock guards the map and recency queue; nothing blocking happens while
/// it is held. The host owns the instance and injects it into each pipeline.
pub struct ResultCache {
    max_entries: usize,
    default_ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl ResultCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            max_entries: max_entries.max(1),
            default_ttl,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                recency: VecDeque::new(),
                clock: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Look up a bundle. Absent if never stored, evicted, or expired; an
    /// expired entry is removed on the spot. A hit refreshes recency.
    ///
    /// The tabular payload is deserialized after the lock is released; only
    /// pointer-sized clones happen while it is held.
    pub fn get(&self, key: &PlanFingerprint) -> Option<CachedBundle> {
        let now = Instant::now();
        let (rows_json, chart, insight) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

            let Some(entry) = inner.entries.get(key) else {
                inner.misses += 1;
                return None;
            };
            if entry.is_expired(now) {
                inner.entries.remove(key);
                inner.misses += 1;
                return None;
            }

            let stamp = inner.touch(*key);
            let Some(entry) = inner.entries.get_mut(key) else {
                inner.misses += 1;
                return None;
            };
            entry.stamp = stamp;
            let cloned = (
                entry.rows_json.clone(),
                entry.chart.clone(),
                entry.insight.clone(),
            );
            inner.hits += 1;
            inner.compact_recency(self.max_entries);
            cloned
        };

        match serde_json::from_str(&rows_json) {
            Ok(rows) => Some(CachedBundle {
                rows,
                chart,
                insight,
            }),
            Err(e) => {
                // Unreachable for bundles we serialized ourselves; drop the
                // entry rather than serve it.
                error!(key = %key, "cache entry payload corrupt: {}", e);
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                inner.entries.remove(key);
                None
            }
        }
    }

    /// Store a bundle under the default TTL.
    pub fn set(&self, key: PlanFingerprint, bundle: CachedBundle) {
        self.set_with_ttl(key, bundle, self.default_ttl);
    }

    /// Store a bundle. Replacing an existing key repositions it as most
    /// recently used without counting twice against capacity; overflowing
    /// capacity evicts the single least-recently-used entry.
    pub fn set_with_ttl(&self, key: PlanFingerprint, bundle: CachedBundle, ttl: Duration) {
        // Serialize outside the lock; storing shares the one allocation.
        let rows_json: Arc<str> = match serde_json::to_string(&bundle.rows) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(key = %key, "failed to serialize rows for caching: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = inner.touch(key);
        inner.entries.insert(
            key,
            CacheEntry {
                rows_json,
                chart: bundle.chart,
                insight: bundle.insight,
                expires_at: Instant::now() + ttl,
                stamp,
            },
        );
        if inner.entries.len() > self.max_entries {
            inner.evict_lru();
        }
        inner.compact_recency(self.max_entries);
    }

    /// Remove all entries unconditionally.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.recency.clear();
    }

    /// Current entry count. Does not prune expired entries.
    pub fn size(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    /// Maintenance sweep: drop every expired entry, independent of the lazy
    /// check in `get`. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, "cache cleanup removed expired entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{ChartKind, Granularity, Intent, Plan, Row, TimeWindow};
    use std::collections::BTreeMap;

    fn fingerprint(metric: &str) -> PlanFingerprint {
        Plan {
            intent: Intent::Trend,
            dataset: "cps_tb".to_string(),
            metric: metric.to_string(),
            date_field: "issue_date".to_string(),
            window: TimeWindow::Last30d,
            granularity: Granularity::Daily,
            segments: BTreeMap::new(),
            chart: ChartKind::Line,
        }
        .fingerprint()
    }

    fn bundle(n_rows: usize) -> CachedBundle {
        let mut rows = Vec::new();
        for i in 0..n_rows {
            let mut row = Row::new();
            row.insert("week".to_string(), serde_json::json!(i));
            row.insert("value".to_string(), serde_json::json!(i as f64 * 10.0));
            rows.push(row);
        }
        CachedBundle {
            rows: TableRows(rows),
            chart: Some(ChartSpec(serde_json::json!({"kind": "line"}))),
            insight: None,
        }
    }

    #[test]
    fn get_returns_stored_bundle() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        let key = fingerprint("issued_amnt");
        cache.set(key, bundle(3));

        let got = cache.get(&key).expect("hit");
        assert_eq!(got.rows.len(), 3);
        assert_eq!(got, bundle(3));
        assert!(cache.get(&fingerprint("other")).is_none());
    }

    #[test]
    fn zero_ttl_expires_on_next_read() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        let key = fingerprint("issued_amnt");
        cache.set_with_ttl(key, bundle(1), Duration::ZERO);

        // size() must not prune; only the read does.
        assert_eq!(cache.size(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn entries_expire_after_ttl_without_eviction() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        let key = fingerprint("issued_amnt");
        cache.set_with_ttl(key, bundle(1), Duration::from_millis(20));

        assert!(cache.get(&key).is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn overflow_evicts_exactly_the_lru_entry() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        let (a, b, c) = (
            fingerprint("metric_a"),
            fingerprint("metric_b"),
            fingerprint("metric_c"),
        );
        cache.set(a, bundle(1));
        cache.set(b, bundle(1));

        // Touch `a` so `b` becomes least recently used.
        assert!(cache.get(&a).is_some());

        cache.set(c, bundle(1));
        assert_eq!(cache.size(), 2);
        assert!(cache.get(&b).is_none(), "LRU entry must be evicted");
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn replacing_a_key_does_not_count_twice() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        let (a, b, c) = (
            fingerprint("metric_a"),
            fingerprint("metric_b"),
            fingerprint("metric_c"),
        );
        cache.set(a, bundle(1));
        cache.set(b, bundle(1));
        cache.set(a, bundle(2));
        assert_eq!(cache.size(), 2);

        // Replacement repositioned `a` as most recent, so `b` goes next.
        cache.set(c, bundle(1));
        assert!(cache.get(&b).is_none());
        assert_eq!(cache.get(&a).expect("kept").rows.len(), 2);
    }

    #[test]
    fn cleanup_expired_counts_removals() {
        let cache = ResultCache::new(8, Duration::from_secs(60));
        cache.set_with_ttl(fingerprint("metric_a"), bundle(1), Duration::ZERO);
        cache.set_with_ttl(fingerprint("metric_b"), bundle(1), Duration::ZERO);
        cache.set(fingerprint("metric_c"), bundle(1));

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn clear_removes_everything() {
        let cache = ResultCache::new(8, Duration::from_secs(60));
        cache.set(fingerprint("metric_a"), bundle(1));
        cache.set(fingerprint("metric_b"), bundle(1));
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert!(cache.get(&fingerprint("metric_a")).is_none());
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = ResultCache::new(8, Duration::from_secs(60));
        let key = fingerprint("metric_a");
        assert!(cache.get(&key).is_none());
        cache.set(key, bundle(1));
        assert!(cache.get(&key).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }
}
