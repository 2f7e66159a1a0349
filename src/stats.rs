//! # Stage: Stats aggregator
//!
//! ## Responsibility
//! Point-in-time statistics (by kind / severity / device / browser / OS) and
//! time-bucketed trends over the record history, plus a short-lived cache
//! keyed by call parameters. The cache is an optimization only: any mutation
//! of the store invalidates it wholesale, so results are identical whether
//! computed fresh or served from cache.
//!
//! ## Guarantees
//! - Copy-on-read: callers receive owned snapshots, never live references.
//! - `snapshot(n).recent` has length `min(n, total)` and is sorted by
//!   timestamp descending.
//! - Bounded: aggregation is O(record cap); trend series are capped at
//!   [`MAX_TREND_BUCKETS`] buckets.
//!
//! ## NOT Responsible For
//! - Deciding what is stored (retention stage)
//! - Alert lifecycle (alert engine) — it only summarizes the alert list

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::alerts::Alert;
use crate::record::{ErrorRecord, Severity};

/// Hard cap on the number of buckets one trend query may produce.
pub const MAX_TREND_BUCKETS: usize = 1_000;

/// How many high-severity records a snapshot surfaces as "critical".
const CRITICAL_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Summary of the alert list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: usize,
    pub unresolved: usize,
    pub by_level: HashMap<String, usize>,
}

/// Point-in-time statistics over the record history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: usize,
    pub by_kind: HashMap<String, usize>,
    pub by_severity: HashMap<String, usize>,
    pub by_device: HashMap<String, usize>,
    pub by_browser: HashMap<String, usize>,
    pub by_os: HashMap<String, usize>,
    /// Most recent records, newest first, at most the requested count.
    pub recent: Vec<ErrorRecord>,
    /// Most recent high-severity records, newest first, at most ten.
    pub critical: Vec<ErrorRecord>,
    pub alerts: AlertStats,
}

/// One bucket of a trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket_start_ms: u64,
    pub total: usize,
    pub by_severity: HashMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Aggregation (pure)
// ---------------------------------------------------------------------------

/// Compute a snapshot from scratch. `records` must be newest-first.
pub fn compute_snapshot(
    recent_count: usize,
    records: &[ErrorRecord],
    alerts: &[Alert],
) -> StatsSnapshot {
    let mut by_kind: HashMap<String, usize> = HashMap::new();
    let mut by_severity: HashMap<String, usize> = HashMap::new();
    let mut by_device: HashMap<String, usize> = HashMap::new();
    let mut by_browser: HashMap<String, usize> = HashMap::new();
    let mut by_os: HashMap<String, usize> = HashMap::new();

    for record in records {
        *by_kind.entry(record.kind.to_string()).or_insert(0) += 1;
        *by_severity.entry(record.severity.to_string()).or_insert(0) += 1;
        *by_device.entry(record.device.device_class.clone()).or_insert(0) += 1;
        *by_browser.entry(record.device.browser_family.clone()).or_insert(0) += 1;
        *by_os.entry(record.device.os_family.clone()).or_insert(0) += 1;
    }

    let recent: Vec<ErrorRecord> = records.iter().take(recent_count).cloned().collect();
    let critical: Vec<ErrorRecord> = records
        .iter()
        .filter(|r| r.severity == Severity::High)
        .take(CRITICAL_LIMIT)
        .cloned()
        .collect();

    let mut by_level: HashMap<String, usize> = HashMap::new();
    for alert in alerts {
        *by_level.entry(alert.level.to_string()).or_insert(0) += 1;
    }
    let alerts = AlertStats {
        total: alerts.len(),
        unresolved: alerts.iter().filter(|a| !a.resolved).count(),
        by_level,
    };

    StatsSnapshot {
        total: records.len(),
        by_kind,
        by_severity,
        by_device,
        by_browser,
        by_os,
        recent,
        critical,
        alerts,
    }
}

/// Compute a trend series covering `[now - range, now]` in `interval`-sized
/// buckets, oldest bucket first. Empty buckets are emitted with zero counts
/// so chart consumers always get a dense series.
pub fn compute_trend(
    interval_ms: u64,
    range_ms: u64,
    now_ms: u64,
    records: &[ErrorRecord],
) -> Vec<TrendPoint> {
    if interval_ms == 0 || range_ms == 0 {
        return Vec::new();
    }
    let bucket_count = (range_ms.div_ceil(interval_ms) as usize).min(MAX_TREND_BUCKETS);
    let range_start = now_ms.saturating_sub(range_ms);

    let mut points: Vec<TrendPoint> = (0..bucket_count)
        .map(|i| TrendPoint {
            bucket_start_ms: range_start + i as u64 * interval_ms,
            total: 0,
            by_severity: HashMap::new(),
        })
        .collect();

    for record in records {
        if record.timestamp_ms < range_start || record.timestamp_ms > now_ms {
            continue;
        }
        let offset = (record.timestamp_ms - range_start) / interval_ms;
        let index = (offset as usize).min(bucket_count - 1);
        points[index].total += 1;
        *points[index]
            .by_severity
            .entry(record.severity.to_string())
            .or_insert(0) += 1;
    }

    points
}

// ---------------------------------------------------------------------------
// StatsAggregator — TTL cache over the pure functions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum CachedValue {
    Snapshot(StatsSnapshot),
    Trend(Vec<TrendPoint>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    inserted_ms: u64,
}

/// TTL cache keyed by call parameters, with coarse whole-cache invalidation:
/// correctness over hit-rate.
pub struct StatsAggregator {
    ttl_ms: u64,
    cache: HashMap<String, CacheEntry>,
}

impl StatsAggregator {
    /// Default TTL: 5 minutes.
    pub fn new(ttl_ms: u64) -> Self {
        StatsAggregator { ttl_ms, cache: HashMap::new() }
    }

    /// Snapshot, served from cache when a live entry exists.
    pub fn snapshot(
        &mut self,
        recent_count: usize,
        now_ms: u64,
        records: &[ErrorRecord],
        alerts: &[Alert],
    ) -> StatsSnapshot {
        let key = format!("snapshot:{recent_count}");
        if let Some(CachedValue::Snapshot(hit)) = self.lookup(&key, now_ms) {
            return hit;
        }
        let snapshot = compute_snapshot(recent_count, records, alerts);
        self.cache.insert(
            key,
            CacheEntry { value: CachedValue::Snapshot(snapshot.clone()), inserted_ms: now_ms },
        );
        snapshot
    }

    /// Trend series, served from cache when a live entry exists.
    pub fn trend(
        &mut self,
        interval_ms: u64,
        range_ms: u64,
        now_ms: u64,
        records: &[ErrorRecord],
    ) -> Vec<TrendPoint> {
        let key = format!("trend:{interval_ms}:{range_ms}");
        if let Some(CachedValue::Trend(hit)) = self.lookup(&key, now_ms) {
            return hit;
        }
        let series = compute_trend(interval_ms, range_ms, now_ms, records);
        self.cache.insert(
            key,
            CacheEntry { value: CachedValue::Trend(series.clone()), inserted_ms: now_ms },
        );
        series
    }

    fn lookup(&mut self, key: &str, now_ms: u64) -> Option<CachedValue> {
        let ttl = self.ttl_ms;
        self.cache.retain(|_, e| now_ms.saturating_sub(e.inserted_ms) < ttl);
        self.cache.get(key).map(|e| e.value.clone())
    }

    /// Drop every cached result. Called on any store mutation.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
