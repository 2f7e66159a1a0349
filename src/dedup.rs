//! # Stage: Deduplicator
//!
//! ## Responsibility
//! Decide whether an incoming record is a repeat of recent history. An error
//! storm (a render loop throwing the same fault every frame) must not
//! exhaust the retention budget or spam the alert engine, so a candidate
//! identical in `(message, kind, location)` to a record seen within the
//! dedup window is dropped in favor of the stored one.
//!
//! ## Guarantees
//! - Bounded: at most `scan_limit` recent records are examined per check,
//!   and the scan stops at the first record older than the window.
//! - Deterministic: same candidate against the same history gives the same
//!   answer.
//!
//! ## NOT Responsible For
//! - Fuzzy/semantic matching — equality on the three fields only
//! - Cross-process deduplication

use crate::record::ErrorRecord;

/// Configuration for [`Deduplicator`].
#[derive(Debug, Clone)]
pub struct Deduplicator {
    /// Two records further apart than this are never duplicates.
    /// Default: 60 000 ms.
    pub window_ms: u64,
    /// Hard cap on how many recent records are scanned. Default: 50.
    pub scan_limit: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Deduplicator { window_ms: 60_000, scan_limit: 50 }
    }
}

impl Deduplicator {
    pub fn new(window_ms: u64, scan_limit: usize) -> Self {
        Deduplicator { window_ms, scan_limit }
    }

    /// Find the stored record the candidate duplicates, if any.
    ///
    /// `recent` must be sorted newest-first (the store's order); the scan
    /// covers the first `scan_limit` entries and bails out early once
    /// records fall outside the window.
    pub fn find_duplicate<'a>(
        &self,
        candidate: &ErrorRecord,
        recent: &'a [ErrorRecord],
    ) -> Option<&'a ErrorRecord> {
        for stored in recent.iter().take(self.scan_limit) {
            let age = candidate.timestamp_ms.abs_diff(stored.timestamp_ms);
            if age >= self.window_ms {
                break; // sorted newest-first: everything after is older still
            }
            if stored.message == candidate.message
                && stored.kind == candidate.kind
                && stored.location == candidate.location
            {
                return Some(stored);
            }
        }
        None
    }

    /// `true` when the candidate should be dropped as a repeat.
    pub fn is_duplicate(&self, candidate: &ErrorRecord, recent: &[ErrorRecord]) -> bool {
        self.find_duplicate(candidate, recent).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DeviceInfo, RawError};
    use std::collections::HashMap;

    fn record(ts: u64, message: &str) -> ErrorRecord {
        ErrorRecord::ingest(
            RawError::new("Error", message),
            ts,
            DeviceInfo::default(),
            HashMap::new(),
        )
    }

    fn newest_first(mut records: Vec<ErrorRecord>) -> Vec<ErrorRecord> {
        records.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        records
    }

    #[test]
    fn test_defaults() {
        let d = Deduplicator::default();
        assert_eq!(d.window_ms, 60_000);
        assert_eq!(d.scan_limit, 50);
    }

    #[test]
    fn test_identical_within_window_is_duplicate() {
        let d = Deduplicator::default();
        let stored = newest_first(vec![record(1_000, "boom")]);
        let candidate = record(30_000, "boom");
        assert!(d.is_duplicate(&candidate, &stored));
    }

    #[test]
    fn test_beyond_window_is_not_duplicate() {
        let d = Deduplicator::default();
        let stored = newest_first(vec![record(1_000, "boom")]);
        let candidate = record(61_001, "boom");
        assert!(!d.is_duplicate(&candidate, &stored));
    }

    #[test]
    fn test_exactly_at_window_boundary_is_not_duplicate() {
        // The window is exclusive: |Δt| must be strictly below it.
        let d = Deduplicator::default();
        let stored = newest_first(vec![record(0, "boom")]);
        let candidate = record(60_000, "boom");
        assert!(!d.is_duplicate(&candidate, &stored));
    }

    #[test]
    fn test_different_message_is_not_duplicate() {
        let d = Deduplicator::default();
        let stored = newest_first(vec![record(1_000, "boom")]);
        let candidate = record(2_000, "bang");
        assert!(!d.is_duplicate(&candidate, &stored));
    }

    #[test]
    fn test_different_kind_is_not_duplicate() {
        let d = Deduplicator::default();
        // Same message text, but the name drives a different classification.
        let stored = newest_first(vec![ErrorRecord::ingest(
            RawError::new("TypeError", "status 404"),
            1_000,
            DeviceInfo::default(),
            HashMap::new(),
        )]);
        let mut candidate = record(2_000, "status 404");
        candidate.kind = crate::record::ErrorKind::Server;
        assert!(!d.is_duplicate(&candidate, &stored));
    }

    #[test]
    fn test_different_location_is_not_duplicate() {
        let d = Deduplicator::default();
        let mut a = record(1_000, "boom");
        a.location = Some("app.js:3".to_string());
        let mut b = record(2_000, "boom");
        b.location = Some("app.js:9".to_string());
        assert!(!d.is_duplicate(&b, &[a]));
    }

    #[test]
    fn test_scan_limit_bounds_the_search() {
        let d = Deduplicator::new(60_000, 3);
        // Four distinct newer records bury the matching one past the limit.
        let mut stored = vec![record(5_000, "boom")];
        for i in 0..4 {
            stored.push(record(6_000 + i, &format!("filler-{i}")));
        }
        let stored = newest_first(stored);
        let candidate = record(7_000, "boom");
        assert!(!d.is_duplicate(&candidate, &stored));
    }

    #[test]
    fn test_scan_stops_at_first_stale_record() {
        let d = Deduplicator::default();
        // History: one stale record, then (older, but Δt small because the
        // list is what matters) — with newest-first order, once a record is
        // outside the window every later one is too.
        let stored = newest_first(vec![record(1_000, "boom"), record(500, "boom")]);
        let candidate = record(70_000, "boom");
        assert!(!d.is_duplicate(&candidate, &stored));
    }

    #[test]
    fn test_find_duplicate_returns_stored_record() {
        let d = Deduplicator::default();
        let stored = newest_first(vec![record(1_000, "boom")]);
        let candidate = record(2_000, "boom");
        let hit = d.find_duplicate(&candidate, &stored).expect("duplicate");
        assert_eq!(hit.id, stored[0].id);
    }

    #[test]
    fn test_empty_history_is_never_duplicate() {
        let d = Deduplicator::default();
        assert!(!d.is_duplicate(&record(1, "boom"), &[]));
    }
}
