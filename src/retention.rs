//! # Stage: Retention manager
//!
//! ## Responsibility
//! Enforce the record budget with a severity-tiered eviction policy: under
//! sustained overflow, high-severity history is preserved preferentially.
//! High-severity records may claim up to half the budget; what remains is
//! split 70/30 between medium and low. Enforcement runs after every insert,
//! not periodically, so the budget invariant holds for every reader.
//!
//! ## Guarantees
//! - The returned set never exceeds `max_records`.
//! - `kept_high == min(high_count, floor(max_records * high_share))`,
//!   whether or not the total is over budget.
//! - Within a tier the most recent records win.
//! - Output is sorted by timestamp descending.

use crate::record::{ErrorRecord, Severity};

/// Severity-tiered retention policy.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Total record budget. Default: 100.
    pub max_records: usize,
    /// Share of the budget reserved for high severity. Default: 0.5.
    pub high_share: f64,
    /// Share of the remainder granted to medium severity. Default: 0.7.
    pub medium_share: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy { max_records: 100, high_share: 0.5, medium_share: 0.7 }
    }
}

impl RetentionPolicy {
    pub fn new(max_records: usize) -> Self {
        RetentionPolicy { max_records, ..RetentionPolicy::default() }
    }

    /// Apply the tiered quotas and return the kept records, newest first.
    ///
    /// Quotas are hard reservations, not an overflow response: a tier over
    /// its cap is trimmed even when the total is under budget.
    pub fn enforce(&self, records: Vec<ErrorRecord>) -> Vec<ErrorRecord> {
        let mut high = Vec::new();
        let mut medium = Vec::new();
        let mut low = Vec::new();
        for record in records {
            match record.severity {
                Severity::High => high.push(record),
                Severity::Medium => medium.push(record),
                Severity::Low => low.push(record),
            }
        }
        for bucket in [&mut high, &mut medium, &mut low] {
            bucket.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        }

        let keep_high = high.len().min((self.max_records as f64 * self.high_share) as usize);
        let remaining = self.max_records - keep_high;
        let keep_medium = medium.len().min((remaining as f64 * self.medium_share) as usize);
        let keep_low = low.len().min(remaining - keep_medium);

        let mut kept: Vec<ErrorRecord> = Vec::with_capacity(keep_high + keep_medium + keep_low);
        kept.extend(high.into_iter().take(keep_high));
        kept.extend(medium.into_iter().take(keep_medium));
        kept.extend(low.into_iter().take(keep_low));
        kept.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        kept
    }
}
