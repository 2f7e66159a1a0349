//! # Stage: Alert engine
//!
//! ## Responsibility
//! Turn error-rate anomalies into stateful alerts. Each [`AlertRule`]
//! declares a rolling window and a threshold: when the count of records
//! inside the window reaches the threshold, one [`Alert`] is created —
//! unless an unresolved alert for the same `(level, window)` pair already
//! exists within the window, in which case the breach is suppressed. Rules
//! are independent and evaluated in declared order, so one evaluation can
//! create zero, one, or several alerts and tests can assert exact sequences.
//!
//! ## Guarantees
//! - At most one unresolved alert per `(level, window)` pair at a time.
//! - Deterministic: rule order is the declared order.
//! - Bounded: the alert list is capped at `max_alerts`; resolved alerts are
//!   evicted before unresolved ones, oldest first.
//!
//! ## NOT Responsible For
//! - Notification delivery (notify stage; failures never roll back an alert)
//! - Persisting the alert list (store stage)

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::record::{ErrorRecord, Severity};

/// A stateful anomaly notification. References no specific record: an alert
/// is a rate phenomenon, not tied to one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub created_at_ms: u64,
    pub level: Severity,
    pub error_count: usize,
    pub threshold: usize,
    pub window_ms: u64,
    pub message: String,
    pub resolved: bool,
}

/// One rolling-window threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub threshold: usize,
    pub window_ms: u64,
    pub level: Severity,
}

const HOUR_MS: u64 = 3_600_000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// The default rule set, in evaluation order.
pub static DEFAULT_RULES: Lazy<Vec<AlertRule>> = Lazy::new(|| {
    vec![
        AlertRule { threshold: 5, window_ms: HOUR_MS, level: Severity::Low },
        AlertRule { threshold: 15, window_ms: HOUR_MS, level: Severity::Medium },
        AlertRule { threshold: 30, window_ms: HOUR_MS, level: Severity::High },
        AlertRule { threshold: 100, window_ms: DAY_MS, level: Severity::High },
    ]
});

/// Filter for the alert read API.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertFilter {
    pub resolved: Option<bool>,
    pub level: Option<Severity>,
}

impl AlertFilter {
    /// Only unresolved alerts.
    pub fn unresolved() -> Self {
        AlertFilter { resolved: Some(false), level: None }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.resolved.map_or(true, |r| alert.resolved == r)
            && self.level.map_or(true, |l| alert.level == l)
    }
}

/// Rolling-window threshold evaluation over the record history.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    max_alerts: usize,
}

impl Default for AlertEngine {
    fn default() -> Self {
        AlertEngine { rules: DEFAULT_RULES.clone(), max_alerts: 50 }
    }
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRule>, max_alerts: usize) -> Self {
        AlertEngine { rules, max_alerts }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Evaluate every rule against the record history at `now_ms`, appending
    /// newly created alerts to `alerts` and returning clones of them for
    /// notification dispatch.
    pub fn evaluate(
        &self,
        now_ms: u64,
        records: &[ErrorRecord],
        alerts: &mut Vec<Alert>,
    ) -> Vec<Alert> {
        let mut created = Vec::new();

        for rule in &self.rules {
            let cutoff = now_ms.saturating_sub(rule.window_ms);
            let count = records.iter().filter(|r| r.timestamp_ms >= cutoff).count();
            if count < rule.threshold {
                continue;
            }

            let already_alerted = alerts.iter().any(|a| {
                !a.resolved
                    && a.level == rule.level
                    && a.window_ms == rule.window_ms
                    && a.created_at_ms > now_ms.saturating_sub(rule.window_ms)
            });
            if already_alerted {
                continue;
            }

            let alert = Alert {
                id: uuid::Uuid::new_v4().to_string(),
                created_at_ms: now_ms,
                level: rule.level,
                error_count: count,
                threshold: rule.threshold,
                window_ms: rule.window_ms,
                message: format!(
                    "{count} errors in the last {} (threshold {})",
                    format_window(rule.window_ms),
                    rule.threshold,
                ),
                resolved: false,
            };
            tracing::debug!(
                level = %alert.level,
                window_ms = alert.window_ms,
                count,
                "alert created"
            );
            alerts.push(alert.clone());
            created.push(alert);
        }

        self.enforce_cap(alerts);
        created
    }

    /// Evict down to `max_alerts`: resolved alerts first, then the oldest.
    fn enforce_cap(&self, alerts: &mut Vec<Alert>) {
        while alerts.len() > self.max_alerts {
            let victim = alerts
                .iter()
                .enumerate()
                .filter(|(_, a)| a.resolved)
                .min_by_key(|(_, a)| a.created_at_ms)
                .map(|(i, _)| i)
                .or_else(|| {
                    alerts
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, a)| a.created_at_ms)
                        .map(|(i, _)| i)
                });
            match victim {
                Some(i) => {
                    alerts.remove(i);
                }
                None => break,
            }
        }
    }
}

/// Render a window length for alert messages: whole hours as `Nh`, otherwise
/// whole minutes as `Nm`, otherwise raw milliseconds.
fn format_window(window_ms: u64) -> String {
    if window_ms >= HOUR_MS && window_ms % HOUR_MS == 0 {
        format!("{}h", window_ms / HOUR_MS)
    } else if window_ms >= 60_000 && window_ms % 60_000 == 0 {
        format!("{}m", window_ms / 60_000)
    } else {
        format!("{window_ms}ms")
    }
}
