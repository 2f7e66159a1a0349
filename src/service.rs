//! # Stage: Error service façade
//!
//! ## Responsibility
//! The public entry point. Classifies raw errors, enriches them with the
//! device/context snapshot, and drives the pipeline: dedup check, store
//! insert, retention enforcement, alert evaluation, notification dispatch,
//! remote reporting. Also exposes the read side (stats, trends, alerts) and
//! the maintenance calls the presentation layer is allowed to make.
//!
//! ## Guarantees
//! - One `record` call creates at most one notification dispatch, even when
//!   several alert rules fire at once (the highest level wins).
//! - A deduplicated submission returns the already-stored record and leaves
//!   the store untouched.
//! - Every mutation invalidates the stats cache before returning.
//! - Notification dispatch runs after the state lock is released; a slow
//!   notifier never stalls the ingest or read paths.
//! - Reporting is fire-and-forget and cannot fail a `record` call.
//!
//! ## NOT Responsible For
//! - Rendering anything (presentation layer)
//! - Durable delivery to the collector (reporter is best-effort)

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::alerts::{Alert, AlertEngine, AlertFilter, AlertRule, DEFAULT_RULES};
use crate::clock::{Clock, SystemClock};
use crate::dedup::Deduplicator;
use crate::error::FaultlineError;
use crate::notify::{LogNotifier, Notifier, NotifyHandle};
use crate::record::{DeviceProbe, ErrorRecord, RawError, Severity, StaticProbe};
use crate::reporter::{Reporter, ReporterConfig};
use crate::retention::RetentionPolicy;
use crate::stats::{StatsAggregator, StatsSnapshot, TrendPoint};
use crate::store::{MemoryBackend, PersistentStore, StorageBackend};

/// Tunables for the engine. Defaults match the shipped policy.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub max_records: usize,
    pub rules: Vec<AlertRule>,
    pub max_alerts: usize,
    pub dedup_window_ms: u64,
    pub dedup_scan_limit: usize,
    pub stats_ttl_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            max_records: 100,
            rules: DEFAULT_RULES.clone(),
            max_alerts: 50,
            dedup_window_ms: 60_000,
            dedup_scan_limit: 50,
            stats_ttl_ms: 300_000,
        }
    }
}

// All pipeline state sits behind one mutex. The pipeline is cheap (bounded
// scans over at most max_records entries) so a single lock keeps the
// dedup-check-then-insert step atomic without finer-grained locking. The
// notifier lives outside, behind its own lock on the service.
struct Inner {
    store: PersistentStore,
    dedup: Deduplicator,
    retention: RetentionPolicy,
    engine: AlertEngine,
    stats: StatsAggregator,
}

/// The telemetry engine. Construct via [`ErrorService::builder`].
pub struct ErrorService {
    inner: Mutex<Inner>,
    // Own lock: a slow notifier serializes only with other dispatches,
    // never with the ingest or read paths.
    notify: Mutex<NotifyHandle>,
    clock: Arc<dyn Clock>,
    probe: Box<dyn DeviceProbe>,
    reporter: Reporter,
}

impl ErrorService {
    pub fn builder() -> ErrorServiceBuilder {
        ErrorServiceBuilder::new()
    }

    /// Classify a raw error without storing it: the record a `record` call
    /// would produce, minus pipeline side effects.
    pub fn classify(&self, raw: RawError) -> ErrorRecord {
        ErrorRecord::ingest(
            raw,
            self.clock.now_ms(),
            self.probe.device_info(),
            self.probe.page_context(),
        )
    }

    /// Submit an error with the probe's ambient context only.
    pub fn record(&self, raw: RawError) -> Result<ErrorRecord, FaultlineError> {
        self.record_with(raw, HashMap::new())
    }

    /// Submit an error with extra context entries layered over the probe's.
    pub fn record_with(
        &self,
        raw: RawError,
        extra_context: HashMap<String, String>,
    ) -> Result<ErrorRecord, FaultlineError> {
        let now_ms = self.clock.now_ms();
        let mut context = self.probe.page_context();
        context.extend(extra_context);
        let candidate = ErrorRecord::ingest(raw, now_ms, self.probe.device_info(), context);

        let mut inner = self.lock();

        if let Some(existing) = inner.dedup.find_duplicate(&candidate, inner.store.records()) {
            let existing = existing.clone();
            tracing::debug!(
                record_id = %existing.id,
                message = %existing.message,
                "duplicate within window, reusing stored record"
            );
            return Ok(existing);
        }

        inner.store.insert_record(candidate.clone());
        {
            let Inner { store, retention, .. } = &mut *inner;
            let kept = retention.enforce(store.take_records());
            store.replace_records(kept);
        }
        inner.store.save_records()?;

        let created = {
            let Inner { store, engine, .. } = &mut *inner;
            let (records, alerts) = store.records_and_alerts_mut();
            engine.evaluate(now_ms, records, alerts)
        };
        if !created.is_empty() {
            inner.store.save_alerts()?;
        }

        inner.stats.invalidate();
        drop(inner);

        // Dispatched after the state lock is released. Several rules may
        // fire at once; only the most severe new alert reaches the
        // notification surface.
        if let Some(top) = created.into_iter().max_by_key(|a| a.level) {
            self.notify.lock().unwrap_or_else(PoisonError::into_inner).dispatch(&top);
        }

        self.reporter.submit(candidate.clone());
        Ok(candidate)
    }

    // --- read side ---------------------------------------------------------

    pub fn stats(&self, recent_count: usize) -> StatsSnapshot {
        let now_ms = self.clock.now_ms();
        let mut inner = self.lock();
        let Inner { store, stats, .. } = &mut *inner;
        stats.snapshot(recent_count, now_ms, store.records(), store.alerts())
    }

    pub fn trend(&self, interval_ms: u64, range_ms: u64) -> Vec<TrendPoint> {
        let now_ms = self.clock.now_ms();
        let mut inner = self.lock();
        let Inner { store, stats, .. } = &mut *inner;
        stats.trend(interval_ms, range_ms, now_ms, store.records())
    }

    pub fn alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        let inner = self.lock();
        inner.store.alerts().iter().filter(|a| filter.matches(a)).cloned().collect()
    }

    // --- maintenance -------------------------------------------------------

    /// Mark one alert resolved. Returns false when the id is unknown.
    pub fn resolve_alert(&self, id: &str) -> Result<bool, FaultlineError> {
        let mut inner = self.lock();
        if !inner.store.resolve_alert(id) {
            return Ok(false);
        }
        inner.store.save_alerts()?;
        inner.stats.invalidate();
        Ok(true)
    }

    /// Drop every stored record.
    pub fn clear(&self) -> Result<(), FaultlineError> {
        let mut inner = self.lock();
        inner.store.clear_records();
        inner.store.save_records()?;
        inner.stats.invalidate();
        Ok(())
    }

    /// Drop all records of one severity. Returns how many went.
    pub fn clear_by_severity(&self, severity: Severity) -> Result<usize, FaultlineError> {
        let mut inner = self.lock();
        let removed = inner.store.clear_records_by_severity(severity);
        inner.store.save_records()?;
        inner.stats.invalidate();
        Ok(removed)
    }

    /// Drop every alert, resolved or not.
    pub fn clear_alerts(&self) -> Result<(), FaultlineError> {
        let mut inner = self.lock();
        inner.store.clear_alerts();
        inner.store.save_alerts()?;
        inner.stats.invalidate();
        Ok(())
    }

    /// Shut down, draining the reporter queue.
    pub async fn close(self) {
        self.reporter.close().await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-pipeline; the state is still a
        // valid store snapshot, so readers carry on.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`ErrorService`]. Every field has a working default: in-memory
/// storage, system clock, static probe, log-backed notifications, reporting
/// disabled.
pub struct ErrorServiceBuilder {
    config: ServiceConfig,
    backend: Box<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    probe: Box<dyn DeviceProbe>,
    notifier: Box<dyn Notifier>,
    reporter: ReporterConfig,
}

impl ErrorServiceBuilder {
    pub fn new() -> Self {
        ErrorServiceBuilder {
            config: ServiceConfig::default(),
            backend: Box::new(MemoryBackend::new()),
            clock: Arc::new(SystemClock),
            probe: Box::new(StaticProbe::default()),
            notifier: Box::new(LogNotifier),
            reporter: ReporterConfig::disabled(),
        }
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(mut self, backend: Box<dyn StorageBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn probe(mut self, probe: Box<dyn DeviceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn reporter(mut self, reporter: ReporterConfig) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn build(self) -> ErrorService {
        let store = PersistentStore::open(self.backend);
        let inner = Inner {
            store,
            dedup: Deduplicator::new(self.config.dedup_window_ms, self.config.dedup_scan_limit),
            retention: RetentionPolicy::new(self.config.max_records),
            engine: AlertEngine::new(self.config.rules.clone(), self.config.max_alerts),
            stats: StatsAggregator::new(self.config.stats_ttl_ms),
        };
        ErrorService {
            inner: Mutex::new(inner),
            notify: Mutex::new(NotifyHandle::new(self.notifier)),
            clock: self.clock,
            probe: self.probe,
            reporter: Reporter::spawn(self.reporter),
        }
    }
}

impl Default for ErrorServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
