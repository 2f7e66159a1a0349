//! End-to-end tests for the telemetry engine — full pipeline through the
//! service façade, durable-slot persistence, and the severity taxonomy.

use std::sync::Arc;

use rstest::rstest;

use faultline::{
    AlertFilter, AlertRule, ErrorKind, ErrorService, FileBackend, ManualClock, RawError,
    ServiceConfig, Severity,
};

fn service_at(now_ms: u64) -> (ErrorService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now_ms));
    let service = ErrorService::builder().clock(clock.clone()).build();
    (service, clock)
}

fn file_service(dir: &std::path::Path, clock: Arc<ManualClock>) -> ErrorService {
    let backend = FileBackend::new(dir).expect("create backend dir");
    ErrorService::builder().backend(Box::new(backend)).clock(clock).build()
}

// -- classification taxonomy -----------------------------------------------

#[rstest]
#[case("Error", "Failed to fetch", ErrorKind::Network, Severity::High)]
#[case("Error", "NetworkError when attempting to fetch", ErrorKind::Network, Severity::High)]
#[case("Error", "request timed out after 30s", ErrorKind::Timeout, Severity::High)]
#[case("Error", "401 Unauthorized", ErrorKind::Auth, Severity::High)]
#[case("Error", "403 Forbidden", ErrorKind::Forbidden, Severity::High)]
#[case("Error", "404 Not Found", ErrorKind::ResourceNotFound, Severity::Medium)]
#[case("Error", "500 Internal Server Error", ErrorKind::Server, Severity::High)]
#[case("NotAllowedError", "permission denied", ErrorKind::PermissionDenied, Severity::High)]
#[case("Error", "blocked by CORS policy", ErrorKind::Cors, Severity::Medium)]
#[case("TypeError", "x is not a function", ErrorKind::Type, Severity::Low)]
#[case("ReferenceError", "y is not defined", ErrorKind::Reference, Severity::Low)]
#[case("SyntaxError", "unexpected token", ErrorKind::Syntax, Severity::Low)]
#[case("RangeError", "invalid array length", ErrorKind::Range, Severity::Low)]
#[case("URIError", "malformed URI sequence", ErrorKind::Uri, Severity::Low)]
#[case("Error", "something inexplicable", ErrorKind::Unknown, Severity::Medium)]
fn test_classification_taxonomy(
    #[case] name: &str,
    #[case] message: &str,
    #[case] kind: ErrorKind,
    #[case] severity: Severity,
) {
    let (service, _clock) = service_at(1_000);
    let record = service.classify(RawError::new(name, message));
    assert_eq!(record.kind, kind, "{name}: {message}");
    assert_eq!(record.severity, severity, "{name}: {message}");
}

#[test]
fn test_bare_taxonomy_code_classifies_directly() {
    let (service, _clock) = service_at(1_000);
    let record = service.classify(RawError::code("NETWORK_ERROR"));
    assert_eq!(record.kind, ErrorKind::Network);
    assert_eq!(record.severity, Severity::High);
}

// -- dedup through the pipeline --------------------------------------------

#[test]
fn test_identical_errors_within_window_stored_once() {
    let (service, clock) = service_at(10_000);
    let first = service.record(RawError::new("Error", "Failed to fetch")).unwrap();
    clock.advance(59_999);
    let second = service.record(RawError::new("Error", "Failed to fetch")).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(service.stats(10).total, 1);
}

#[test]
fn test_identical_errors_beyond_window_stored_twice() {
    let (service, clock) = service_at(10_000);
    service.record(RawError::new("Error", "Failed to fetch")).unwrap();
    clock.advance(60_000);
    service.record(RawError::new("Error", "Failed to fetch")).unwrap();
    assert_eq!(service.stats(10).total, 2);
}

#[test]
fn test_different_messages_never_deduplicate() {
    let (service, clock) = service_at(10_000);
    service.record(RawError::new("Error", "Failed to fetch")).unwrap();
    clock.advance(1);
    service.record(RawError::new("Error", "request timed out")).unwrap();
    assert_eq!(service.stats(10).total, 2);
}

// -- retention under sustained overflow ------------------------------------

#[test]
fn test_retention_budget_holds_after_every_insert() {
    let clock = Arc::new(ManualClock::new(0));
    let config = ServiceConfig { max_records: 10, ..ServiceConfig::default() };
    let service = ErrorService::builder().config(config).clock(clock.clone()).build();
    for i in 0..50 {
        clock.advance(61_000);
        let message = if i % 3 == 0 {
            format!("timed out {i}") // high
        } else {
            format!("oddity {i}") // unknown, medium
        };
        service.record(RawError::new("Error", message)).unwrap();
        assert!(service.stats(50).total <= 10, "budget exceeded at insert {i}");
    }
}

#[test]
fn test_high_severity_survives_low_severity_flood() {
    let clock = Arc::new(ManualClock::new(0));
    let config = ServiceConfig { max_records: 10, ..ServiceConfig::default() };
    let service = ErrorService::builder().config(config).clock(clock.clone()).build();
    for i in 0..4 {
        clock.advance(61_000);
        service.record(RawError::new("Error", format!("timed out {i}"))).unwrap();
    }
    for i in 0..40 {
        clock.advance(61_000);
        service.record(RawError::new("TypeError", format!("t {i}"))).unwrap();
    }
    let snapshot = service.stats(10);
    assert_eq!(snapshot.total, 10);
    // High severity may claim up to half the budget and there were only 4.
    assert_eq!(snapshot.by_severity.get("high"), Some(&4));
}

// -- alert lifecycle --------------------------------------------------------

#[test]
fn test_sixth_error_in_an_hour_raises_low_alert() {
    let (service, clock) = service_at(0);
    for i in 0..4 {
        clock.advance(61_000);
        service.record(RawError::new("TypeError", format!("t {i}"))).unwrap();
        assert!(service.alerts(&AlertFilter::default()).is_empty());
    }
    clock.advance(61_000);
    service.record(RawError::new("TypeError", "t 4")).unwrap();
    let alerts = service.alerts(&AlertFilter::unresolved());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].level, Severity::Low);
    assert_eq!(alerts[0].error_count, 5);
}

#[test]
fn test_resolving_alert_rearms_the_rule() {
    let (service, clock) = service_at(0);
    for i in 0..5 {
        clock.advance(61_000);
        service.record(RawError::new("TypeError", format!("t {i}"))).unwrap();
    }
    let first = service.alerts(&AlertFilter::unresolved());
    assert_eq!(first.len(), 1);
    service.resolve_alert(&first[0].id).unwrap();

    clock.advance(61_000);
    service.record(RawError::new("TypeError", "after resolve")).unwrap();
    let unresolved = service.alerts(&AlertFilter::unresolved());
    assert_eq!(unresolved.len(), 1, "resolved alert no longer suppresses");
    assert_ne!(unresolved[0].id, first[0].id);
}

#[test]
fn test_alert_filter_by_level() {
    let clock = Arc::new(ManualClock::new(0));
    let config = ServiceConfig {
        rules: vec![
            AlertRule { threshold: 2, window_ms: 3_600_000, level: Severity::Low },
            AlertRule { threshold: 4, window_ms: 3_600_000, level: Severity::High },
        ],
        ..ServiceConfig::default()
    };
    let service = ErrorService::builder().config(config).clock(clock.clone()).build();
    for i in 0..4 {
        clock.advance(61_000);
        service.record(RawError::new("Error", format!("e {i}"))).unwrap();
    }
    let high_only =
        AlertFilter { level: Some(Severity::High), ..AlertFilter::default() };
    let highs = service.alerts(&high_only);
    assert_eq!(highs.len(), 1);
    assert_eq!(highs[0].level, Severity::High);
    assert_eq!(service.alerts(&AlertFilter::default()).len(), 2);
}

// -- persistence across restarts --------------------------------------------

#[test]
fn test_records_and_alerts_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new(0));

    let service = file_service(dir.path(), Arc::clone(&clock));
    for i in 0..5 {
        clock.advance(61_000);
        service.record(RawError::new("TypeError", format!("t {i}"))).unwrap();
    }
    let before = service.stats(10);
    assert_eq!(before.total, 5);
    assert_eq!(service.alerts(&AlertFilter::unresolved()).len(), 1);
    drop(service);

    let reopened = file_service(dir.path(), Arc::clone(&clock));
    let after = reopened.stats(10);
    assert_eq!(after.total, 5);
    assert_eq!(reopened.alerts(&AlertFilter::unresolved()).len(), 1);
}

#[test]
fn test_corrupt_record_slot_recovers_to_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new(0));

    let service = file_service(dir.path(), Arc::clone(&clock));
    clock.advance(61_000);
    service.record(RawError::new("Error", "before corruption")).unwrap();
    drop(service);

    std::fs::write(dir.path().join("errors.json"), "{not json").expect("corrupt slot");

    let reopened = file_service(dir.path(), Arc::clone(&clock));
    assert_eq!(reopened.stats(10).total, 0, "corrupt slot loads as empty");
    clock.advance(61_000);
    reopened.record(RawError::new("Error", "after corruption")).unwrap();
    assert_eq!(reopened.stats(10).total, 1, "engine keeps working");
}

#[test]
fn test_corrupt_alert_slot_leaves_records_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new(0));

    let service = file_service(dir.path(), Arc::clone(&clock));
    for i in 0..5 {
        clock.advance(61_000);
        service.record(RawError::new("TypeError", format!("t {i}"))).unwrap();
    }
    drop(service);

    std::fs::write(dir.path().join("alerts.json"), "[[[").expect("corrupt slot");

    let reopened = file_service(dir.path(), Arc::clone(&clock));
    assert_eq!(reopened.stats(10).total, 5, "record slot unaffected");
    assert!(reopened.alerts(&AlertFilter::default()).is_empty());
}

// -- stats and trends --------------------------------------------------------

#[test]
fn test_snapshot_recent_is_newest_first() {
    let (service, clock) = service_at(0);
    for i in 0..5 {
        clock.advance(61_000);
        service.record(RawError::new("Error", format!("distinct {i}"))).unwrap();
    }
    let snapshot = service.stats(3);
    assert_eq!(snapshot.recent.len(), 3);
    assert!(snapshot.recent[0].timestamp_ms > snapshot.recent[1].timestamp_ms);
    assert!(snapshot.recent[1].timestamp_ms > snapshot.recent[2].timestamp_ms);
}

#[test]
fn test_clear_by_severity_keeps_other_tiers() {
    let (service, clock) = service_at(0);
    clock.advance(61_000);
    service.record(RawError::new("Error", "timed out")).unwrap(); // high
    clock.advance(61_000);
    service.record(RawError::new("TypeError", "t")).unwrap(); // low
    clock.advance(61_000);
    service.record(RawError::new("Error", "oddity")).unwrap(); // medium/unknown

    assert_eq!(service.clear_by_severity(Severity::Low).unwrap(), 1);
    let snapshot = service.stats(10);
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.by_severity.get("low"), None);
}

#[test]
fn test_trend_buckets_follow_record_timestamps() {
    let (service, clock) = service_at(0);
    clock.advance(120_000);
    service.record(RawError::new("Error", "a")).unwrap();
    clock.advance(120_000);
    service.record(RawError::new("Error", "b")).unwrap();
    clock.advance(60_000); // now = 300_000

    let series = service.trend(60_000, 300_000);
    assert_eq!(series.len(), 5);
    let total: usize = series.iter().map(|p| p.total).sum();
    assert_eq!(total, 2);
    // Buckets are half-open: a timestamp on a boundary opens the next bucket.
    assert_eq!(series[2].total, 1, "record at 120s opens the bucket starting there");
    assert_eq!(series[4].total, 1, "record at 240s opens the bucket starting there");
}
