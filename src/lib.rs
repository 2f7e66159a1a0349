//! Faultline — an embeddable error telemetry and alerting engine.
//!
//! Raw errors come in, get classified into a severity taxonomy, deduplicated
//! against recent history, stored under a tiered retention budget, counted
//! against rolling-window alert thresholds, and optionally forwarded to a
//! remote collector. The whole pipeline runs through [`ErrorService`]:
//!
//! ```rust,ignore
//! let service = ErrorService::builder()
//!     .backend(Box::new(FileBackend::new("/var/lib/faultline")?))
//!     .build();
//! service.record(RawError::new("TypeError", "x is not a function"))?;
//! let snapshot = service.stats(20);
//! ```

pub mod alerts;
pub mod clock;
pub mod dedup;
pub mod error;
pub mod notify;
pub mod record;
pub mod reporter;
pub mod retention;
pub mod service;
pub mod stats;
pub mod store;

pub use alerts::{Alert, AlertEngine, AlertFilter, AlertRule, DEFAULT_RULES};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::Deduplicator;
pub use error::FaultlineError;
pub use notify::{LogNotifier, NoopNotifier, Notifier, Permission};
pub use record::{
    DeviceInfo, DeviceProbe, ErrorKind, ErrorRecord, RawError, Severity, StaticProbe,
};
pub use reporter::{Reporter, ReporterConfig};
pub use retention::RetentionPolicy;
pub use service::{ErrorService, ErrorServiceBuilder, ServiceConfig};
pub use stats::{AlertStats, StatsAggregator, StatsSnapshot, TrendPoint};
pub use store::{FileBackend, MemoryBackend, PersistentStore, StorageBackend};
