//! # Stage: Persistent store
//!
//! ## Responsibility
//! Bounded storage of error records and alerts over two named durable slots
//! (`errors`, `alerts`), mirroring the single key-value surface the engine is
//! given by its host. [`PersistentStore`] owns (de)serialization, logical
//! newest-first ordering, and recovery from corrupt payloads; the raw slot
//! I/O lives behind [`StorageBackend`] so tests run against memory and hosts
//! pick a durable backend.
//!
//! ## Guarantees
//! - Each slot independently tolerates being absent, empty, or malformed:
//!   load resets that slot to empty (with a warning) instead of failing the
//!   whole service.
//! - Physical slot order is irrelevant; reads re-sort by timestamp
//!   descending.
//! - Non-panicking: no `unwrap` or `expect` in any production path.
//!
//! ## NOT Responsible For
//! - Enforcing the retention budget (retention stage)
//! - Deciding what counts as a duplicate (dedup stage)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::alerts::Alert;
use crate::error::FaultlineError;
use crate::record::{ErrorRecord, Severity};

/// Durable slot holding the error record array.
pub const RECORDS_SLOT: &str = "errors";
/// Durable slot holding the alert array.
pub const ALERTS_SLOT: &str = "alerts";

// ---------------------------------------------------------------------------
// StorageBackend
// ---------------------------------------------------------------------------

/// Raw slot I/O: named string payloads, no structure.
pub trait StorageBackend: Send + Sync {
    /// Read a slot. `Ok(None)` when the slot has never been written.
    fn read(&self, slot: &str) -> Result<Option<String>, FaultlineError>;
    fn write(&self, slot: &str, payload: &str) -> Result<(), FaultlineError>;
    fn remove(&self, slot: &str) -> Result<(), FaultlineError>;
}

/// Volatile backend for tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, slot: &str) -> Result<Option<String>, FaultlineError> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| FaultlineError::Backend("memory backend poisoned".to_string()))?;
        Ok(slots.get(slot).cloned())
    }

    fn write(&self, slot: &str, payload: &str) -> Result<(), FaultlineError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| FaultlineError::Backend("memory backend poisoned".to_string()))?;
        slots.insert(slot.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), FaultlineError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| FaultlineError::Backend("memory backend poisoned".to_string()))?;
        slots.remove(slot);
        Ok(())
    }
}

/// Durable backend: one `<slot>.json` file per slot under a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create the backend, making the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, FaultlineError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileBackend { dir })
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, slot: &str) -> Result<Option<String>, FaultlineError> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, slot: &str, payload: &str) -> Result<(), FaultlineError> {
        // Write-then-rename so a crash mid-write cannot corrupt the slot.
        let tmp = self.dir.join(format!("{slot}.json.tmp"));
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, self.slot_path(slot))?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), FaultlineError> {
        match fs::remove_file(self.slot_path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// PersistentStore
// ---------------------------------------------------------------------------

/// In-memory working set backed by the two durable slots.
///
/// Records are held newest-first; alerts in creation order. Mutations are
/// applied in memory and written back explicitly via [`save_records`] /
/// [`save_alerts`] so the caller controls which failures surface.
///
/// [`save_records`]: PersistentStore::save_records
/// [`save_alerts`]: PersistentStore::save_alerts
pub struct PersistentStore {
    backend: Box<dyn StorageBackend>,
    records: Vec<ErrorRecord>,
    alerts: Vec<Alert>,
}

impl PersistentStore {
    /// Open the store, loading both slots. A corrupt or non-array payload in
    /// either slot resets that slot to empty rather than failing.
    pub fn open(backend: Box<dyn StorageBackend>) -> Self {
        let records = load_slot::<ErrorRecord>(backend.as_ref(), RECORDS_SLOT);
        let alerts = load_slot::<Alert>(backend.as_ref(), ALERTS_SLOT);
        let mut store = PersistentStore { backend, records, alerts };
        store.sort_records();
        store
    }

    fn sort_records(&mut self) {
        self.records.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    }

    // -- records ------------------------------------------------------------

    /// All records, newest first.
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Insert a record at its timestamp position (newest first is preserved
    /// for the common append case).
    pub fn insert_record(&mut self, record: ErrorRecord) {
        self.records.insert(0, record);
        self.sort_records();
    }

    /// Replace the whole record set (after retention enforcement).
    pub fn replace_records(&mut self, records: Vec<ErrorRecord>) {
        self.records = records;
        self.sort_records();
    }

    /// Take the record set out for transformation, leaving the store empty.
    pub fn take_records(&mut self) -> Vec<ErrorRecord> {
        std::mem::take(&mut self.records)
    }

    /// Drop every record matching the predicate. Returns how many were
    /// removed.
    pub fn remove_records(&mut self, mut predicate: impl FnMut(&ErrorRecord) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !predicate(r));
        before - self.records.len()
    }

    pub fn clear_records(&mut self) {
        self.records.clear();
    }

    /// Drop every record of the given severity. Returns how many were
    /// removed.
    pub fn clear_records_by_severity(&mut self, severity: Severity) -> usize {
        self.remove_records(|r| r.severity == severity)
    }

    /// Persist the record slot.
    pub fn save_records(&self) -> Result<(), FaultlineError> {
        let payload = serde_json::to_string(&self.records)?;
        self.backend.write(RECORDS_SLOT, &payload)
    }

    // -- alerts -------------------------------------------------------------

    /// All alerts, in creation order.
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut Vec<Alert> {
        &mut self.alerts
    }

    /// Record view plus mutable alert list, for alert evaluation.
    pub fn records_and_alerts_mut(&mut self) -> (&[ErrorRecord], &mut Vec<Alert>) {
        (&self.records, &mut self.alerts)
    }

    /// Mark an alert resolved. Returns `false` when the id is unknown.
    pub fn resolve_alert(&mut self, id: &str) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolved = true;
                true
            }
            None => false,
        }
    }

    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }

    /// Persist the alert slot.
    pub fn save_alerts(&self) -> Result<(), FaultlineError> {
        let payload = serde_json::to_string(&self.alerts)?;
        self.backend.write(ALERTS_SLOT, &payload)
    }
}

/// Load one slot, recovering to empty on any failure.
fn load_slot<T: serde::de::DeserializeOwned>(
    backend: &dyn StorageBackend,
    slot: &str,
) -> Vec<T> {
    let payload = match backend.read(slot) {
        Ok(Some(p)) if !p.trim().is_empty() => p,
        Ok(_) => return Vec::new(),
        Err(e) => {
            tracing::warn!(slot, error = %e, "slot unreadable, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<T>>(&payload) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(slot, error = %e, "corrupt slot payload discarded");
            Vec::new()
        }
    }
}
