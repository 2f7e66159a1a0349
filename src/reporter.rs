//! # Stage: Remote reporter
//!
//! ## Responsibility
//! Best-effort forwarding of stored records to a remote collector endpoint.
//! High-severity records go out immediately; lower severities queue until a
//! batch fills or the reporter shuts down.
//!
//! ## Guarantees
//! - `submit` never blocks and never fails: records are handed to a worker
//!   task over an unbounded channel.
//! - Delivery failures are soft-errors. They are logged and the record is
//!   dropped; nothing is retried and nothing propagates to the ingest path.
//! - No configured endpoint means a no-op reporter, not an error.
//!
//! ## NOT Responsible For
//! - Deciding what gets stored or alerted
//! - Durable delivery guarantees

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::record::{ErrorRecord, Severity};

/// Configuration for the reporting worker.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Collector URL; records are POSTed here one at a time as JSON.
    /// `None` disables reporting entirely.
    pub endpoint: Option<String>,
    /// Low/medium records queue until this many are pending.
    pub batch_size: usize,
    /// TCP connection timeout.
    pub connect_timeout: Duration,
    /// Per-request read timeout.
    pub request_timeout: Duration,
}

impl ReporterConfig {
    /// Config with sensible defaults.
    ///
    /// - batch_size: 10
    /// - connect_timeout: 3 s
    /// - request_timeout: 10 s
    pub fn new(endpoint: impl Into<String>) -> Self {
        ReporterConfig {
            endpoint: Some(endpoint.into()),
            batch_size: 10,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// A reporter that accepts and discards everything.
    pub fn disabled() -> Self {
        ReporterConfig {
            endpoint: None,
            batch_size: 10,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }
}

enum Command {
    Submit(ErrorRecord),
    Flush,
}

/// Handle to the background reporting worker.
pub struct Reporter {
    tx: Option<mpsc::UnboundedSender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl Reporter {
    /// Spawn the worker task. With no endpoint configured, or outside a
    /// tokio runtime, this returns an inert handle and spawns nothing.
    pub fn spawn(config: ReporterConfig) -> Self {
        let endpoint = match config.endpoint.clone() {
            Some(url) => url,
            None => {
                debug!("no collector endpoint configured, reporting disabled");
                return Reporter { tx: None, worker: None };
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no tokio runtime available, reporting disabled");
                return Reporter { tx: None, worker: None };
            }
        };

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handle.spawn(run_worker(rx, client, endpoint, config.batch_size.max(1)));
        Reporter { tx: Some(tx), worker: Some(worker) }
    }

    /// True when a collector endpoint is configured.
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Hand one record to the worker. Fire-and-forget: a closed channel or
    /// disabled reporter drops the record silently.
    pub fn submit(&self, record: ErrorRecord) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Command::Submit(record));
        }
    }

    /// Ask the worker to send everything currently queued.
    pub fn flush(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Command::Flush);
        }
    }

    /// Close the channel and wait for the worker to drain its queue.
    pub async fn close(mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Command>,
    client: reqwest::Client,
    endpoint: String,
    batch_size: usize,
) {
    let mut pending: Vec<ErrorRecord> = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Submit(record) => {
                if record.severity == Severity::High {
                    post_record(&client, &endpoint, &record).await;
                } else {
                    pending.push(record);
                    if pending.len() >= batch_size {
                        drain(&client, &endpoint, &mut pending).await;
                    }
                }
            }
            Command::Flush => drain(&client, &endpoint, &mut pending).await,
        }
    }

    // Channel closed on shutdown; whatever queued still goes out.
    drain(&client, &endpoint, &mut pending).await;
}

async fn drain(client: &reqwest::Client, endpoint: &str, pending: &mut Vec<ErrorRecord>) {
    for record in pending.drain(..) {
        post_record(client, endpoint, &record).await;
    }
}

async fn post_record(client: &reqwest::Client, endpoint: &str, record: &ErrorRecord) {
    match client.post(endpoint).json(record).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!(record_id = %record.id, "record reported");
        }
        Ok(resp) => {
            warn!(
                record_id = %record.id,
                status = resp.status().as_u16(),
                url = endpoint,
                "collector rejected record, dropping"
            );
        }
        Err(e) => {
            warn!(
                record_id = %record.id,
                error = %e,
                url = endpoint,
                "failed to reach collector, dropping record"
            );
        }
    }
}
