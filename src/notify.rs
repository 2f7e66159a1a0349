//! # Stage: Notification surface
//!
//! ## Responsibility
//! Deliver freshly created alerts to whatever "show alert" capability the
//! host environment offers. Permission is probed at most once; a denied
//! capability turns every dispatch into a silent no-op.
//!
//! ## Guarantees
//! - `NotifyHandle` asks for permission exactly once, on first dispatch.
//! - Dispatch never fails upward. A notifier that errors internally is
//!   expected to log and swallow.
//!
//! ## NOT Responsible For
//! - Deciding which alerts warrant a notification (alert engine / service)
//! - Alert persistence

use crate::alerts::Alert;

/// Outcome of the one-time capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// A host "show alert" capability. Implementations are infallible from the
/// caller's point of view.
pub trait Notifier: Send {
    /// Probe (and if needed request) the underlying capability. Called at
    /// most once per handle.
    fn request_permission(&mut self) -> Permission;

    /// Deliver one alert. Only called after a `Granted` probe.
    fn notify(&mut self, alert: &Alert);
}

/// Headless environments get this: permission denied, nothing delivered.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn request_permission(&mut self) -> Permission {
        Permission::Denied
    }

    fn notify(&mut self, _alert: &Alert) {}
}

/// Emits alerts as structured log events. The default for server contexts,
/// where the operator's "notification tray" is the log stream.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn request_permission(&mut self) -> Permission {
        Permission::Granted
    }

    fn notify(&mut self, alert: &Alert) {
        tracing::warn!(
            alert_id = %alert.id,
            level = %alert.level,
            error_count = alert.error_count,
            "{}",
            alert.message
        );
    }
}

/// Wraps a notifier and enforces the at-most-once permission probe.
pub struct NotifyHandle {
    inner: Box<dyn Notifier>,
    permission: Option<Permission>,
}

impl NotifyHandle {
    pub fn new(inner: Box<dyn Notifier>) -> Self {
        NotifyHandle { inner, permission: None }
    }

    /// Dispatch one alert, probing permission on the first call. Denied
    /// permission is remembered and skips silently forever after.
    pub fn dispatch(&mut self, alert: &Alert) {
        let permission = match self.permission {
            Some(p) => p,
            None => {
                let p = self.inner.request_permission();
                if p == Permission::Denied {
                    tracing::debug!("notification permission denied, alerts stay in-store only");
                }
                self.permission = Some(p);
                p
            }
        };
        if permission == Permission::Granted {
            self.inner.notify(alert);
        }
    }
}
