//! # Stage: Error model and classification
//!
//! ## Responsibility
//! The canonical shape of one observed error ([`ErrorRecord`]) plus the
//! taxonomy ([`ErrorKind`]), impact tier ([`Severity`]), and the ordered
//! pattern rules that map a raw error onto them. Also owns best-effort
//! `file:line` extraction from a stack trace and the environment probe seam
//! that supplies device/page context.
//!
//! ## Guarantees
//! - Classification is deterministic: same name/message always yields the
//!   same `(kind, severity)`.
//! - Severity is a pure function of kind.
//! - A persisted `ErrorRecord` is immutable; only its presence in the store
//!   changes.
//! - Non-panicking: no `unwrap` or `expect` in any production path.
//!
//! ## NOT Responsible For
//! - Storage, deduplication, retention (downstream stages)
//! - Probing a real browser environment (hosts inject a [`DeviceProbe`])

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Coarse impact tier, assigned deterministically from [`ErrorKind`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorKind taxonomy
// ---------------------------------------------------------------------------

/// Taxonomy tag for one observed error.
///
/// Extensible in one place: add a variant, a tag, a severity arm, and a
/// classification rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum ErrorKind {
    Network,
    Timeout,
    PermissionDenied,
    ResourceNotFound,
    Cors,
    Auth,
    Forbidden,
    Server,
    Type,
    Reference,
    Syntax,
    Range,
    Uri,
    Unknown,
}

impl ErrorKind {
    /// The SCREAMING wire tag for this kind.
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::Cors => "CORS_ERROR",
            ErrorKind::Auth => "AUTH_ERROR",
            ErrorKind::Forbidden => "FORBIDDEN_ERROR",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Type => "TYPE_ERROR",
            ErrorKind::Reference => "REFERENCE_ERROR",
            ErrorKind::Syntax => "SYNTAX_ERROR",
            ErrorKind::Range => "RANGE_ERROR",
            ErrorKind::Uri => "URI_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Parse a bare taxonomy code back into a kind.
    pub fn from_tag(tag: &str) -> Option<ErrorKind> {
        ALL_KINDS.iter().copied().find(|k| k.tag() == tag)
    }

    /// Impact tier for this kind. Pure function: infrastructure and access
    /// failures are high, programmer errors are low, everything else medium.
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::Server
            | ErrorKind::Auth
            | ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::PermissionDenied
            | ErrorKind::Forbidden => Severity::High,
            ErrorKind::Type
            | ErrorKind::Reference
            | ErrorKind::Syntax
            | ErrorKind::Uri
            | ErrorKind::Range => Severity::Low,
            ErrorKind::ResourceNotFound | ErrorKind::Cors | ErrorKind::Unknown => {
                Severity::Medium
            }
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

const ALL_KINDS: [ErrorKind; 14] = [
    ErrorKind::Network,
    ErrorKind::Timeout,
    ErrorKind::PermissionDenied,
    ErrorKind::ResourceNotFound,
    ErrorKind::Cors,
    ErrorKind::Auth,
    ErrorKind::Forbidden,
    ErrorKind::Server,
    ErrorKind::Type,
    ErrorKind::Reference,
    ErrorKind::Syntax,
    ErrorKind::Range,
    ErrorKind::Uri,
    ErrorKind::Unknown,
];

// ---------------------------------------------------------------------------
// Classification rules
// ---------------------------------------------------------------------------

/// One ordered pattern rule: the first rule with a needle found in the
/// lowercased error name or message wins.
struct ClassifyRule {
    kind: ErrorKind,
    needles: &'static [&'static str],
}

/// Rule order matters: more specific patterns (CORS, timeout) come before
/// the broad network bucket, and HTTP-status patterns before the generic
/// JS error names.
static CLASSIFY_RULES: Lazy<Vec<ClassifyRule>> = Lazy::new(|| {
    vec![
        ClassifyRule { kind: ErrorKind::Cors, needles: &["cors", "cross-origin"] },
        ClassifyRule { kind: ErrorKind::Timeout, needles: &["timeout", "timed out"] },
        ClassifyRule {
            kind: ErrorKind::Network,
            needles: &["networkerror", "failed to fetch", "network", "fetch"],
        },
        ClassifyRule { kind: ErrorKind::Auth, needles: &["401", "unauthorized", "auth"] },
        ClassifyRule { kind: ErrorKind::Forbidden, needles: &["403", "forbidden"] },
        ClassifyRule {
            kind: ErrorKind::ResourceNotFound,
            needles: &["404", "not found"],
        },
        ClassifyRule {
            kind: ErrorKind::Server,
            needles: &["500", "502", "503", "internal server", "server error"],
        },
        ClassifyRule {
            kind: ErrorKind::PermissionDenied,
            needles: &["notallowederror", "permission", "denied"],
        },
        ClassifyRule { kind: ErrorKind::Type, needles: &["typeerror"] },
        ClassifyRule { kind: ErrorKind::Reference, needles: &["referenceerror"] },
        ClassifyRule { kind: ErrorKind::Syntax, needles: &["syntaxerror"] },
        ClassifyRule { kind: ErrorKind::Range, needles: &["rangeerror"] },
        ClassifyRule { kind: ErrorKind::Uri, needles: &["urierror"] },
    ]
});

// ---------------------------------------------------------------------------
// RawError — the ingestion input
// ---------------------------------------------------------------------------

/// A raw, unclassified error as observed by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl RawError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        RawError { name: name.into(), message: message.into(), stack: None }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// A bare taxonomy code, e.g. `RawError::code("NETWORK_ERROR")`.
    pub fn code(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        RawError { name: tag.clone(), message: tag, stack: None }
    }
}

/// Classify a raw error into `(kind, severity, location)`.
///
/// A bare taxonomy code in the name short-circuits the pattern rules.
/// Unmatched errors classify as `Unknown` / medium.
pub fn classify(raw: &RawError) -> (ErrorKind, Severity, Option<String>) {
    let location = raw.stack.as_deref().and_then(extract_location);

    if let Some(kind) = ErrorKind::from_tag(raw.name.trim()) {
        return (kind, kind.severity(), location);
    }

    let haystack = format!("{} {}", raw.name, raw.message).to_lowercase();
    for rule in CLASSIFY_RULES.iter() {
        if rule.needles.iter().any(|n| haystack.contains(n)) {
            return (rule.kind, rule.kind.severity(), location);
        }
    }

    (ErrorKind::Unknown, ErrorKind::Unknown.severity(), location)
}

// ---------------------------------------------------------------------------
// Stack location extraction
// ---------------------------------------------------------------------------

/// Best-effort `file:line` from the first application frame of a stack trace.
///
/// Understands the common `at func (path:line:col)` / `at path:line:col`
/// frame shapes. Frames from dependency trees (`node_modules`) and anonymous
/// frames are skipped. Returns the file's final path segment plus the line.
pub fn extract_location(stack: &str) -> Option<String> {
    for line in stack.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix("at ") else { continue };
        if rest.contains("node_modules") || rest.contains("<anonymous>") {
            continue;
        }

        // Prefer the parenthesised source ref when present.
        let source = match (rest.rfind('('), rest.rfind(')')) {
            (Some(open), Some(close)) if open < close => &rest[open + 1..close],
            _ => rest,
        };

        if let Some(loc) = parse_source_ref(source) {
            return Some(loc);
        }
    }
    None
}

/// Parse `path:line:col` or `path:line` into `basename:line`.
fn parse_source_ref(source: &str) -> Option<String> {
    let mut parts: Vec<&str> = source.rsplitn(3, ':').collect();
    parts.reverse(); // now [path, line, col] or [path, line] or [path]
    let (path, line) = match parts.as_slice() {
        [path, line, col] if col.chars().all(|c| c.is_ascii_digit()) => (*path, *line),
        [path, line] => (*path, *line),
        _ => return None,
    };
    if line.is_empty() || !line.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let file = path.rsplit('/').next().unwrap_or(path);
    if file.is_empty() {
        return None;
    }
    Some(format!("{file}:{line}"))
}

// ---------------------------------------------------------------------------
// Device / environment probe
// ---------------------------------------------------------------------------

/// Device and environment snapshot attached to every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser_family: String,
    pub browser_version: String,
    pub os_family: String,
    pub device_class: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        DeviceInfo {
            browser_family: "unknown".to_string(),
            browser_version: "unknown".to_string(),
            os_family: "unknown".to_string(),
            device_class: "unknown".to_string(),
        }
    }
}

/// Injected environment probe: supplies the device snapshot and the current
/// page/viewport context. The engine never probes the environment itself.
pub trait DeviceProbe: Send + Sync {
    fn device_info(&self) -> DeviceInfo;
    fn page_context(&self) -> HashMap<String, String>;
}

/// Fixed-answer probe for servers, tests, and headless hosts.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    pub info: DeviceInfo,
    pub context: HashMap<String, String>,
}

impl DeviceProbe for StaticProbe {
    fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn page_context(&self) -> HashMap<String, String> {
        self.context.clone()
    }
}

// ---------------------------------------------------------------------------
// ErrorRecord
// ---------------------------------------------------------------------------

/// One observed error with its device/context snapshot. Immutable once
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub kind: ErrorKind,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub timestamp_ms: u64,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub device: DeviceInfo,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl ErrorRecord {
    /// Classify and stamp a raw error. The id is freshly generated; the
    /// caller supplies the clock reading and environment snapshot.
    pub fn ingest(
        raw: RawError,
        now_ms: u64,
        device: DeviceInfo,
        context: HashMap<String, String>,
    ) -> Self {
        let (kind, severity, location) = classify(&raw);
        ErrorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            name: raw.name,
            message: raw.message,
            stack_trace: raw.stack,
            timestamp_ms: now_ms,
            severity,
            location,
            device,
            context,
        }
    }
}
