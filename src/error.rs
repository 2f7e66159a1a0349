use thiserror::Error;

/// Crate-level error enum.
///
/// Deliberately small: per the propagation policy, the engine only surfaces
/// failures to commit state locally. Corrupt persisted payloads, notification
/// failures, and report failures are recovered in place (logged and
/// swallowed), never raised to callers.
#[derive(Debug, Error)]
pub enum FaultlineError {
    /// The storage backend could not read or write a slot.
    #[error("storage backend failure: {0}")]
    Storage(#[from] std::io::Error),

    /// A record or alert set could not be serialized for persistence.
    #[error("serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Backend-specific failure that is not an I/O error.
    #[error("backend failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = FaultlineError::from(io);
        assert!(err.to_string().contains("storage backend failure"));
    }

    #[test]
    fn test_serialize_error_from_serde() {
        let bad = serde_json::from_str::<Vec<u32>>("{not json");
        let err = FaultlineError::from(bad.unwrap_err());
        assert!(err.to_string().contains("serialization failure"));
    }

    #[test]
    fn test_backend_error_carries_message() {
        let err = FaultlineError::Backend("slot unavailable".to_string());
        assert_eq!(err.to_string(), "backend failure: slot unavailable");
    }
}
