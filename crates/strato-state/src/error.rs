//! Error types for strato-state

use thiserror::Error;

/// Errors that can occur in the state persistence layer.
///
/// Any of these is fatal to a reconciliation run: without durable state,
/// idempotent retry safety cannot be guaranteed, so callers must abort
/// rather than proceed with applies they cannot record.
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem read/write failure
    #[error("state I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("state serialization failed: {0}")]
    Serialization(String),

    /// Deserialization failure (corrupt or hand-edited state file)
    #[error("state deserialization failed: {0}")]
    Deserialization(String),

    /// A digest string was not valid SHA-256 hex
    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            StateError::Deserialization(err.to_string())
        } else {
            StateError::Serialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_digest_error_displays_digest() {
        let err = StateError::InvalidDigest {
            digest: "zz-not-hex".to_string(),
        };
        assert!(err.to_string().contains("zz-not-hex"));
    }

    #[test]
    fn test_serde_error_maps_to_deserialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err();
        let state_err = StateError::from(err);
        assert!(matches!(state_err, StateError::Deserialization(_)));
    }
}
