//! Content digests for no-op detection.

use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StateError;

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StateError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StateError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> String {
        d.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_bytes_same_digest() {
        let d1 = ContentDigest::from_bytes(b"alpha");
        let d2 = ContentDigest::from_bytes(b"alpha");
        assert_eq!(d1, d2);
    }

    #[test]
    fn test_different_bytes_different_digest() {
        let d1 = ContentDigest::from_bytes(b"alpha");
        let d2 = ContentDigest::from_bytes(b"beta");
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_try_from_rejects_non_hex() {
        let r = ContentDigest::try_from("zz".repeat(32));
        assert!(matches!(r, Err(StateError::InvalidDigest { .. })));
    }

    #[test]
    fn test_try_from_rejects_wrong_length() {
        let r = ContentDigest::try_from("abcd".to_string());
        assert!(matches!(r, Err(StateError::InvalidDigest { .. })));
    }

    #[test]
    fn test_short_is_twelve_chars() {
        let d = ContentDigest::from_bytes(b"whatever");
        assert_eq!(d.short().len(), 12);
        assert!(d.as_str().starts_with(d.short()));
    }
}
