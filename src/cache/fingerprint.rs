//! Fingerprint Generator
//!
//! Deterministic content hashes used by the boundary layer to answer
//! conditional reads without re-sending the payload. A value is
//! canonicalized to its JSON byte representation, hashed with SHA-256,
//! and rendered as uppercase hex.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Fingerprint a raw byte payload
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode_upper(hasher.finalize())
}

/// Fingerprint any serializable value via its canonical JSON bytes.
///
/// Struct fields serialize in declaration order, so equal values always
/// canonicalize to equal bytes.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String> {
    let canonical = serde_json::to_vec(value)?;
    Ok(fingerprint_bytes(&canonical))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Fixture {
        id: String,
        name: String,
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint_bytes(b"payload");
        // SHA-256 as hex: 64 chars, uppercase only.
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_known_vector() {
        // SHA-256 of the empty input.
        assert_eq!(
            fingerprint_bytes(b""),
            "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855"
        );
    }

    #[test]
    fn test_equal_values_equal_fingerprints() {
        let a = Fixture { id: "1".into(), name: "Widget".into() };
        let b = Fixture { id: "1".into(), name: "Widget".into() };
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_different_values_differ() {
        let a = Fixture { id: "1".into(), name: "Widget".into() };
        let b = Fixture { id: "1".into(), name: "Gadget".into() };
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    proptest! {
        #[test]
        fn prop_fingerprint_deterministic(data: Vec<u8>) {
            prop_assert_eq!(fingerprint_bytes(&data), fingerprint_bytes(&data));
        }

        #[test]
        fn prop_fingerprint_fixed_width(data: Vec<u8>) {
            prop_assert_eq!(fingerprint_bytes(&data).len(), 64);
        }
    }
}
