//! Integrity: SHA-256 checksum over persisted records, verify on load.

use sha2::{Digest, Sha256};

/// Checksum length in bytes.
pub const CHECKSUM_LEN: usize = 32;

/// Hash a record body. Returns 32-byte digest.
pub fn checksum(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"loranode-record-v1");
    hasher.update(body);
    hasher.finalize().into()
}

/// Verify a record body against its stored checksum.
pub fn verify(body: &[u8], expected: &[u8; CHECKSUM_LEN]) -> bool {
    checksum(body) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_verifies_same_body() {
        let body = b"session keys";
        let sum = checksum(body);
        assert!(verify(body, &sum));
    }

    #[test]
    fn verify_rejects_tampered() {
        let sum = checksum(b"session keys");
        assert!(!verify(b"session keyz", &sum));
    }

    #[test]
    fn checksum_is_domain_separated() {
        let mut plain = Sha256::new();
        plain.update(b"x");
        let plain: [u8; 32] = plain.finalize().into();
        assert_ne!(checksum(b"x"), plain);
    }
}
