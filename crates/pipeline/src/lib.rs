//! The log processing pipeline: normalize → extract → fingerprint →
//! cluster → gate notifications and RCA.
//!
//! Stages are tolerant by design: a record that fails to parse is counted
//! and skipped, never fatal to its batch.

pub mod clusterer;
pub mod extractor;
pub mod fingerprint;
pub mod normalizer;
pub mod processor;

pub use clusterer::Clusterer;
pub use extractor::{ExceptionDescriptor, ExceptionExtractor};
pub use fingerprint::{EntityFlags, Fingerprinter, MatchReason, MultiFingerprints};
pub use normalizer::Normalizer;
pub use processor::{ClusterNotifier, ProcessStats, Processor, RcaEngine};

use sha2::{Digest, Sha256};

/// 16-hex-char truncated SHA-256, the fingerprint encoding used
/// throughout the platform.
pub(crate) fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_is_16_hex_chars() {
        let hash = short_hash("NullPointerException|Bar.java:baz");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_hash_deterministic() {
        assert_eq!(short_hash("x"), short_hash("x"));
        assert_ne!(short_hash("x"), short_hash("y"));
    }
}
