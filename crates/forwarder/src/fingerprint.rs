//! Content fingerprints of rendered configuration

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of digest bytes kept in a fingerprint (128 bits)
const FINGERPRINT_BYTES: usize = 16;

/// Opaque digest of rendered configuration text.
///
/// Equal fingerprints mean equal text for change detection. Not suitable for
/// anything security related.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `previous` (e.g. read back from an annotation) differs
    pub fn differs_from(&self, previous: Option<&str>) -> bool {
        previous != Some(self.0.as_str())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full SHA-256 of `input` as 64 lower-case hex characters
pub(crate) fn digest_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Rendered collector configuration and its fingerprint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedConfig {
    pub text: String,
    pub fingerprint: Fingerprint,
}

impl RenderedConfig {
    pub fn new(text: String) -> Self {
        let fingerprint = Fingerprint::of(&text);
        Self { text, fingerprint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_128_bit_hex() {
        let a = Fingerprint::of("<label @X>\n</label>\n");
        let b = Fingerprint::of("<label @X>\n</label>\n");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_changes_with_text() {
        assert_ne!(Fingerprint::of("a"), Fingerprint::of("b"));
        // sha256("") prefix
        assert_eq!(Fingerprint::of("").as_str(), "e3b0c44298fc1c149afbf4c8996fb924");
    }

    #[test]
    fn test_differs_from() {
        let rendered = RenderedConfig::new("text".to_string());
        let current = rendered.fingerprint.to_string();
        assert!(!rendered.fingerprint.differs_from(Some(&current)));
        assert!(rendered.fingerprint.differs_from(Some("stale")));
        assert!(rendered.fingerprint.differs_from(None));
    }

    #[test]
    fn test_digest_hex() {
        assert_eq!(digest_hex("x").len(), 64);
        assert_ne!(digest_hex("a-b"), digest_hex("a_b"));
        assert!(digest_hex("").starts_with(Fingerprint::of("").as_str()));
    }
}
