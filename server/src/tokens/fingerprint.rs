//! Content fingerprints for change detection.
//!
//! The watcher fingerprints every fetched payload and only parses it when the
//! fingerprint differs from the last successfully published one. This is a
//! change signal, not an integrity check.

use sha2::{Digest, Sha256};

/// SHA-256 of a raw payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a payload.
    #[must_use]
    pub fn of(payload: &[u8]) -> Self {
        Self(Sha256::digest(payload).into())
    }

    /// Whether `new` differs from `old`.
    #[must_use]
    pub fn changed(old: &Self, new: &Self) -> bool {
        old != new
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}
