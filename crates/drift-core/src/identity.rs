//! Identifier types.
//!
//! Both identifiers are opaque strings on the wire and on disk:
//! - `PeerId` - short random node identity, stable for the process lifetime
//! - `FileHash` - SHA-256 fingerprint of a whole file, lowercase hex

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;

/// Node identity: the first 8 characters of a random UUID, generated at
/// first boot and stable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generates a fresh peer identity.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().to_string();
        Self(uuid[..8].to_string())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File fingerprint: SHA-256 of the full file contents, hex-encoded.
///
/// Content-addresses every chunk of the file together with the chunk index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHash(String);

impl FileHash {
    /// Computes the fingerprint of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Self(sha256_hex(data))
    }

    /// Wraps an already hex-encoded digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened prefix for display contexts.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
