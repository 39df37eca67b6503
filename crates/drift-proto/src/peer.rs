//! Peer addressing.

use std::fmt;

use drift_core::PeerId;
use serde::{Deserialize, Serialize};

/// The wire form of a peer entry, as carried in PEER_LIST payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddr {
    /// Peer identity.
    pub id: PeerId,
    /// Reachable host name or address.
    pub host: String,
    /// Listen port.
    pub port: u16,
}

impl PeerAddr {
    /// Creates a new peer address.
    pub fn new(id: PeerId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = PeerAddr::new(PeerId::from("ab12cd34"), "127.0.0.1", 4800);
        assert_eq!(addr.to_string(), "ab12cd34@127.0.0.1:4800");
    }
}
