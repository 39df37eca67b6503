//! Peer-to-peer message set.
//!
//! Every exchange on the overlay is a single `Message`: the sender's peer id
//! plus one typed payload. Four request types expect a one-frame response on
//! the same connection; everything else is fire-and-forget.

use std::fmt;

use drift_core::{FileHash, PeerId};
use serde::{Deserialize, Serialize};

use crate::ledger::Block;
use crate::peer::PeerAddr;

/// Discriminant of a message, used for handler dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Node announces itself to a peer.
    Join,
    /// Response to a JOIN.
    JoinResponse,
    /// Share the list of known active peers.
    PeerList,
    /// Ask a peer for one file chunk.
    FileRequest,
    /// Serve (or decline) a requested chunk.
    FileResponse,
    /// Ask a peer for ledger blocks after a known hash.
    LedgerSync,
    /// Blocks answering a LEDGER_SYNC.
    LedgerSyncResponse,
    /// Gossip a freshly sealed ledger block.
    LedgerEntry,
    /// Liveness probe.
    Ping,
    /// Response to a PING.
    Pong,
}

impl MessageType {
    /// The canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Join => "JOIN",
            MessageType::JoinResponse => "JOIN_RESPONSE",
            MessageType::PeerList => "PEER_LIST",
            MessageType::FileRequest => "FILE_REQUEST",
            MessageType::FileResponse => "FILE_RESPONSE",
            MessageType::LedgerSync => "LEDGER_SYNC",
            MessageType::LedgerSyncResponse => "LEDGER_SYNC_RESPONSE",
            MessageType::LedgerEntry => "LEDGER_ENTRY",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
        }
    }

    /// Whether a sender of this type reads one response frame before
    /// closing the connection.
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            MessageType::Join
                | MessageType::FileRequest
                | MessageType::LedgerSync
                | MessageType::Ping
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Announce this node; carries its advertised listen endpoint.
    Join {
        /// Advertised host.
        host: String,
        /// Advertised port.
        port: u16,
    },
    /// JOIN acknowledgement.
    JoinResponse {
        /// Whether the peer accepted the join.
        success: bool,
    },
    /// Known active peers.
    PeerList {
        /// Peer entries.
        peers: Vec<PeerAddr>,
    },
    /// Request one chunk of a file.
    FileRequest {
        /// File fingerprint.
        file_hash: FileHash,
        /// 0-based chunk index.
        chunk_id: u32,
    },
    /// Answer to a FILE_REQUEST.
    FileResponse {
        /// File fingerprint, echoed.
        file_hash: FileHash,
        /// Chunk index, echoed.
        chunk_id: u32,
        /// Whether the chunk was found.
        success: bool,
        /// Chunk bytes when found.
        data: Option<Vec<u8>>,
        /// Total chunk count of the file when found.
        total_chunks: Option<u32>,
        /// Failure description when not found.
        error: Option<String>,
    },
    /// Request blocks sealed after a known hash.
    LedgerSync {
        /// The requester's last known block hash; empty when the requester
        /// only holds its own genesis.
        last_block_hash: String,
    },
    /// Answer to a LEDGER_SYNC.
    LedgerSyncResponse {
        /// Blocks the requester is missing, in chain order.
        blocks: Vec<Block>,
        /// Convenience count of `blocks`.
        blocks_count: u32,
    },
    /// Gossip one sealed block.
    LedgerEntry {
        /// The sealed block.
        block: Block,
    },
    /// Liveness probe.
    Ping,
    /// Liveness answer.
    Pong,
}

impl MessagePayload {
    /// The discriminant of this payload.
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Join { .. } => MessageType::Join,
            MessagePayload::JoinResponse { .. } => MessageType::JoinResponse,
            MessagePayload::PeerList { .. } => MessageType::PeerList,
            MessagePayload::FileRequest { .. } => MessageType::FileRequest,
            MessagePayload::FileResponse { .. } => MessageType::FileResponse,
            MessagePayload::LedgerSync { .. } => MessageType::LedgerSync,
            MessagePayload::LedgerSyncResponse { .. } => MessageType::LedgerSyncResponse,
            MessagePayload::LedgerEntry { .. } => MessageType::LedgerEntry,
            MessagePayload::Ping => MessageType::Ping,
            MessagePayload::Pong => MessageType::Pong,
        }
    }
}

/// One framed exchange unit: sender identity plus a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identity of the sending node.
    pub from: PeerId,
    /// The typed payload.
    pub payload: MessagePayload,
}

impl Message {
    /// Creates a message from `from` carrying `payload`.
    pub fn new(from: PeerId, payload: MessagePayload) -> Self {
        Self { from, payload }
    }

    /// The discriminant of the carried payload.
    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(MessageType::Join.as_str(), "JOIN");
        assert_eq!(MessageType::LedgerSyncResponse.as_str(), "LEDGER_SYNC_RESPONSE");
        assert_eq!(MessageType::Pong.as_str(), "PONG");
    }

    #[test]
    fn test_response_expecting_set() {
        let expecting = [
            MessageType::Join,
            MessageType::FileRequest,
            MessageType::LedgerSync,
            MessageType::Ping,
        ];
        for t in expecting {
            assert!(t.expects_response(), "{t} should expect a response");
        }
        for t in [
            MessageType::JoinResponse,
            MessageType::PeerList,
            MessageType::FileResponse,
            MessageType::LedgerSyncResponse,
            MessageType::LedgerEntry,
            MessageType::Pong,
        ] {
            assert!(!t.expects_response(), "{t} should not expect a response");
        }
    }

    #[test]
    fn test_payload_type_mapping() {
        let msg = Message::new(
            PeerId::from("ab12cd34"),
            MessagePayload::FileRequest {
                file_hash: FileHash::from_hex("deadbeef"),
                chunk_id: 3,
            },
        );
        assert_eq!(msg.message_type(), MessageType::FileRequest);
    }
}
