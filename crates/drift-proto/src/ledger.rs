//! Ledger data types.
//!
//! A `Block` is an immutable batch of cache `Action`s linked to its
//! predecessor by SHA-256 hash. The hash input is the UTF-8 concatenation of
//! the header fields followed by every action's fields, with no separators;
//! the exact byte layout is load-bearing for cross-node validation and must
//! not change.

use std::fmt;

use drift_core::{now_millis, sha256_hex, FileHash, PeerId};
use serde::{Deserialize, Serialize};

/// Distinguished id of the genesis block. Its `previous_hash` is the same
/// value.
pub const GENESIS_ID: &str = "0";

/// The kind of cache event an action records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// A chunk was written into the cache.
    #[serde(rename = "CACHE_PUT")]
    CachePut,
    /// A chunk was read out of the cache during assembly.
    #[serde(rename = "CACHE_GET")]
    CacheGet,
    /// A lookup found a chunk already cached.
    #[serde(rename = "CACHE_HIT")]
    CacheHit,
}

impl ActionType {
    /// The canonical string form, used in hashes and serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CachePut => "CACHE_PUT",
            ActionType::CacheGet => "CACHE_GET",
            ActionType::CacheHit => "CACHE_HIT",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record of one cache-affecting event. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Event kind.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Fingerprint of the file the chunk belongs to.
    pub file_hash: FileHash,
    /// Peer that performed the operation.
    pub peer_id: PeerId,
    /// Wall-clock time of the event in milliseconds.
    pub timestamp: u64,
    /// 0-based chunk index.
    pub chunk_id: u32,
}

impl Action {
    /// Creates an action stamped with the current time.
    pub fn new(action_type: ActionType, file_hash: FileHash, peer_id: PeerId, chunk_id: u32) -> Self {
        Self {
            action_type,
            file_hash,
            peer_id,
            timestamp: now_millis(),
            chunk_id,
        }
    }
}

/// A batch of actions with a hash linking it to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Opaque unique identifier. `"0"` for the genesis block; otherwise a
    /// timestamp-prefixed value so block filenames sort in insertion order.
    pub block_id: String,
    /// `block_hash` of the predecessor, `"0"` for genesis.
    pub previous_hash: String,
    /// Creation time in milliseconds.
    pub timestamp: u64,
    /// The batched cache actions.
    pub actions: Vec<Action>,
    /// SHA-256 over the canonical serialization, set when the block is sealed.
    pub block_hash: String,
    /// Peer that sealed the block.
    pub creator_peer_id: PeerId,
    /// Optional detached signature. Carried through serialization but never
    /// produced or verified by the core. Must stay positionally encoded so
    /// binary payloads round-trip.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Block {
    /// Creates an open (unsealed) block stamped with the current time.
    pub fn new(block_id: impl Into<String>, previous_hash: impl Into<String>, creator: PeerId) -> Self {
        Self {
            block_id: block_id.into(),
            previous_hash: previous_hash.into(),
            timestamp: now_millis(),
            actions: Vec::new(),
            block_hash: String::new(),
            creator_peer_id: creator,
            signature: None,
        }
    }

    /// Creates the genesis block for `creator`. Its timestamp is pinned to
    /// zero so every node derives the same genesis hash and ledger sync
    /// converges between nodes that have never met. The hash is already
    /// computed.
    pub fn genesis(creator: PeerId) -> Self {
        let mut block = Self::new(GENESIS_ID, GENESIS_ID, creator);
        block.timestamp = 0;
        block.block_hash = block.compute_hash();
        block
    }

    /// Generates an id for a non-genesis block: a zero-padded millisecond
    /// timestamp, a process-local sequence number (blocks sealed within the
    /// same millisecond must still sort in seal order), and a random suffix.
    /// Lexicographic filename order therefore matches insertion order.
    pub fn next_id() -> String {
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let uuid = uuid::Uuid::new_v4().to_string();
        format!("{:020}-{:08}-{}", now_millis(), seq, &uuid[..8])
    }

    /// Returns true for the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.block_id == GENESIS_ID
    }

    /// The canonical hash input: header fields then every action's fields,
    /// concatenated as UTF-8 text with no separators.
    fn hash_input(&self) -> String {
        let mut input = String::new();
        input.push_str(&self.block_id);
        input.push_str(&self.previous_hash);
        input.push_str(&self.timestamp.to_string());
        for action in &self.actions {
            input.push_str(action.action_type.as_str());
            input.push_str(action.file_hash.as_str());
            input.push_str(action.peer_id.as_str());
            input.push_str(&action.timestamp.to_string());
            input.push_str(&action.chunk_id.to_string());
        }
        input
    }

    /// Recomputes the block hash from the current contents.
    pub fn compute_hash(&self) -> String {
        sha256_hex(self.hash_input().as_bytes())
    }
}
