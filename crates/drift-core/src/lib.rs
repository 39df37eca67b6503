//! Drift Core - Shared types and primitives for the Drift content
//! distribution network.
//!
//! This crate provides:
//! - Identifier types (`PeerId`, `FileHash`)
//! - SHA-256 hashing helpers for files and buffers
//! - Wall-clock timestamps in milliseconds
//! - Protocol-wide constants

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod hash;
pub mod identity;
pub mod time;

pub use hash::{sha256_file, sha256_hex};
pub use identity::{FileHash, PeerId};
pub use time::now_millis;

/// Size of a file chunk in bytes (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Number of actions that seals a ledger block.
pub const MAX_ACTIONS_PER_BLOCK: usize = 100;

/// A peer not heard from for this long is evicted (5 minutes).
pub const PEER_TIMEOUT_MS: u64 = 300_000;

/// Interval between peer eviction sweeps (60 seconds).
pub const PEER_EVICTION_INTERVAL_MS: u64 = 60_000;

/// TCP connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Socket read timeout in seconds.
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Socket write timeout in seconds.
pub const WRITE_TIMEOUT_SECS: u64 = 30;

/// Default number of workers for the parallel chunk fetch stage.
pub const FETCH_PARALLELISM: usize = 10;
