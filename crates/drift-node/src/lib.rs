//! Drift Node - Assembles the subsystems into a running peer.
//!
//! A node wires together the peer registry, framed transport, ledger, and
//! chunk store; registers the protocol handlers; runs the background
//! maintenance tasks (peer eviction, seal gossip); and exposes the
//! user-facing operations: upload, fetch, file info, join.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod fetch;
pub mod handlers;
pub mod node;
pub mod peers;

pub use config::NodeConfig;
pub use fetch::{FetchService, FileInfo};
pub use node::Node;
pub use peers::PeerClient;

use drift_ledger::LedgerError;
use drift_net::NetError;
use drift_store::StoreError;

/// Node-level failures.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Chunk store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Ledger failure.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Transport failure.
    #[error("network error: {0}")]
    Net(#[from] NetError),

    /// Bad configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}
