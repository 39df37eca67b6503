//! Drift Net - Peer overlay plumbing.
//!
//! This crate provides:
//! - The peer registry: known peers with liveness state and periodic
//!   eviction of stale records
//! - The framed transport: one length-prefixed message per TCP connection,
//!   with an accept loop, handler dispatch, and dial-side timeouts

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod registry;
pub mod transport;

pub use registry::{PeerRecord, PeerRegistry};
pub use transport::{FramedTransport, MessageHandler};

use std::io;

use drift_proto::FrameError;

/// Transport failures. These never propagate past the transport boundary:
/// dial-side callers observe them as a `None` response plus an inactive mark
/// on the destination peer.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Socket failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Frame codec failure.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Connect attempt exceeded the 5 s budget.
    #[error("connect timed out")]
    ConnectTimeout,

    /// Read exceeded the 30 s budget.
    #[error("read timed out")]
    ReadTimeout,

    /// Write exceeded the 30 s budget.
    #[error("write timed out")]
    WriteTimeout,

    /// Peer announced a frame larger than the protocol limit.
    #[error("oversized frame of {0} bytes")]
    OversizedFrame(u32),
}
