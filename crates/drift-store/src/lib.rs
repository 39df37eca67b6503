//! Drift Store - Content-addressed cache of file chunks.
//!
//! Files are split into fixed-size chunks addressed by
//! `(file fingerprint, chunk index)`. Every chunk lives both in an in-memory
//! index and as one compressed file on disk, so a restarted node serves its
//! cache again after a warm start. Cache-affecting operations are recorded in
//! the action ledger.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod archive;
pub mod chunk;
pub mod config;

pub use chunk::{CacheChunk, ChunkStore};
pub use config::StoreConfig;

use std::io;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Source file missing or not a regular file.
    #[error("not a readable file: {0}")]
    NotAFile(String),
}
