//! Drift Protocol - Wire protocol and shared data structures.
//!
//! This crate defines:
//! - Ledger types (`Action`, `ActionType`, `Block`) and the canonical
//!   block-hash computation
//! - Peer addressing (`PeerAddr`)
//! - The peer-to-peer message set (`Message`, `MessagePayload`)
//! - Length-prefixed frame encoding for stream transports

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod frame;
pub mod ledger;
pub mod messages;
pub mod peer;

pub use frame::{decode_payload, encode_frame, FrameError, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use ledger::{Action, ActionType, Block, GENESIS_ID};
pub use messages::{Message, MessagePayload, MessageType};
pub use peer::PeerAddr;
