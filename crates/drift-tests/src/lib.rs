//! Integration and end-to-end tests for Drift.
//!
//! This crate provides:
//! - A multi-node test harness for spinning up overlays on loopback
//! - Integration tests for the ledger, chunk store, and peer protocol
//! - End-to-end tests for upload/fetch workflows

pub mod harness;
pub mod node;

pub use harness::TestNetwork;
pub use node::TestNode;

/// Initialize tracing for tests. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("drift_node=debug,drift_net=debug,drift_ledger=debug,drift_store=debug")
        .with_test_writer()
        .try_init();
}
