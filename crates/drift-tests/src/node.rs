//! Test node: one Drift peer on loopback over a temporary data directory.

use std::net::SocketAddr;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use drift_node::{Node, NodeConfig};
use tempfile::TempDir;

/// A node under test. Dropping it leaks nothing: the data directory is
/// temporary and the node's tasks die with the runtime.
pub struct TestNode {
    config: NodeConfig,
    node: Arc<Node>,
    temp: TempDir,
}

impl TestNode {
    /// Starts a node on an ephemeral loopback port with default settings.
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// Starts a node with config tweaks applied (seal threshold, chunk
    /// size, peer timeout, bootstrap, ...).
    pub async fn start_with(tweak: impl FnOnce(&mut NodeConfig)) -> Result<Self> {
        let temp = TempDir::new().context("Failed to create temp dir")?;
        let mut config = NodeConfig {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 0,
            advertise_host: "127.0.0.1".to_string(),
            data_dir: temp.path().join("data"),
            ..Default::default()
        };
        tweak(&mut config);

        let node = Node::start(config.clone()).await.context("Failed to start node")?;
        Ok(Self { config, node, temp })
    }

    /// Starts a node that joins the overlay through `bootstrap`.
    pub async fn start_bootstrapped(bootstrap: SocketAddr) -> Result<Self> {
        Self::start_with(|c| c.bootstrap = Some(bootstrap.to_string())).await
    }

    /// The node's bound listen address.
    pub fn addr(&self) -> SocketAddr {
        self.node.local_addr().expect("node is started")
    }

    /// Stops the node and boots a fresh one over the same data directory,
    /// exercising the warm-start paths.
    pub async fn restart(&mut self) -> Result<()> {
        self.node.stop().await;
        self.node = Node::start(self.config.clone())
            .await
            .context("Failed to restart node")?;
        Ok(())
    }

    /// Writes a scratch file next to (not inside) the node's data directory
    /// and returns its path.
    pub fn write_file(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.temp.path().join(name);
        std::fs::write(&path, data).context("Failed to write test file")?;
        Ok(path)
    }

    /// A scratch path for fetch outputs.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    /// The node's data directory (cache and ledger live under it).
    pub fn data_dir(&self) -> PathBuf {
        self.config.data_dir.clone()
    }
}

impl Deref for TestNode {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}
