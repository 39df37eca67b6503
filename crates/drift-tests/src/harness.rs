//! Multi-node overlay harness.

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::info;

use crate::node::TestNode;

/// A small overlay of nodes on loopback. The first node is the bootstrap
/// hub; every later node joins through it.
pub struct TestNetwork {
    nodes: Vec<TestNode>,
}

impl TestNetwork {
    /// Spins up `count` nodes, the first standalone, the rest joined
    /// through it.
    pub async fn with_nodes(count: usize) -> Result<Self> {
        let mut network = Self { nodes: Vec::new() };
        for _ in 0..count {
            network.add_node().await?;
        }
        Ok(network)
    }

    /// Adds one node, joining through the first node when one exists.
    pub async fn add_node(&mut self) -> Result<&TestNode> {
        let node = match self.nodes.first() {
            Some(hub) => TestNode::start_bootstrapped(hub.addr()).await?,
            None => TestNode::start().await?,
        };
        info!(peer_id = %node.peer_id(), total = self.nodes.len() + 1, "Added node to test network");
        self.nodes.push(node);
        Ok(self.nodes.last().expect("just pushed"))
    }

    /// Number of nodes in the network.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a node by index.
    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    /// Lets asynchronous pushes (peer lists, ledger syncs, gossip) land.
    pub async fn settle(&self) {
        sleep(Duration::from_millis(250)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_network_creation() {
        let network = TestNetwork::with_nodes(1).await.unwrap();
        assert_eq!(network.node_count(), 1);
    }

    #[tokio::test]
    async fn test_joined_nodes_know_each_other() {
        let network = TestNetwork::with_nodes(2).await.unwrap();
        network.settle().await;

        // The joiner knows the hub, and the hub registered the joiner.
        assert_eq!(network.node(1).registry().active_count(), 1);
        assert_eq!(network.node(0).registry().active_count(), 1);
    }
}
