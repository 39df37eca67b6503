//! One running Drift peer.
//!
//! Boot order: ledger (reload or genesis) → chunk store (warm load) →
//! transport (bind + accept loop) → peer eviction timer → optional
//! bootstrap join. Shutdown seals any pending actions so nothing in the
//! open block is lost.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use drift_core::{FileHash, PeerId};
use drift_ledger::{Ledger, LedgerConfig};
use drift_net::{FramedTransport, PeerRegistry};
use drift_store::{ChunkStore, StoreConfig};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{parse_endpoint, NodeConfig};
use crate::fetch::{FetchService, FileInfo};
use crate::handlers;
use crate::peers::PeerClient;
use crate::NodeError;

/// A symmetric Drift peer: uploads, serves, fetches, and replicates the
/// action ledger.
pub struct Node {
    config: NodeConfig,
    peer_id: PeerId,
    registry: Arc<PeerRegistry>,
    transport: Arc<FramedTransport>,
    ledger: Arc<Ledger>,
    store: Arc<ChunkStore>,
    client: Arc<PeerClient>,
    fetch: FetchService,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Boots a node from `config` and returns it running. The listen socket
    /// is bound, background tasks are live, and the bootstrap peer (when
    /// configured) has been dialed.
    pub async fn start(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        let peer_id = PeerId::generate();
        info!(peer_id = %peer_id, "Starting node");

        let ledger = Arc::new(Ledger::open(
            peer_id.clone(),
            LedgerConfig {
                dir: config.ledger_dir(),
                max_actions_per_block: config.max_actions_per_block,
                keep_orphan_blocks: config.keep_orphan_blocks,
            },
        )?);
        let mut seal_rx = ledger.seal_events();

        let store = Arc::new(ChunkStore::open(
            peer_id.clone(),
            Arc::clone(&ledger),
            StoreConfig {
                cache_dir: config.cache_dir(),
                chunk_size: config.chunk_size,
                manifest_in_header: config.manifest_in_header,
            },
        )?);

        let registry = Arc::new(PeerRegistry::with_timeout(
            peer_id.clone(),
            config.peer_timeout_ms,
        ));
        let transport = Arc::new(FramedTransport::new(peer_id.clone(), Arc::clone(&registry)));
        let client = Arc::new(PeerClient::new(
            Arc::clone(&transport),
            Arc::clone(&registry),
            Arc::clone(&ledger),
        ));

        handlers::register_all(
            &transport,
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Arc::clone(&store),
            Arc::clone(&client),
        );

        let bound = transport.start(config.listen_addr()?).await?;
        info!(peer_id = %peer_id, addr = %bound, "Node listening");

        let fetch = FetchService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&client),
            config.fetch_parallelism,
        );

        let eviction = Arc::clone(&registry)
            .spawn_eviction(Duration::from_secs(config.eviction_interval_secs));

        // Gossip locally sealed blocks to the swarm.
        let gossip_client = Arc::clone(&client);
        let gossip = tokio::spawn(async move {
            while let Some(block) = seal_rx.recv().await {
                gossip_client.propagate_block(block);
            }
        });

        let node = Arc::new(Self {
            config,
            peer_id,
            registry,
            transport,
            ledger,
            store,
            client,
            fetch,
            tasks: Mutex::new(vec![eviction, gossip]),
        });

        if let Some(endpoint) = node.config.bootstrap.clone() {
            let (host, port) = parse_endpoint(&endpoint)?;
            if !node.join(&host, port).await {
                warn!(endpoint = %endpoint, "Bootstrap join failed, continuing standalone");
            }
        }

        Ok(node)
    }

    /// Dials a peer and joins the overlay through it.
    pub async fn join(&self, host: &str, port: u16) -> bool {
        let advertise_port = self
            .transport
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(self.config.listen_port);
        self.client
            .join_network(host, port, &self.config.advertise_host, advertise_port)
            .await
    }

    /// Splits a local file into chunks and caches them. Returns the
    /// fingerprint peers fetch it by.
    pub fn upload(&self, path: &Path) -> Result<FileHash, NodeError> {
        self.fetch.upload_file(path)
    }

    /// Materializes a file at `output`, pulling missing chunks from the
    /// swarm.
    pub async fn fetch(&self, file_hash: &FileHash, output: &Path) -> Result<bool, NodeError> {
        self.fetch.fetch(file_hash, output).await
    }

    /// What this node knows about a file, probing peers when the cache has
    /// nothing.
    pub async fn file_info(&self, file_hash: &FileHash) -> Option<FileInfo> {
        self.fetch.file_info(file_hash).await
    }

    /// Stops the node: seals pending actions, closes the listen socket, and
    /// aborts the maintenance tasks. In-flight handlers may observe closed
    /// sockets.
    pub async fn stop(&self) {
        if self.ledger.seal_current_block().is_some() {
            info!("Sealed pending actions at shutdown");
        }
        self.transport.stop();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(peer_id = %self.peer_id, "Node stopped");
    }

    /// The node's identity.
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// The bound listen address.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The peer registry.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// The action ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The chunk store.
    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    /// The outbound peer protocol.
    pub fn client(&self) -> &Arc<PeerClient> {
        &self.client
    }
}
