//! Node configuration.
//!
//! Values come from a TOML file with `[node]`, `[network]`, `[storage]`, and
//! `[ledger]` sections; every field has a default so a node runs with no
//! config file at all. CLI flags override file values in the daemon.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use drift_core::{CHUNK_SIZE, FETCH_PARALLELISM, MAX_ACTIONS_PER_BLOCK, PEER_TIMEOUT_MS};
use tracing::info;

use crate::NodeError;

/// Complete configuration of one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Host to bind the listen socket on.
    pub listen_host: String,
    /// Port to bind; 0 picks an ephemeral port.
    pub listen_port: u16,
    /// Host advertised to peers in JOIN messages.
    pub advertise_host: String,
    /// Root directory for the cache and ledger.
    pub data_dir: PathBuf,
    /// Optional `host:port` of the bootstrap peer dialed at startup.
    pub bootstrap: Option<String>,
    /// Chunk size in bytes.
    pub chunk_size: usize,
    /// Action count that seals a ledger block.
    pub max_actions_per_block: usize,
    /// Worker bound for the parallel chunk fetch stage.
    pub fetch_parallelism: usize,
    /// Liveness timeout for peers, in milliseconds.
    pub peer_timeout_ms: u64,
    /// Seconds between peer eviction sweeps.
    pub eviction_interval_secs: u64,
    /// Whether chunk files carry the total-chunks manifest in their header.
    pub manifest_in_header: bool,
    /// Whether ledger blocks that break strict adjacency are retained. On by
    /// default; turning it off prunes them at reload.
    pub keep_orphan_blocks: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 4800,
            advertise_host: "127.0.0.1".to_string(),
            data_dir: PathBuf::from(".drift"),
            bootstrap: None,
            chunk_size: CHUNK_SIZE,
            max_actions_per_block: MAX_ACTIONS_PER_BLOCK,
            fetch_parallelism: FETCH_PARALLELISM,
            peer_timeout_ms: PEER_TIMEOUT_MS,
            eviction_interval_secs: 60,
            manifest_in_header: true,
            keep_orphan_blocks: true,
        }
    }
}

impl NodeConfig {
    /// Loads configuration from a TOML file, falling back to defaults for
    /// absent keys. A missing file yields the full defaults.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let toml: toml::Value = content
            .parse()
            .map_err(|e| NodeError::Config(format!("cannot parse {}: {e}", path.display())))?;

        let mut config = Self::default();

        if let Some(node) = toml.get("node") {
            if let Some(dir) = node.get("data_dir").and_then(|v| v.as_str()) {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(network) = toml.get("network") {
            if let Some(host) = network.get("listen_host").and_then(|v| v.as_str()) {
                config.listen_host = host.to_string();
            }
            if let Some(port) = network.get("listen_port").and_then(|v| v.as_integer()) {
                config.listen_port = u16::try_from(port)
                    .map_err(|_| NodeError::Config(format!("invalid listen_port {port}")))?;
            }
            if let Some(host) = network.get("advertise_host").and_then(|v| v.as_str()) {
                config.advertise_host = host.to_string();
            }
            if let Some(bootstrap) = network.get("bootstrap").and_then(|v| v.as_str()) {
                config.bootstrap = Some(bootstrap.to_string());
            }
            if let Some(timeout) = network.get("peer_timeout_ms").and_then(|v| v.as_integer()) {
                config.peer_timeout_ms = timeout as u64;
            }
            if let Some(interval) = network
                .get("eviction_interval_secs")
                .and_then(|v| v.as_integer())
            {
                config.eviction_interval_secs = interval as u64;
            }
        }

        if let Some(storage) = toml.get("storage") {
            if let Some(size) = storage.get("chunk_size").and_then(|v| v.as_integer()) {
                config.chunk_size = size as usize;
            }
            if let Some(manifest) = storage.get("manifest_in_header").and_then(|v| v.as_bool()) {
                config.manifest_in_header = manifest;
            }
            if let Some(parallelism) = storage.get("fetch_parallelism").and_then(|v| v.as_integer())
            {
                config.fetch_parallelism = parallelism as usize;
            }
        }

        if let Some(ledger) = toml.get("ledger") {
            if let Some(max) = ledger
                .get("max_actions_per_block")
                .and_then(|v| v.as_integer())
            {
                config.max_actions_per_block = max as usize;
            }
            if let Some(keep) = ledger.get("keep_orphan_blocks").and_then(|v| v.as_bool()) {
                config.keep_orphan_blocks = keep;
            }
        }

        Ok(config)
    }

    /// The chunk cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// The ledger block directory.
    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir.join("ledger").join("blocks")
    }

    /// The socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr, NodeError> {
        format!("{}:{}", self.listen_host, self.listen_port)
            .parse()
            .map_err(|_| {
                NodeError::Config(format!(
                    "invalid listen address {}:{}",
                    self.listen_host, self.listen_port
                ))
            })
    }
}

/// Splits a `host:port` endpoint string.
pub fn parse_endpoint(endpoint: &str) -> Result<(String, u16), NodeError> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| NodeError::Config(format!("endpoint {endpoint} is not host:port")))?;
    let port = port
        .parse()
        .map_err(|_| NodeError::Config(format!("invalid port in endpoint {endpoint}")))?;
    Ok((host.to_string(), port))
}
