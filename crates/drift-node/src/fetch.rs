//! Fetch orchestration: assemble locally when possible, otherwise pull
//! missing chunks from the swarm in parallel.

use std::path::Path;
use std::sync::Arc;

use drift_core::FileHash;
use drift_net::PeerRegistry;
use drift_store::ChunkStore;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::peers::PeerClient;
use crate::NodeError;

/// Summary of what the node knows about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File fingerprint.
    pub file_hash: FileHash,
    /// Total number of chunks.
    pub total_chunks: u32,
    /// Approximate size: chunk count times the sampled chunk's length. The
    /// tail chunk is usually smaller.
    pub estimated_size: u64,
    /// Chunks already in the local cache.
    pub chunks_locally: u32,
}

/// Locates, downloads, and assembles files across the swarm.
pub struct FetchService {
    store: Arc<ChunkStore>,
    registry: Arc<PeerRegistry>,
    client: Arc<PeerClient>,
    parallelism: usize,
}

impl FetchService {
    /// Creates the service with the given parallel-fetch bound.
    pub fn new(
        store: Arc<ChunkStore>,
        registry: Arc<PeerRegistry>,
        client: Arc<PeerClient>,
        parallelism: usize,
    ) -> Self {
        Self {
            store,
            registry,
            client,
            parallelism: parallelism.max(1),
        }
    }

    /// Ingests a local file into the cache. Returns its fingerprint.
    pub fn upload_file(&self, path: &Path) -> Result<FileHash, NodeError> {
        Ok(self.store.ingest_file(path)?)
    }

    /// Materializes a file at `output`: from the local cache when complete,
    /// otherwise by fetching missing chunks from active peers. Partial
    /// fetches leave their chunks cached for future retries.
    pub async fn fetch(&self, file_hash: &FileHash, output: &Path) -> Result<bool, NodeError> {
        // Fast path: everything is already local.
        if let Ok(true) = self.store.assemble_file(file_hash, output) {
            info!(file_hash = %file_hash.short(), "Assembled from local cache");
            return Ok(true);
        }

        let peers = Arc::new(self.registry.active_peers());
        if peers.is_empty() {
            warn!(file_hash = %file_hash.short(), "No active peers to fetch from");
            return Ok(false);
        }

        // Chunk 0 sets the fetch plan: probe peers one by one until a copy
        // shows up.
        let mut first_chunk = None;
        for peer in peers.iter() {
            if let Some(chunk) = self.client.request_chunk(peer, file_hash, 0).await {
                first_chunk = Some(chunk);
                break;
            }
        }
        let Some(first_chunk) = first_chunk else {
            warn!(file_hash = %file_hash.short(), "No peer holds the first chunk");
            return Ok(false);
        };

        let total_chunks = first_chunk.total_chunks;
        info!(
            file_hash = %file_hash.short(),
            total_chunks,
            peers = peers.len(),
            "Fetching file from swarm"
        );
        self.store.put_chunk(file_hash, 0, first_chunk.data, total_chunks);

        // Remaining chunks in parallel, bounded by the worker pool. Within a
        // task the peer snapshot is walked in order; first copy wins.
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = Vec::with_capacity(total_chunks.saturating_sub(1) as usize);
        for chunk_id in 1..total_chunks {
            if self.store.has_chunk(file_hash, chunk_id) {
                debug!(file_hash = %file_hash.short(), chunk_id, "Chunk already cached");
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let peers = Arc::clone(&peers);
            let client = Arc::clone(&self.client);
            let store = Arc::clone(&self.store);
            let file_hash = file_hash.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                for peer in peers.iter() {
                    if let Some(chunk) = client.request_chunk(peer, &file_hash, chunk_id).await {
                        store.put_chunk(&file_hash, chunk_id, chunk.data, total_chunks);
                        return Some(chunk_id);
                    }
                }
                warn!(file_hash = %file_hash.short(), chunk_id, "No peer holds chunk");
                None
            }));
        }

        let mut all_fetched = true;
        for task in tasks {
            match task.await {
                Ok(Some(_)) => {}
                _ => all_fetched = false,
            }
        }
        if !all_fetched {
            warn!(file_hash = %file_hash.short(), "Fetch incomplete, chunks kept for retry");
            return Ok(false);
        }

        Ok(self.store.assemble_file(file_hash, output)?)
    }

    /// Returns what is known about a file, preferring local knowledge and
    /// falling back to probing peers for the first chunk.
    pub async fn file_info(&self, file_hash: &FileHash) -> Option<FileInfo> {
        if let Some(sample) = self.store.any_chunk_of(file_hash) {
            return Some(FileInfo {
                file_hash: file_hash.clone(),
                total_chunks: sample.total_chunks,
                estimated_size: sample.total_chunks as u64 * sample.data.len() as u64,
                chunks_locally: self.store.local_chunk_count(file_hash),
            });
        }

        for peer in self.registry.active_peers() {
            if let Some(chunk) = self.client.request_chunk(&peer, file_hash, 0).await {
                return Some(FileInfo {
                    file_hash: file_hash.clone(),
                    total_chunks: chunk.total_chunks,
                    estimated_size: chunk.total_chunks as u64 * chunk.data.len() as u64,
                    chunks_locally: 0,
                });
            }
        }
        None
    }
}
