//! The chunk store: in-memory index plus compressed on-disk persistence.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drift_core::{now_millis, sha256_file, FileHash, PeerId};
use drift_ledger::Ledger;
use drift_proto::ActionType;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::archive;
use crate::config::StoreConfig;
use crate::StoreError;

/// Extension of persisted chunk files.
const CHUNK_FILE_EXT: &str = "gz";

/// A cached file chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheChunk {
    /// Fingerprint of the parent file.
    pub file_hash: FileHash,
    /// 0-based index into the file's chunk list.
    pub chunk_id: u32,
    /// Total number of chunks of the parent file.
    pub total_chunks: u32,
    /// The chunk bytes.
    pub data: Vec<u8>,
    /// Peer that installed the chunk locally.
    pub owner_peer_id: PeerId,
    /// Install time in milliseconds, drives age-based eviction.
    pub timestamp: u64,
}

/// Content-addressed cache of file chunks, indexed by
/// `(file fingerprint, chunk index)`.
pub struct ChunkStore {
    peer_id: PeerId,
    config: StoreConfig,
    ledger: Arc<Ledger>,
    index: RwLock<HashMap<String, CacheChunk>>,
}

impl ChunkStore {
    /// Opens the store: creates the cache directory if absent and warm-loads
    /// every parsable persisted chunk into the index.
    pub fn open(peer_id: PeerId, ledger: Arc<Ledger>, config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.cache_dir)?;

        let store = Self {
            peer_id,
            config,
            ledger,
            index: RwLock::new(HashMap::new()),
        };
        store.warm_load();
        Ok(store)
    }

    /// Scans the cache directory and restores chunks. Files that cannot be
    /// parsed are skipped; the startup validator tolerates partial writes.
    fn warm_load(&self) {
        let entries = match fs::read_dir(&self.config.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Cannot scan cache directory");
                return;
            }
        };

        let mut index = self.index.write();
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if path.extension().and_then(|e| e.to_str()) != Some(CHUNK_FILE_EXT) {
                continue;
            }
            let Some((file_hash, chunk_id)) = parse_chunk_filename(&path) else {
                continue;
            };
            let (data, manifest_total) = match fs::read(&path).and_then(|bytes| archive::unpack(&bytes)) {
                Ok(unpacked) => unpacked,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable chunk file");
                    continue;
                }
            };

            // Without a header manifest the total is unknown until the next
            // authoritative put for this file.
            let total_chunks = manifest_total.unwrap_or(1);
            let chunk = CacheChunk {
                file_hash: file_hash.clone(),
                chunk_id,
                total_chunks,
                data,
                owner_peer_id: self.peer_id.clone(),
                timestamp: now_millis(),
            };
            index.insert(cache_key(&file_hash, chunk_id), chunk);
        }

        if !index.is_empty() {
            info!(chunks = index.len(), "Warm-loaded chunk cache");
        }
    }

    /// Installs a chunk in memory and on disk, then records a CACHE_PUT.
    ///
    /// Returns false when the disk write fails; the in-memory entry is still
    /// installed (peers can re-supply the chunk after a restart).
    pub fn put_chunk(&self, file_hash: &FileHash, chunk_id: u32, data: Vec<u8>, total_chunks: u32) -> bool {
        let chunk = CacheChunk {
            file_hash: file_hash.clone(),
            chunk_id,
            total_chunks,
            data,
            owner_peer_id: self.peer_id.clone(),
            timestamp: now_millis(),
        };

        let packed = archive::pack(
            &chunk.data,
            self.config.manifest_in_header.then_some(total_chunks),
        );
        self.index.write().insert(cache_key(file_hash, chunk_id), chunk);

        let written = packed.and_then(|bytes| fs::write(self.chunk_path(file_hash, chunk_id), bytes));
        if let Err(e) = written {
            warn!(
                file_hash = %file_hash.short(),
                chunk_id,
                error = %e,
                "Failed to persist chunk"
            );
            return false;
        }

        self.ledger
            .add_action(self.ledger.create_action(ActionType::CachePut, file_hash.clone(), chunk_id));
        debug!(file_hash = %file_hash.short(), chunk_id, "Cached chunk");
        true
    }

    /// Looks a chunk up in memory; a hit records a CACHE_HIT. Never consults
    /// peers.
    pub fn get_chunk(&self, file_hash: &FileHash, chunk_id: u32) -> Option<CacheChunk> {
        let chunk = self.index.read().get(&cache_key(file_hash, chunk_id)).cloned()?;
        self.ledger
            .add_action(self.ledger.create_action(ActionType::CacheHit, file_hash.clone(), chunk_id));
        debug!(file_hash = %file_hash.short(), chunk_id, "Cache hit");
        Some(chunk)
    }

    /// Whether a chunk is present, without recording a hit.
    pub fn has_chunk(&self, file_hash: &FileHash, chunk_id: u32) -> bool {
        self.index.read().contains_key(&cache_key(file_hash, chunk_id))
    }

    /// The total chunk count of a file, from any locally known chunk.
    pub fn total_chunks_of(&self, file_hash: &FileHash) -> Option<u32> {
        self.any_chunk_of(file_hash).map(|c| c.total_chunks)
    }

    /// Any locally known chunk of a file, without recording a hit.
    pub fn any_chunk_of(&self, file_hash: &FileHash) -> Option<CacheChunk> {
        self.index
            .read()
            .values()
            .find(|c| &c.file_hash == file_hash)
            .cloned()
    }

    /// Number of chunks of `file_hash` held locally.
    pub fn local_chunk_count(&self, file_hash: &FileHash) -> u32 {
        self.index
            .read()
            .values()
            .filter(|c| &c.file_hash == file_hash)
            .count() as u32
    }

    /// Splits a file into chunks and caches every one of them. Returns the
    /// file fingerprint. An empty file produces zero chunks.
    pub fn ingest_file(&self, path: &Path) -> Result<FileHash, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotAFile(path.display().to_string()));
        }

        let file_hash = FileHash::from_hex(sha256_file(path)?);
        let data = fs::read(path)?;
        let chunk_size = self.config.chunk_size;
        let total_chunks = data.len().div_ceil(chunk_size) as u32;

        for i in 0..total_chunks {
            let start = i as usize * chunk_size;
            let end = (start + chunk_size).min(data.len());
            self.put_chunk(&file_hash, i, data[start..end].to_vec(), total_chunks);
        }

        info!(
            file_hash = %file_hash.short(),
            size = data.len(),
            chunks = total_chunks,
            "Ingested file"
        );
        Ok(file_hash)
    }

    /// Streams all chunks of a file, in order, to `output`, recording one
    /// CACHE_GET per chunk. Returns false when the file is unknown or any
    /// chunk is missing.
    pub fn assemble_file(&self, file_hash: &FileHash, output: &Path) -> Result<bool, StoreError> {
        let Some(total_chunks) = self.total_chunks_of(file_hash) else {
            warn!(file_hash = %file_hash.short(), "No chunks known for file");
            return Ok(false);
        };

        for i in 0..total_chunks {
            if !self.has_chunk(file_hash, i) {
                warn!(
                    file_hash = %file_hash.short(),
                    chunk_id = i,
                    total_chunks,
                    "Missing chunk, cannot assemble"
                );
                return Ok(false);
            }
        }

        let mut out = fs::File::create(output)?;
        for i in 0..total_chunks {
            // Presence was just verified; a concurrent eviction between the
            // check and here is the only way this lookup can miss.
            let Some(chunk) = self.index.read().get(&cache_key(file_hash, i)).cloned() else {
                warn!(file_hash = %file_hash.short(), chunk_id = i, "Chunk evicted mid-assembly");
                return Ok(false);
            };
            out.write_all(&chunk.data)?;
            self.ledger
                .add_action(self.ledger.create_action(ActionType::CacheGet, file_hash.clone(), i));
        }

        info!(file_hash = %file_hash.short(), chunks = total_chunks, "Assembled file");
        Ok(true)
    }

    /// Number of chunks currently cached.
    pub fn chunk_count(&self) -> usize {
        self.index.read().len()
    }

    /// Removes every chunk older than `max_age_ms` from memory and disk.
    /// Returns the number removed. Eviction does not record ledger actions.
    pub fn evict_older_than(&self, max_age_ms: u64) -> usize {
        let now = now_millis();
        let stale: Vec<(String, FileHash, u32)> = self
            .index
            .read()
            .values()
            .filter(|c| now.saturating_sub(c.timestamp) > max_age_ms)
            .map(|c| (cache_key(&c.file_hash, c.chunk_id), c.file_hash.clone(), c.chunk_id))
            .collect();

        let mut removed = 0;
        for (key, file_hash, chunk_id) in stale {
            if self.index.write().remove(&key).is_some() {
                let path = self.chunk_path(&file_hash, chunk_id);
                if path.exists() {
                    let _ = fs::remove_file(path);
                }
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Evicted stale chunks");
        }
        removed
    }

    fn chunk_path(&self, file_hash: &FileHash, chunk_id: u32) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{}_{}.{}", file_hash, chunk_id, CHUNK_FILE_EXT))
    }
}

fn cache_key(file_hash: &FileHash, chunk_id: u32) -> String {
    format!("{}_{}", file_hash, chunk_id)
}

/// Parses `<fileHash>_<chunkId>.gz` into its parts.
fn parse_chunk_filename(path: &Path) -> Option<(FileHash, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let (hash, id) = stem.rsplit_once('_')?;
    Some((FileHash::from_hex(hash), id.parse().ok()?))
}
