//! Chunk store configuration.

use std::path::PathBuf;

use drift_core::CHUNK_SIZE;

/// Configuration for the on-disk chunk cache.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one compressed file per chunk.
    pub cache_dir: PathBuf,
    /// Chunk size in bytes.
    pub chunk_size: usize,
    /// Whether chunk files carry the total-chunk manifest in their gzip
    /// header. With the manifest off, a warm-started chunk reports a total
    /// of 1 until the next authoritative put for its file.
    pub manifest_in_header: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            chunk_size: CHUNK_SIZE,
            manifest_in_header: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration rooted at `cache_dir` with defaults.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert!(config.manifest_in_header);
    }
}
