//! Drift Ledger - Append-only, hash-chained record of cache actions.
//!
//! The ledger batches [`Action`]s into [`Block`]s. Exactly one block is open
//! at any time; it seals when it reaches the configured action count (or at
//! shutdown), gets its hash computed, is persisted as one JSON file, and a
//! fresh open block takes its place. Blocks received from peers are validated
//! against the local chain before being appended.
//!
//! Validation comes in two strengths: [`Ledger::validate_block`] only
//! requires the predecessor to exist *somewhere* in the chain, so gossiped
//! blocks may land out of strict order; [`Ledger::validate_chain`] demands
//! index-adjacent linkage and is the authoritative integrity check before
//! serving or syncing.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use drift_core::{FileHash, PeerId, MAX_ACTIONS_PER_BLOCK};
use drift_proto::{Action, ActionType, Block};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Extension of persisted block files.
const BLOCK_FILE_EXT: &str = "json";

/// Ledger failures.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Block (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Directory holding one JSON file per sealed block.
    pub dir: PathBuf,
    /// Number of actions that seals the open block.
    pub max_actions_per_block: usize,
    /// Whether blocks that break strict adjacency stay in the chain. On by
    /// default. When off, reload prunes every block outside the longest
    /// genesis-rooted linked prefix and deletes its file.
    pub keep_orphan_blocks: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("ledger/blocks"),
            max_actions_per_block: MAX_ACTIONS_PER_BLOCK,
            keep_orphan_blocks: true,
        }
    }
}

impl LedgerConfig {
    /// Creates a configuration rooted at `dir` with the default seal
    /// threshold.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }
}

struct LedgerState {
    /// Sealed blocks in insertion order. Never empty after `open`.
    chain: Vec<Block>,
    /// The one open block accumulating new actions.
    current: Block,
}

/// The hash-chained action ledger.
///
/// All mutators take the exclusive side of the internal lock; reads take the
/// shared side. Block persistence happens inside the lock so no action is
/// lost across a seal boundary.
pub struct Ledger {
    peer_id: PeerId,
    config: LedgerConfig,
    state: RwLock<LedgerState>,
    seal_tx: Mutex<Option<mpsc::UnboundedSender<Block>>>,
}

impl Ledger {
    /// Opens the ledger: reloads persisted blocks (lexicographic filename
    /// order), discards any that fail validation, creates and persists a
    /// genesis block when nothing valid was found, and opens a fresh current
    /// block on top.
    pub fn open(peer_id: PeerId, config: LedgerConfig) -> Result<Self, LedgerError> {
        fs::create_dir_all(&config.dir)?;

        let mut chain = load_blocks(&config.dir);
        if !config.keep_orphan_blocks {
            chain = prune_orphans(&config.dir, chain);
        }
        if chain.is_empty() {
            let genesis = Block::genesis(peer_id.clone());
            save_block(&config.dir, &genesis)?;
            info!(peer_id = %peer_id, "Created genesis block");
            chain.push(genesis);
        } else {
            info!(blocks = chain.len(), "Reloaded ledger from disk");
        }

        let previous_hash = chain.last().map(|b| b.block_hash.clone()).unwrap_or_default();
        let current = Block::new(Block::next_id(), previous_hash, peer_id.clone());

        Ok(Self {
            peer_id,
            config,
            state: RwLock::new(LedgerState { chain, current }),
            seal_tx: Mutex::new(None),
        })
    }

    /// Returns a receiver that observes every block sealed locally. Used by
    /// the node to gossip LEDGER_ENTRY messages.
    pub fn seal_events(&self) -> mpsc::UnboundedReceiver<Block> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.seal_tx.lock() = Some(tx);
        rx
    }

    /// Builds an action of `action_type` attributed to this node.
    pub fn create_action(&self, action_type: ActionType, file_hash: FileHash, chunk_id: u32) -> Action {
        Action::new(action_type, file_hash, self.peer_id.clone(), chunk_id)
    }

    /// Appends an action to the open block. Returns true iff the append
    /// caused the block to seal.
    pub fn add_action(&self, action: Action) -> bool {
        let mut state = self.state.write();
        debug!(
            action = %action.action_type,
            file_hash = %action.file_hash.short(),
            chunk_id = action.chunk_id,
            "Recorded action"
        );
        state.current.actions.push(action);

        if state.current.actions.len() >= self.config.max_actions_per_block {
            self.seal_locked(&mut state);
            return true;
        }
        false
    }

    /// Seals the open block, persists it, and opens a fresh one. Returns
    /// `None` (and does nothing) when the open block holds no actions.
    pub fn seal_current_block(&self) -> Option<Block> {
        let mut state = self.state.write();
        self.seal_locked(&mut state)
    }

    fn seal_locked(&self, state: &mut LedgerState) -> Option<Block> {
        if state.current.actions.is_empty() {
            return None;
        }

        let mut sealed = std::mem::replace(
            &mut state.current,
            Block::new(Block::next_id(), String::new(), self.peer_id.clone()),
        );
        sealed.block_hash = sealed.compute_hash();
        state.current.previous_hash = sealed.block_hash.clone();

        if let Err(e) = save_block(&self.config.dir, &sealed) {
            // The block stays in the chain; a restart may lose it, at which
            // point peers re-supply it via sync.
            error!(block_id = %sealed.block_id, error = %e, "Failed to persist sealed block");
        }
        state.chain.push(sealed.clone());

        info!(
            block_id = %sealed.block_id,
            actions = sealed.actions.len(),
            "Block sealed"
        );

        if let Some(tx) = self.seal_tx.lock().as_ref() {
            let _ = tx.send(sealed.clone());
        }
        Some(sealed)
    }

    /// Appends a peer-originated block. Rejects duplicates (by id) and
    /// blocks failing [`Self::validate_block`]; rolls back the in-memory
    /// append when persistence fails.
    pub fn add_block(&self, block: Block) -> bool {
        let mut state = self.state.write();

        if state.chain.iter().any(|b| b.block_id == block.block_id) {
            debug!(block_id = %block.block_id, "Block already present");
            return false;
        }
        if !validate_against(&state.chain, &block) {
            warn!(block_id = %block.block_id, "Rejected invalid block");
            return false;
        }

        let block_id = block.block_id.clone();
        if let Err(e) = save_block(&self.config.dir, &block) {
            error!(block_id = %block_id, error = %e, "Failed to persist block");
            return false;
        }
        state.chain.push(block);

        info!(block_id = %block_id, "Block appended from peer");
        true
    }

    /// Validates one block against the current chain: the stored hash must
    /// match the recomputed hash, and (for non-genesis blocks) the
    /// predecessor must exist somewhere in the chain.
    pub fn validate_block(&self, block: &Block) -> bool {
        validate_against(&self.state.read().chain, block)
    }

    /// Authoritative integrity check: every block validates and linkage is
    /// strictly index-adjacent.
    pub fn validate_chain(&self) -> bool {
        let state = self.state.read();
        for (i, block) in state.chain.iter().enumerate() {
            if !validate_against(&state.chain, block) {
                return false;
            }
            if i > 0 && block.previous_hash != state.chain[i - 1].block_hash {
                warn!(block_id = %block.block_id, "Chain linkage broken");
                return false;
            }
        }
        true
    }

    /// Returns every block sealed after the one with hash `since`. When the
    /// hash is unknown the whole chain is returned (the requester is
    /// effectively empty).
    pub fn get_blocks_since(&self, since: &str) -> Vec<Block> {
        let state = self.state.read();
        match state.chain.iter().position(|b| b.block_hash == since) {
            Some(i) => state.chain[i + 1..].to_vec(),
            None => state.chain.clone(),
        }
    }

    /// The most recently sealed block.
    pub fn last_block(&self) -> Block {
        self.state
            .read()
            .chain
            .last()
            .expect("chain holds at least genesis")
            .clone()
    }

    /// Snapshot of the open block.
    pub fn current_block(&self) -> Block {
        self.state.read().current.clone()
    }

    /// Number of sealed blocks.
    pub fn chain_size(&self) -> usize {
        self.state.read().chain.len()
    }

    /// Snapshot of the sealed chain, in order.
    pub fn blocks(&self) -> Vec<Block> {
        self.state.read().chain.clone()
    }
}

/// Validates `block` against an arbitrary chain snapshot.
fn validate_against(chain: &[Block], block: &Block) -> bool {
    if block.compute_hash() != block.block_hash {
        warn!(block_id = %block.block_id, "Block hash mismatch");
        return false;
    }
    if !block.is_genesis() && !chain.iter().any(|b| b.block_hash == block.previous_hash) {
        warn!(block_id = %block.block_id, "Block has no known predecessor");
        return false;
    }
    true
}

/// Reloads persisted blocks in lexicographic filename order, validating each
/// against the chain built so far. Unreadable or invalid files are skipped
/// with a warning.
fn load_blocks(dir: &Path) -> Vec<Block> {
    let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(BLOCK_FILE_EXT))
            .collect(),
        Err(_) => return Vec::new(),
    };
    files.sort();

    let mut chain = Vec::new();
    for path in files {
        let block: Block = match fs::read_to_string(&path).map_err(LedgerError::from).and_then(|s| {
            serde_json::from_str(&s).map_err(LedgerError::from)
        }) {
            Ok(block) => block,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable block file");
                continue;
            }
        };
        if validate_against(&chain, &block) {
            chain.push(block);
        } else {
            warn!(file = %path.display(), "Skipping invalid block file");
        }
    }
    chain
}

/// Keeps the longest genesis-rooted, adjacency-linked prefix of `chain` and
/// drops everything else. Dropped block files are deleted so they do not
/// resurface at the next reload.
fn prune_orphans(dir: &Path, chain: Vec<Block>) -> Vec<Block> {
    let mut kept: Vec<Block> = Vec::with_capacity(chain.len());
    for block in chain {
        let linked = match kept.last() {
            Some(prev) => block.previous_hash == prev.block_hash,
            None => block.is_genesis(),
        };
        if linked {
            kept.push(block);
        } else {
            warn!(block_id = %block.block_id, "Pruning orphan block");
            let path = dir.join(format!("{}.{}", block.block_id, BLOCK_FILE_EXT));
            if path.exists() {
                let _ = fs::remove_file(path);
            }
        }
    }
    kept
}

/// Persists one block as `<dir>/<block_id>.json`.
fn save_block(dir: &Path, block: &Block) -> Result<(), LedgerError> {
    let path = dir.join(format!("{}.{}", block.block_id, BLOCK_FILE_EXT));
    let json = serde_json::to_string_pretty(block)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use drift_core::FileHash;
    use tempfile::TempDir;

    use super::*;

    fn test_ledger(dir: &TempDir, threshold: usize) -> Ledger {
        let config = LedgerConfig {
            dir: dir.path().to_path_buf(),
            max_actions_per_block: threshold,
            ..Default::default()
        };
        Ledger::open(PeerId::from("peer0001"), config).unwrap()
    }

    fn put_action(ledger: &Ledger, chunk_id: u32) -> Action {
        ledger.create_action(ActionType::CachePut, FileHash::of(b"file"), chunk_id)
    }

    #[test]
    fn test_open_creates_genesis() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir, 100);

        assert_eq!(ledger.chain_size(), 1);
        let genesis = ledger.last_block();
        assert!(genesis.is_genesis());
        assert!(ledger.validate_chain());
        // Genesis is on disk.
        assert!(dir.path().join("0.json").exists());
    }

    #[test]
    fn test_current_links_to_last() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir, 100);
        assert_eq!(ledger.current_block().previous_hash, ledger.last_block().block_hash);
    }

    #[test]
    fn test_seal_empty_is_noop() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir, 100);
        assert!(ledger.seal_current_block().is_none());
        assert_eq!(ledger.chain_size(), 1);
    }

    #[test]
    fn test_threshold_seals_exactly_once() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir, 4);

        for i in 0..3 {
            assert!(!ledger.add_action(put_action(&ledger, i)));
        }
        assert!(ledger.add_action(put_action(&ledger, 3)));

        assert_eq!(ledger.chain_size(), 2);
        let sealed = ledger.last_block();
        assert_eq!(sealed.actions.len(), 4);
        assert_eq!(sealed.block_hash, sealed.compute_hash());

        // A fifth action lands in the fresh open block; nothing else seals.
        assert!(!ledger.add_action(put_action(&ledger, 4)));
        assert_eq!(ledger.chain_size(), 2);
        assert_eq!(ledger.current_block().actions.len(), 1);
    }

    #[test]
    fn test_sealed_chain_links() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir, 2);

        for i in 0..6 {
            ledger.add_action(put_action(&ledger, i));
        }
        assert_eq!(ledger.chain_size(), 4);
        assert!(ledger.validate_chain());
    }

    #[test]
    fn test_blocks_since() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir, 1);
        for i in 0..3 {
            ledger.add_action(put_action(&ledger, i));
        }

        assert!(ledger.get_blocks_since(&ledger.last_block().block_hash).is_empty());
        assert_eq!(ledger.get_blocks_since("unknown").len(), 4);

        let genesis_hash = ledger.blocks()[0].block_hash.clone();
        assert_eq!(ledger.get_blocks_since(&genesis_hash).len(), 3);
    }

    #[test]
    fn test_add_block_out_of_order_predecessor() {
        let dir_a = TempDir::new().unwrap();
        let a = test_ledger(&dir_a, 1);
        a.add_action(put_action(&a, 0));
        a.add_action(put_action(&a, 1));
        let genesis_hash = a.blocks()[0].block_hash.clone();
        let sealed = a.get_blocks_since(&genesis_hash);
        assert_eq!(sealed.len(), 2);

        let dir_b = TempDir::new().unwrap();
        let b = test_ledger(&dir_b, 1);
        // The second sealed block arrives first; its predecessor is not
        // known at B yet.
        assert!(!b.add_block(sealed[1].clone()));
        // Once the predecessor lands, the out-of-order block is accepted.
        assert!(b.add_block(sealed[0].clone()));
        assert!(b.add_block(sealed[1].clone()));
        // Duplicate rejected.
        assert!(!b.add_block(sealed[1].clone()));
        assert_eq!(b.chain_size(), 3);
        assert!(b.validate_chain());
    }

    #[test]
    fn test_sync_between_fresh_nodes_converges() {
        let dir_a = TempDir::new().unwrap();
        let a = test_ledger(&dir_a, 1);
        for i in 0..9 {
            a.add_action(put_action(&a, i));
        }
        assert_eq!(a.chain_size(), 10);

        // B only holds its genesis, which hashes identically to A's.
        let dir_b = TempDir::new().unwrap();
        let b = test_ledger(&dir_b, 1);
        let missing = a.get_blocks_since(&b.last_block().block_hash);
        assert_eq!(missing.len(), 9);

        for block in missing {
            assert!(b.add_block(block));
        }
        assert_eq!(b.chain_size(), 10);
        assert!(b.validate_chain());
    }

    #[test]
    fn test_tampered_block_rejected() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir, 1);
        ledger.add_action(put_action(&ledger, 0));

        let mut tampered = ledger.last_block();
        tampered.block_id = "forged".to_string();
        tampered.actions[0].chunk_id = 99;
        assert!(!ledger.validate_block(&tampered));
        assert!(!ledger.add_block(tampered));
    }

    #[test]
    fn test_reload_preserves_chain() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = test_ledger(&dir, 2);
            for i in 0..6 {
                ledger.add_action(put_action(&ledger, i));
            }
            assert_eq!(ledger.chain_size(), 4);
        }

        let reloaded = test_ledger(&dir, 2);
        assert_eq!(reloaded.chain_size(), 4);
        assert!(reloaded.validate_chain());
    }

    #[test]
    fn test_reload_skips_corrupted_block() {
        let dir = TempDir::new().unwrap();
        let tail_id;
        {
            let ledger = test_ledger(&dir, 1);
            ledger.add_action(put_action(&ledger, 0));
            ledger.add_action(put_action(&ledger, 1));
            tail_id = ledger.last_block().block_id.clone();
        }

        // Corrupt the middle (first sealed, non-genesis, non-tail) block.
        let victim = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| {
                let stem = p.file_stem().unwrap().to_str().unwrap();
                stem != "0" && stem != tail_id
            })
            .unwrap();
        let mut contents = fs::read(&victim).unwrap();
        let mid = contents.len() / 2;
        contents[mid] ^= 0xff;
        fs::write(&victim, contents).unwrap();

        let reloaded = test_ledger(&dir, 1);
        // The corrupted block is gone; its successor lost its predecessor
        // and is dropped too, leaving only genesis.
        assert_eq!(reloaded.chain_size(), 1);
        assert!(reloaded.validate_chain());
    }

    #[test]
    fn test_orphans_kept_by_default_pruned_on_request() {
        // Two honest blocks, then a fork: a block from another node whose
        // predecessor is genesis again.
        let dir_a = TempDir::new().unwrap();
        let a = test_ledger(&dir_a, 1);
        a.add_action(put_action(&a, 0));
        a.add_action(put_action(&a, 1));

        let dir_c = TempDir::new().unwrap();
        let c = test_ledger(&dir_c, 1);
        c.add_action(put_action(&c, 0));
        let fork = c.last_block();

        let dir_b = TempDir::new().unwrap();
        {
            let b = test_ledger(&dir_b, 1);
            for block in a.get_blocks_since(&b.last_block().block_hash) {
                assert!(b.add_block(block));
            }
            // The fork's predecessor (genesis) exists somewhere, so the
            // lenient validator lets it in; adjacency is now broken.
            assert!(b.add_block(fork.clone()));
            assert_eq!(b.chain_size(), 4);
            assert!(!b.validate_chain());
        }

        // Default reload keeps the orphan indefinitely.
        let kept = test_ledger(&dir_b, 1);
        assert_eq!(kept.chain_size(), 4);
        assert!(!kept.validate_chain());
        drop(kept);

        // With retention off, reload prunes it and deletes its file.
        let config = LedgerConfig {
            dir: dir_b.path().to_path_buf(),
            max_actions_per_block: 1,
            keep_orphan_blocks: false,
        };
        let pruned = Ledger::open(PeerId::from("peer0001"), config).unwrap();
        assert_eq!(pruned.chain_size(), 3);
        assert!(pruned.validate_chain());
        assert!(!dir_b.path().join(format!("{}.json", fork.block_id)).exists());
        drop(pruned);

        // The prune is durable: a default reload no longer sees the orphan.
        let reloaded = test_ledger(&dir_b, 1);
        assert_eq!(reloaded.chain_size(), 3);
        assert!(reloaded.validate_chain());
    }

    #[test]
    fn test_seal_events_delivered() {
        let dir = TempDir::new().unwrap();
        let ledger = test_ledger(&dir, 1);
        let mut rx = ledger.seal_events();

        ledger.add_action(put_action(&ledger, 0));
        let sealed = rx.try_recv().unwrap();
        assert_eq!(sealed.actions.len(), 1);
        assert_eq!(sealed.block_hash, ledger.last_block().block_hash);
    }
}
