//! Known peers and their liveness state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use drift_core::{now_millis, PeerId, PEER_TIMEOUT_MS};
use drift_proto::PeerAddr;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One known peer. Equality is by id.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// Peer identity.
    pub id: PeerId,
    /// Reachable host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Last successful contact, milliseconds since epoch.
    pub last_seen_millis: u64,
    /// False after a failed send, true again on any successful contact.
    pub active: bool,
}

impl PeerRecord {
    /// Creates a record for a freshly contacted peer.
    pub fn new(id: PeerId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            last_seen_millis: now_millis(),
            active: true,
        }
    }

    /// The wire form of this record.
    pub fn addr(&self) -> PeerAddr {
        PeerAddr::new(self.id.clone(), self.host.clone(), self.port)
    }

    fn touch(&mut self) {
        self.last_seen_millis = now_millis();
    }
}

impl PartialEq for PeerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerRecord {}

impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{} ({})",
            self.id,
            self.host,
            self.port,
            if self.active { "active" } else { "inactive" }
        )
    }
}

/// In-memory map of known peers.
///
/// Adds and eviction may interleave freely; all access goes through one
/// read-write lock. Eviction is the sole path that destroys a record.
pub struct PeerRegistry {
    local_id: PeerId,
    peer_timeout_ms: u64,
    peers: RwLock<HashMap<PeerId, PeerRecord>>,
}

impl PeerRegistry {
    /// Creates a registry for the node identified by `local_id`, with the
    /// default 5-minute liveness timeout.
    pub fn new(local_id: PeerId) -> Self {
        Self::with_timeout(local_id, PEER_TIMEOUT_MS)
    }

    /// Creates a registry with a custom liveness timeout.
    pub fn with_timeout(local_id: PeerId, peer_timeout_ms: u64) -> Self {
        Self {
            local_id,
            peer_timeout_ms,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// The local node's identity.
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Registers a peer. Returns true only for a previously unknown peer;
    /// re-adding a known peer refreshes its last-seen time. Adding the local
    /// node itself is a no-op.
    pub fn add(&self, record: PeerRecord) -> bool {
        if record.id == self.local_id {
            debug!(peer_id = %record.id, "Ignoring self as peer");
            return false;
        }

        let mut peers = self.peers.write();
        match peers.get_mut(&record.id) {
            Some(existing) => {
                existing.touch();
                existing.active = true;
                false
            }
            None => {
                info!(peer = %record, "Peer joined");
                peers.insert(record.id.clone(), record);
                true
            }
        }
    }

    /// Looks a peer up by id.
    pub fn get(&self, id: &PeerId) -> Option<PeerRecord> {
        self.peers.read().get(id).cloned()
    }

    /// Removes a peer. Returns true when it existed.
    pub fn remove(&self, id: &PeerId) -> bool {
        let removed = self.peers.write().remove(id);
        if let Some(record) = &removed {
            info!(peer = %record, "Peer removed");
        }
        removed.is_some()
    }

    /// Snapshot of all peers currently marked active.
    pub fn active_peers(&self) -> Vec<PeerRecord> {
        self.peers.read().values().filter(|p| p.active).cloned().collect()
    }

    /// Snapshot of every known peer.
    pub fn all_peers(&self) -> Vec<PeerRecord> {
        self.peers.read().values().cloned().collect()
    }

    /// Marks a known peer active and refreshes its last-seen time.
    pub fn mark_active(&self, id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(id) {
            peer.active = true;
            peer.touch();
        }
    }

    /// Marks a known peer inactive after a failed send.
    pub fn mark_inactive(&self, id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(id) {
            peer.active = false;
            info!(peer = %peer, "Peer marked inactive");
        }
    }

    /// Number of peers currently marked active.
    pub fn active_count(&self) -> usize {
        self.peers.read().values().filter(|p| p.active).count()
    }

    /// Removes every peer not heard from within the liveness timeout.
    /// Returns the number removed.
    pub fn evict_stale(&self) -> usize {
        let now = now_millis();
        let mut peers = self.peers.write();
        let before = peers.len();
        peers.retain(|_, p| now.saturating_sub(p.last_seen_millis) <= self.peer_timeout_ms);
        let removed = before - peers.len();
        if removed > 0 {
            info!(removed, "Evicted stale peers");
        }
        removed
    }

    /// Spawns the background eviction sweep, one pass per `interval`.
    pub fn spawn_eviction(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a sweep only ever
            // runs a full interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.evict_stale();
            }
        })
    }
}
