//! Client-side peer operations: joining the overlay, requesting chunks,
//! and exchanging ledger blocks.

use std::sync::Arc;

use drift_core::{now_millis, FileHash};
use drift_ledger::Ledger;
use drift_net::{FramedTransport, PeerRecord, PeerRegistry};
use drift_proto::{Block, Message, MessagePayload, MessageType};
use drift_store::CacheChunk;
use tracing::{debug, info, warn};

/// Outbound half of the peer protocol. Holds only the capabilities it
/// needs; handlers own the inbound half.
pub struct PeerClient {
    transport: Arc<FramedTransport>,
    registry: Arc<PeerRegistry>,
    ledger: Arc<Ledger>,
}

impl PeerClient {
    /// Creates the client.
    pub fn new(
        transport: Arc<FramedTransport>,
        registry: Arc<PeerRegistry>,
        ledger: Arc<Ledger>,
    ) -> Self {
        Self {
            transport,
            registry,
            ledger,
        }
    }

    /// Joins the overlay through a bootstrap endpoint: announces our
    /// advertised address, registers the responder, and pulls the blocks we
    /// are missing. Returns true when the bootstrap peer accepted the join.
    pub async fn join_network(
        &self,
        host: &str,
        port: u16,
        advertise_host: &str,
        advertise_port: u16,
    ) -> bool {
        let join = self.transport.message(MessagePayload::Join {
            host: advertise_host.to_string(),
            port: advertise_port,
        });

        let response = match self.transport.dial(host, port, join).await {
            Ok(Some(response)) => response,
            Ok(None) | Err(_) => {
                warn!(host, port, "Bootstrap peer did not answer join");
                return false;
            }
        };

        match response.payload {
            MessagePayload::JoinResponse { success: true } => {
                let peer = PeerRecord::new(response.from, host, port);
                self.registry.add(peer.clone());
                info!(peer = %peer, "Joined the overlay");
                // The bootstrap peer pushes its peer list and pulls our
                // blocks; our side of convergence is pulling its blocks.
                self.sync_ledger_with(&peer).await;
                true
            }
            _ => {
                warn!(host, port, "Bootstrap peer declined join");
                false
            }
        }
    }

    /// Requests one chunk from one peer. Returns `None` on transport
    /// failure, decline, or a malformed answer.
    pub async fn request_chunk(
        &self,
        peer: &PeerRecord,
        file_hash: &FileHash,
        chunk_id: u32,
    ) -> Option<CacheChunk> {
        let request = self.transport.message(MessagePayload::FileRequest {
            file_hash: file_hash.clone(),
            chunk_id,
        });
        let response = self.transport.send(peer, request).await?;

        match response.payload {
            MessagePayload::FileResponse {
                success: true,
                data: Some(data),
                total_chunks: Some(total_chunks),
                ..
            } => {
                debug!(
                    peer_id = %response.from,
                    file_hash = %file_hash.short(),
                    chunk_id,
                    "Fetched chunk from peer"
                );
                Some(CacheChunk {
                    file_hash: file_hash.clone(),
                    chunk_id,
                    total_chunks,
                    data,
                    owner_peer_id: response.from,
                    timestamp: now_millis(),
                })
            }
            MessagePayload::FileResponse { error, .. } => {
                debug!(
                    peer = %peer,
                    file_hash = %file_hash.short(),
                    chunk_id,
                    error = error.as_deref().unwrap_or("unknown"),
                    "Peer declined chunk request"
                );
                None
            }
            _ => {
                warn!(peer = %peer, "Unexpected answer to chunk request");
                None
            }
        }
    }

    /// Pulls blocks sealed after our last known hash from `peer` and applies
    /// them. Returns the number of blocks accepted.
    pub async fn sync_ledger_with(&self, peer: &PeerRecord) -> usize {
        let request = self.transport.message(MessagePayload::LedgerSync {
            last_block_hash: self.ledger.last_block().block_hash,
        });
        let Some(response) = self.transport.send(peer, request).await else {
            return 0;
        };

        let MessagePayload::LedgerSyncResponse {
            blocks,
            blocks_count,
        } = response.payload
        else {
            warn!(peer = %peer, "Unexpected answer to ledger sync");
            return 0;
        };

        let mut added = 0;
        for block in blocks {
            if self.ledger.add_block(block) {
                added += 1;
            }
        }
        info!(peer = %peer, added, offered = blocks_count, "Ledger sync complete");
        added
    }

    /// Sends our active peer list to `peer`.
    pub async fn share_peer_list(&self, peer: &PeerRecord) {
        let peers: Vec<_> = self.registry.active_peers().iter().map(PeerRecord::addr).collect();
        let count = peers.len();
        let message = self.transport.message(MessagePayload::PeerList { peers });
        self.transport.send(peer, message).await;
        debug!(peer = %peer, count, "Shared peer list");
    }

    /// Gossips a freshly sealed block to every active peer.
    pub fn propagate_block(&self, block: Block) {
        debug!(block_id = %block.block_id, "Propagating sealed block");
        self.transport
            .broadcast(self.transport.message(MessagePayload::LedgerEntry { block }));
    }

    /// Probes a peer with PING. True iff a PONG came back.
    pub async fn is_peer_alive(&self, peer: &PeerRecord) -> bool {
        match self.transport.send(peer, self.transport.message(MessagePayload::Ping)).await {
            Some(response) => response.message_type() == MessageType::Pong,
            None => false,
        }
    }

    /// Builds an outbound message from the local identity.
    pub fn message(&self, payload: MessagePayload) -> Message {
        self.transport.message(payload)
    }
}
