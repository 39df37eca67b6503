//! Inbound message handlers.
//!
//! Each handler is a small struct holding exactly the capabilities its
//! message type needs. `register_all` wires them into the transport; the
//! handler map is read-only after that.

use std::sync::Arc;

use drift_core::PeerId;
use drift_ledger::Ledger;
use drift_net::{FramedTransport, MessageHandler, PeerRecord, PeerRegistry};
use drift_proto::{Message, MessagePayload, MessageType};
use drift_store::ChunkStore;
use tracing::{debug, warn};

use crate::peers::PeerClient;

/// JOIN: register the announcer; for a new peer, asynchronously push our
/// peer list and run a ledger exchange toward it.
struct JoinHandler {
    registry: Arc<PeerRegistry>,
    client: Arc<PeerClient>,
}

#[async_trait::async_trait]
impl MessageHandler for JoinHandler {
    async fn handle(&self, message: Message) -> Option<Message> {
        let MessagePayload::Join { host, port } = message.payload else {
            return None;
        };

        let peer = PeerRecord::new(message.from, host, port);
        let is_new = self.registry.add(peer.clone());
        if is_new {
            let client = Arc::clone(&self.client);
            tokio::spawn(async move {
                client.share_peer_list(&peer).await;
                client.sync_ledger_with(&peer).await;
            });
        }

        Some(self.client.message(MessagePayload::JoinResponse { success: true }))
    }
}

/// PEER_LIST: merge the advertised peers; self-exclusion happens in the
/// registry.
struct PeerListHandler {
    registry: Arc<PeerRegistry>,
}

#[async_trait::async_trait]
impl MessageHandler for PeerListHandler {
    async fn handle(&self, message: Message) -> Option<Message> {
        let MessagePayload::PeerList { peers } = message.payload else {
            return None;
        };
        debug!(count = peers.len(), "Received peer list");
        for addr in peers {
            self.registry.add(PeerRecord::new(addr.id, addr.host, addr.port));
        }
        None
    }
}

/// FILE_REQUEST: serve a chunk from the local cache, or decline.
struct FileRequestHandler {
    local_id: PeerId,
    store: Arc<ChunkStore>,
}

#[async_trait::async_trait]
impl MessageHandler for FileRequestHandler {
    async fn handle(&self, message: Message) -> Option<Message> {
        let MessagePayload::FileRequest { file_hash, chunk_id } = message.payload else {
            return None;
        };

        let payload = match self.store.get_chunk(&file_hash, chunk_id) {
            Some(chunk) => {
                debug!(file_hash = %file_hash.short(), chunk_id, "Serving chunk");
                MessagePayload::FileResponse {
                    file_hash,
                    chunk_id,
                    success: true,
                    data: Some(chunk.data),
                    total_chunks: Some(chunk.total_chunks),
                    error: None,
                }
            }
            None => MessagePayload::FileResponse {
                file_hash,
                chunk_id,
                success: false,
                data: None,
                total_chunks: None,
                error: Some("chunk not found".to_string()),
            },
        };
        Some(Message::new(self.local_id.clone(), payload))
    }
}

/// LEDGER_SYNC: answer with every block sealed after the requester's hash.
struct LedgerSyncHandler {
    local_id: PeerId,
    ledger: Arc<Ledger>,
}

#[async_trait::async_trait]
impl MessageHandler for LedgerSyncHandler {
    async fn handle(&self, message: Message) -> Option<Message> {
        let MessagePayload::LedgerSync { last_block_hash } = message.payload else {
            return None;
        };

        let blocks = self.ledger.get_blocks_since(&last_block_hash);
        debug!(count = blocks.len(), "Answering ledger sync");
        let blocks_count = blocks.len() as u32;
        Some(Message::new(
            self.local_id.clone(),
            MessagePayload::LedgerSyncResponse {
                blocks,
                blocks_count,
            },
        ))
    }
}

/// LEDGER_ENTRY: apply one gossiped block; invalid blocks are dropped with
/// a warning and never abort anything.
struct LedgerEntryHandler {
    ledger: Arc<Ledger>,
}

#[async_trait::async_trait]
impl MessageHandler for LedgerEntryHandler {
    async fn handle(&self, message: Message) -> Option<Message> {
        let MessagePayload::LedgerEntry { block } = message.payload else {
            return None;
        };
        let block_id = block.block_id.clone();
        if !self.ledger.add_block(block) {
            warn!(block_id = %block_id, "Dropped gossiped block");
        }
        None
    }
}

/// PING → PONG.
struct PingHandler {
    local_id: PeerId,
}

#[async_trait::async_trait]
impl MessageHandler for PingHandler {
    async fn handle(&self, _message: Message) -> Option<Message> {
        Some(Message::new(self.local_id.clone(), MessagePayload::Pong))
    }
}

/// Registers every protocol handler on the transport.
pub fn register_all(
    transport: &FramedTransport,
    registry: Arc<PeerRegistry>,
    ledger: Arc<Ledger>,
    store: Arc<ChunkStore>,
    client: Arc<PeerClient>,
) {
    let local_id = transport.local_id().clone();

    transport.register_handler(
        MessageType::Join,
        Arc::new(JoinHandler {
            registry: Arc::clone(&registry),
            client,
        }),
    );
    transport.register_handler(MessageType::PeerList, Arc::new(PeerListHandler { registry }));
    transport.register_handler(
        MessageType::FileRequest,
        Arc::new(FileRequestHandler {
            local_id: local_id.clone(),
            store,
        }),
    );
    transport.register_handler(
        MessageType::LedgerSync,
        Arc::new(LedgerSyncHandler {
            local_id: local_id.clone(),
            ledger: Arc::clone(&ledger),
        }),
    );
    transport.register_handler(MessageType::LedgerEntry, Arc::new(LedgerEntryHandler { ledger }));
    transport.register_handler(MessageType::Ping, Arc::new(PingHandler { local_id }));
}
