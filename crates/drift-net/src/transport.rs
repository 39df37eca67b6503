//! Length-prefixed message transport over TCP.
//!
//! Connections are single-shot: the dialer writes one frame, optionally
//! reads one response frame, and both sides close. The listen side
//! dispatches each inbound message to the handler registered for its type;
//! every accepted connection is served on its own task.
//!
//! The transport synchronizes only the handler map and the socket
//! lifecycle. Handlers run concurrently and own their state protection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use drift_core::{PeerId, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, WRITE_TIMEOUT_SECS};
use drift_proto::{decode_payload, encode_frame, Message, MessagePayload, MessageType, MAX_FRAME_LEN};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::registry::PeerRegistry;
use crate::{NetError, PeerRecord};

/// Handles one inbound message; a `Some` return is written back to the
/// sender as the single response frame.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes `message`, optionally producing a response.
    async fn handle(&self, message: Message) -> Option<Message>;
}

/// State shared with the accept loop and per-connection tasks.
struct Inner {
    local_id: PeerId,
    registry: Arc<PeerRegistry>,
    /// Populated during node init, read-only afterwards.
    handlers: RwLock<HashMap<MessageType, Arc<dyn MessageHandler>>>,
}

impl Inner {
    /// Serves one accepted connection: read one frame, dispatch, optionally
    /// write one response frame.
    async fn serve_connection(&self, mut stream: TcpStream) -> Result<(), NetError> {
        let message = timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            read_frame(&mut stream),
        )
        .await
        .map_err(|_| NetError::ReadTimeout)??;

        // Any inbound exchange counts as contact for liveness.
        if message.from != self.local_id {
            self.registry.mark_active(&message.from);
        }

        let message_type = message.message_type();
        let handler = self.handlers.read().get(&message_type).cloned();
        let response = match handler {
            Some(handler) => handler.handle(message).await,
            None => {
                warn!(message_type = %message_type, "No handler registered");
                None
            }
        };

        if let Some(response) = response {
            let frame = encode_frame(&response)?;
            timeout(
                Duration::from_secs(WRITE_TIMEOUT_SECS),
                stream.write_all(&frame),
            )
            .await
            .map_err(|_| NetError::WriteTimeout)??;
        }
        Ok(())
    }

    /// Opens a connection, writes one frame, and reads the response frame
    /// for response-expecting message types.
    async fn dial(&self, host: &str, port: u16, message: Message) -> Result<Option<Message>, NetError> {
        let mut stream = timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| NetError::ConnectTimeout)??;

        let expects_response = message.message_type().expects_response();
        let frame = encode_frame(&message)?;
        timeout(
            Duration::from_secs(WRITE_TIMEOUT_SECS),
            stream.write_all(&frame),
        )
        .await
        .map_err(|_| NetError::WriteTimeout)??;

        if !expects_response {
            return Ok(None);
        }

        let response = timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            read_frame(&mut stream),
        )
        .await
        .map_err(|_| NetError::ReadTimeout)??;
        Ok(Some(response))
    }

    /// Dial wrapper that maintains the destination's liveness state.
    async fn send(&self, peer: &PeerRecord, message: Message) -> Option<Message> {
        match self.dial(&peer.host, peer.port, message).await {
            Ok(response) => {
                self.registry.mark_active(&peer.id);
                response
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "Send failed");
                self.registry.mark_inactive(&peer.id);
                None
            }
        }
    }
}

/// The framed TCP transport.
pub struct FramedTransport {
    inner: Arc<Inner>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl FramedTransport {
    /// Creates a transport for the node identified by `local_id`.
    pub fn new(local_id: PeerId, registry: Arc<PeerRegistry>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                local_id,
                registry,
                handlers: RwLock::new(HashMap::new()),
            }),
            accept_task: Mutex::new(None),
            shutdown,
            local_addr: Mutex::new(None),
        }
    }

    /// The local node's identity.
    pub fn local_id(&self) -> &PeerId {
        &self.inner.local_id
    }

    /// The bound listen address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Registers the handler for one message type. Call before `start`.
    pub fn register_handler(&self, message_type: MessageType, handler: Arc<dyn MessageHandler>) {
        self.inner.handlers.write().insert(message_type, handler);
    }

    /// Builds a message from the local node.
    pub fn message(&self, payload: MessagePayload) -> Message {
        Message::new(self.inner.local_id.clone(), payload)
    }

    /// Binds the listen socket and spawns the accept loop. Returns the bound
    /// address (useful when binding port 0).
    pub async fn start(&self, bind: SocketAddr) -> Result<SocketAddr, NetError> {
        let listener = TcpListener::bind(bind).await?;
        let local = listener.local_addr()?;
        *self.local_addr.lock() = Some(local);

        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.shutdown.subscribe();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote)) => {
                            let inner = Arc::clone(&inner);
                            tokio::spawn(async move {
                                if let Err(e) = inner.serve_connection(stream).await {
                                    debug!(remote = %remote, error = %e, "Connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Accept failed");
                            break;
                        }
                    },
                }
            }
        });
        *self.accept_task.lock() = Some(task);

        info!(addr = %local, "Transport listening");
        Ok(local)
    }

    /// Stops the accept loop. In-flight connections may observe closed
    /// sockets.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        info!("Transport stopped");
    }

    /// Sends a message to a known peer. A failure marks the peer inactive
    /// and yields `None`; a success refreshes its liveness. Response-less
    /// message types yield `None` on success as well.
    pub async fn send(&self, peer: &PeerRecord, message: Message) -> Option<Message> {
        self.inner.send(peer, message).await
    }

    /// Dials an endpoint not (yet) in the registry, such as the bootstrap
    /// peer.
    pub async fn dial(
        &self,
        host: &str,
        port: u16,
        message: Message,
    ) -> Result<Option<Message>, NetError> {
        self.inner.dial(host, port, message).await
    }

    /// Sends a message to every active peer, one independent fire-and-forget
    /// task per destination. Per-peer failures do not affect the others; no
    /// ordering guarantee across peers.
    pub fn broadcast(&self, message: Message) {
        let peers = self.inner.registry.active_peers();
        debug!(
            message_type = %message.message_type(),
            peers = peers.len(),
            "Broadcasting"
        );
        for peer in peers {
            let inner = Arc::clone(&self.inner);
            let message = message.clone();
            tokio::spawn(async move {
                inner.send(&peer, message).await;
            });
        }
    }
}

/// Reads one frame: 4-byte big-endian length prefix, then the payload.
async fn read_frame(stream: &mut TcpStream) -> Result<Message, NetError> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(NetError::OversizedFrame(len));
    }

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    Ok(decode_payload(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PingHandler {
        local_id: PeerId,
    }

    #[async_trait::async_trait]
    impl MessageHandler for PingHandler {
        async fn handle(&self, _message: Message) -> Option<Message> {
            Some(Message::new(self.local_id.clone(), MessagePayload::Pong))
        }
    }

    fn transport(id: &str) -> (Arc<FramedTransport>, Arc<PeerRegistry>) {
        let local_id = PeerId::from(id);
        let registry = Arc::new(PeerRegistry::new(local_id.clone()));
        let transport = Arc::new(FramedTransport::new(local_id, Arc::clone(&registry)));
        (transport, registry)
    }

    #[tokio::test]
    async fn test_ping_pong_roundtrip() {
        let (server, _) = transport("serverid");
        server.register_handler(
            MessageType::Ping,
            Arc::new(PingHandler {
                local_id: server.local_id().clone(),
            }),
        );
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let (client, _) = transport("clientid");
        let response = client
            .dial(
                "127.0.0.1",
                addr.port(),
                client.message(MessagePayload::Ping),
            )
            .await
            .unwrap()
            .expect("ping expects a pong");
        assert_eq!(response.message_type(), MessageType::Pong);
        assert_eq!(response.from, PeerId::from("serverid"));

        server.stop();
    }

    #[tokio::test]
    async fn test_no_response_for_fire_and_forget() {
        let (server, _) = transport("serverid");
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let (client, _) = transport("clientid");
        let response = client
            .dial(
                "127.0.0.1",
                addr.port(),
                client.message(MessagePayload::PeerList { peers: Vec::new() }),
            )
            .await
            .unwrap();
        assert!(response.is_none());

        server.stop();
    }

    #[tokio::test]
    async fn test_send_failure_marks_peer_inactive() {
        let (client, registry) = transport("clientid");
        let peer = PeerRecord::new(PeerId::from("deadpeer"), "127.0.0.1", 1);
        registry.add(peer.clone());
        assert_eq!(registry.active_count(), 1);

        let response = client.send(&peer, client.message(MessagePayload::Ping)).await;
        assert!(response.is_none());
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_inbound_contact_refreshes_liveness() {
        let (server, server_registry) = transport("serverid");
        server.register_handler(
            MessageType::Ping,
            Arc::new(PingHandler {
                local_id: server.local_id().clone(),
            }),
        );
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();

        // The client is known to the server but currently inactive.
        server_registry.add(PeerRecord::new(PeerId::from("clientid"), "127.0.0.1", 9));
        server_registry.mark_inactive(&PeerId::from("clientid"));
        assert_eq!(server_registry.active_count(), 0);

        let (client, _) = transport("clientid");
        client
            .dial("127.0.0.1", addr.port(), client.message(MessagePayload::Ping))
            .await
            .unwrap();

        assert_eq!(server_registry.active_count(), 1);
        server.stop();
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let (server, _) = transport("serverid");
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();
        server.stop();
        // Give the accept loop a moment to wind down.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (client, _) = transport("clientid");
        let result = client
            .dial("127.0.0.1", addr.port(), client.message(MessagePayload::Ping))
            .await;
        assert!(result.is_err() || result.unwrap().is_none());
    }
}
