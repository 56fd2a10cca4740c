//! The transport client: one TCP connection, message ID allocation, the
//! dialect negotiation state, and the event channel.

pub mod config;
pub mod netbios_client;
pub mod transformer;
pub mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, Mutex, RwLock};

use crate::msg_handler::*;
use crate::packets::fscc::FileNotifyInformation;
use crate::packets::guid::Guid;
use crate::packets::smb2::*;
use crate::session::{Session, SessionMessageHandler};

pub use config::ClientConfig;
pub use transformer::{TransformError, TransformPhase};

use netbios_client::NetBiosClient;
use worker::ConnectionWorker;

/// Events emitted by the client and the layers above it.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A ChangeNotify delivery. `message_id` identifies the watch request
    /// it answers.
    ChangeNotify {
        message_id: u64,
        notifications: Arc<Vec<FileNotifyInformation>>,
    },
    SessionAuthenticated { session_id: u64 },
    SessionLoggedOff { session_id: u64 },
    TreeConnected { tree_id: u32, share: String },
    TreeDisconnected { tree_id: u32 },
    HandleOpened { name: String },
    HandleClosed { name: String },
    /// A transport-level failure on the receive path.
    Error { message: String },
    /// The server closed the connection.
    Disconnected,
}

/// The outcome of dialect negotiation, fixed for the connection lifetime.
#[derive(Debug, Clone)]
pub struct NegotiateInfo {
    pub dialect: Dialect,
    pub capabilities: GlobalCapabilities,
    pub security_mode: NegotiateSecurityMode,
    pub max_transact_size: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
    pub server_guid: Guid,
}

/// An SMB2/SMB3 client over a single TCP connection.
///
/// ```no_run
/// # async fn example() -> smb2::Result<()> {
/// let client = smb2::Client::new(Default::default());
/// client.connect("fileserver.example.com").await?;
/// let session = client.authenticate("EXAMPLE", "alice", "hunter2").await?;
/// let tree = session.tree_connect("Public").await?;
/// let data = tree.read_file("docs\\readme.txt").await?;
/// # client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    handler: HandlerReference<ClientMessageHandler>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Client {
        Client {
            handler: HandlerReference::new(ClientMessageHandler::new(config)),
        }
    }

    /// Establishes the TCP connection and negotiates the dialect.
    /// `server` is a host name or address, optionally with a `:port`
    /// suffix overriding the configured port.
    pub async fn connect(&self, server: &str) -> crate::Result<()> {
        let (host, port) = self.handler.parse_server_address(server);
        let address = format!("{}:{}", host, port);

        {
            if self.handler.worker.read().await.is_some() {
                return Err(crate::Error::InvalidState(
                    "client is already connected".to_string(),
                ));
            }
        }

        log::debug!("Connecting to {}.", address);
        let netbios =
            NetBiosClient::connect(&address, self.handler.config.connect_timeout).await?;
        let worker = ConnectionWorker::start(
            netbios,
            self.handler.config.request_timeout,
            self.handler.events.clone(),
        )
        .await?;
        {
            *self.handler.worker.write().await = Some(worker);
            *self.handler.server.write().await = Some((host, port));
        }
        log::info!("Connected to {}.", address);

        self.negotiate().await
    }

    /// Negotiates the SMB dialect and records the server's capabilities.
    async fn negotiate(&self) -> crate::Result<()> {
        log::debug!("Negotiating SMB2.");
        let client_guid = self.handler.client_guid;
        let response = self
            .handler
            .send_recv(NegotiateRequest::new(client_guid).into())
            .await?;

        let negotiate_response = match response.message.content {
            Content::NegotiateResponse(response) => response,
            _ => {
                return Err(crate::Error::InvalidMessage(
                    "expected a negotiate response".to_string(),
                ))
            }
        };

        let info = NegotiateInfo {
            dialect: negotiate_response.dialect_revision,
            capabilities: negotiate_response.capabilities,
            security_mode: negotiate_response.security_mode,
            max_transact_size: negotiate_response.max_transact_size,
            max_read_size: negotiate_response.max_read_size,
            max_write_size: negotiate_response.max_write_size,
            server_guid: negotiate_response.server_guid,
        };
        log::info!(
            "Negotiated dialect {:?}, encryption supported: {}.",
            info.dialect,
            info.capabilities.encryption()
        );
        *self.handler.negotiate_info.write().await = Some(Arc::new(info));
        Ok(())
    }

    /// Authenticates a user, producing a new [`Session`].
    pub async fn authenticate(
        &self,
        domain: &str,
        username: &str,
        password: &str,
    ) -> crate::Result<Session> {
        let session = Session::setup(domain, username, password, &self.handler).await?;
        self.handler
            .sessions
            .lock()
            .await
            .push(Arc::downgrade(&session.handler().handler));
        Ok(session)
    }

    /// Sends an Echo request and waits for its reply.
    pub async fn echo(&self) -> crate::Result<()> {
        log::debug!("Sending echo.");
        self.handler.send_recv(EchoRequest::default().into()).await?;
        Ok(())
    }

    /// Negotiation results, once [`Client::connect`] has completed.
    pub async fn negotiate_info(&self) -> Option<Arc<NegotiateInfo>> {
        self.handler.negotiate_info.read().await.clone()
    }

    /// Subscribes to client events (change notifications, lifecycle
    /// transitions, disconnection).
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.handler.events.subscribe()
    }

    /// Logs off every session and closes the connection. Idempotent.
    pub async fn close(&self) {
        log::debug!("Closing client.");
        let sessions: Vec<_> = self.handler.sessions.lock().await.drain(..).collect();
        for session in sessions {
            if let Some(session) = session.upgrade() {
                if let Err(e) = session.logoff().await {
                    log::debug!("Session logoff during close failed: {}", e);
                }
            }
        }

        let worker = { self.handler.worker.write().await.take() };
        if let Some(worker) = worker {
            worker.stop().await;
        }
        log::info!("Client closed.");
    }
}

/// The bottom-of-chain message handler: assigns message IDs and passes
/// frames to the worker.
pub struct ClientMessageHandler {
    client_guid: Guid,
    config: ClientConfig,
    worker: RwLock<Option<Arc<ConnectionWorker>>>,
    /// Strictly monotonic, starting at zero, never reused.
    next_message_id: AtomicU64,
    negotiate_info: RwLock<Option<Arc<NegotiateInfo>>>,
    events: broadcast::Sender<ClientEvent>,
    sessions: Mutex<Vec<Weak<SessionMessageHandler>>>,
    server: RwLock<Option<(String, u16)>>,
}

impl ClientMessageHandler {
    const EVENT_CHANNEL_CAPACITY: usize = 256;

    fn new(config: ClientConfig) -> ClientMessageHandler {
        let (events, _) = broadcast::channel(Self::EVENT_CHANNEL_CAPACITY);
        ClientMessageHandler {
            client_guid: Guid::gen(),
            config,
            worker: RwLock::new(None),
            next_message_id: AtomicU64::new(0),
            negotiate_info: RwLock::new(None),
            events,
            sessions: Mutex::new(Vec::new()),
            server: RwLock::new(None),
        }
    }

    fn parse_server_address(&self, server: &str) -> (String, u16) {
        match server.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (server.to_string(), self.config.port),
            },
            None => (server.to_string(), self.config.port),
        }
    }

    pub(crate) async fn worker(&self) -> crate::Result<Arc<ConnectionWorker>> {
        self.worker
            .read()
            .await
            .clone()
            .ok_or(crate::Error::NotConnected)
    }

    pub(crate) async fn require_negotiate_info(&self) -> crate::Result<Arc<NegotiateInfo>> {
        self.negotiate_info
            .read()
            .await
            .clone()
            .ok_or_else(|| crate::Error::InvalidState("connection is not negotiated".to_string()))
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn events_sender(&self) -> &broadcast::Sender<ClientEvent> {
        &self.events
    }

    /// The UNC path of a share on this connection: `\\host:port\share`.
    pub(crate) async fn unc_share_path(&self, share: &str) -> crate::Result<String> {
        let server = self.server.read().await;
        let (host, port) = server.as_ref().ok_or(crate::Error::NotConnected)?;
        Ok(format!(r"\\{}:{}\{}", host, port, share))
    }
}

impl MessageHandler for ClientMessageHandler {
    async fn sendo(&self, mut msg: OutgoingMessage) -> crate::Result<SendMessageResult> {
        let worker = self.worker().await?;
        msg.message.header.message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        worker.send(msg).await
    }

    async fn recvo(&self, options: ReceiveOptions<'_>) -> crate::Result<IncomingMessage> {
        let worker = self.worker().await?;

        let msg = worker.receive(options.msg_id).await?;

        if !msg.message.header.flags.server_to_redir() {
            return Err(crate::Error::InvalidMessage(
                "received a message that is not a response".to_string(),
            ));
        }

        if let Some(cmd) = options.cmd {
            if msg.message.header.command != cmd {
                return Err(crate::Error::UnexpectedCommand(msg.message.header.command));
            }
        }

        let status = msg.message.header.status;
        if !options.status.iter().any(|s| *s as u32 == status) {
            if matches!(msg.message.content, Content::ErrorResponse(_)) {
                return Err(crate::Error::ReceivedErrorMessage(status));
            }
            return Err(crate::Error::UnexpectedMessageStatus(status));
        }

        Ok(msg)
    }
}
