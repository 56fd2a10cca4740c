//! The authenticated session: NTLM setup orchestration, key derivation,
//! the encryption enablement policy, and logoff.

mod encryptor_decryptor;
mod signer;
mod state;

pub use encryptor_decryptor::{MessageDecryptor, MessageEncryptor};
pub use signer::MessageSigner;
pub use state::SessionInfo;

use std::sync::{Arc, Weak};

use tokio::sync::Mutex;

use crate::client::{ClientEvent, ClientMessageHandler, NegotiateInfo};
use crate::msg_handler::*;
use crate::ntlm::NtlmAuthenticator;
use crate::packets::smb2::*;
use crate::tree::{Tree, TreeMessageHandler};

type Upstream = HandlerReference<ClientMessageHandler>;

/// An authenticated session on a connection. Created by
/// [`Client::authenticate`][crate::Client::authenticate].
pub struct Session {
    handler: HandlerReference<SessionMessageHandler>,
}

impl Session {
    /// Runs the NTLM session setup exchange and builds the session.
    pub(crate) async fn setup(
        domain: &str,
        username: &str,
        password: &str,
        upstream: &Upstream,
    ) -> crate::Result<Session> {
        let neg_info = upstream.require_negotiate_info().await?;
        let config = upstream.config();

        log::debug!("Setting up session for user {}\\{}.", domain, username);
        let mut authenticator = NtlmAuthenticator::new(
            domain,
            username,
            password,
            &config.workstation_name(),
            config.force_ntlm_version,
        );

        // Type 1: expect the server challenge and the assigned session ID.
        let negotiate_token = authenticator.negotiate()?;
        let init_response = upstream
            .sendo_recvo(
                OutgoingMessage::new(SessionSetupRequest::new(negotiate_token).into()),
                ReceiveOptions::new()
                    .with_status(&[Status::MoreProcessingRequired])
                    .with_cmd(Some(Command::SessionSetup)),
            )
            .await?;
        let session_id = init_response.message.header.session_id;
        let challenge_token = match init_response.message.content {
            Content::SessionSetupResponse(response) => response.buffer,
            _ => {
                return Err(crate::Error::InvalidMessage(
                    "expected a session setup response".to_string(),
                ))
            }
        };

        // Type 2 in, type 3 out.
        let auth_output = authenticator.authenticate(&challenge_token)?;

        let session_state = Arc::new(Mutex::new(SessionInfo::new(session_id)));
        let handler = SessionMessageHandler::new(
            session_id,
            upstream.clone(),
            session_state.clone(),
            neg_info.clone(),
        );

        // Derive keys before sending the final token, so the server's
        // signed (or encrypted) follow-ups can be verified right away.
        // SMB 2.x dialects and NTLMv1 leave the session keyless.
        if neg_info.dialect.is_smb3() {
            if let Some(session_key) = &auth_output.session_key {
                session_state.lock().await.setup_keys(session_key)?;
            }
        }
        let worker = upstream.worker().await?;
        worker
            .transformer()
            .session_started(session_state.clone())
            .await;

        let setup_result = handler
            .sendo_recvo(
                OutgoingMessage::new(SessionSetupRequest::new(auth_output.buffer).into()),
                ReceiveOptions::new()
                    .with_status(&[Status::Success])
                    .with_cmd(Some(Command::SessionSetup)),
            )
            .await;

        let final_response = match setup_result {
            Ok(response) => response,
            Err(e) => {
                // The server never accepted the session; unregister it.
                worker.transformer().session_ended(session_id).await.ok();
                return Err(e);
            }
        };

        let session_flags = match final_response.message.content {
            Content::SessionSetupResponse(response) => response.session_flags,
            _ => {
                return Err(crate::Error::InvalidMessage(
                    "expected a session setup response".to_string(),
                ))
            }
        };

        let server_supports_encryption =
            neg_info.dialect.is_smb3() && neg_info.capabilities.encryption();
        session_state
            .lock()
            .await
            .ready(session_flags, server_supports_encryption)?;

        log::info!("Session {} authenticated.", session_id);
        upstream
            .events_sender()
            .send(ClientEvent::SessionAuthenticated { session_id })
            .ok();

        Ok(Session { handler })
    }

    pub fn session_id(&self) -> u64 {
        self.handler.session_id
    }

    /// Connects to a share by name. If the server denies access while the
    /// session holds keys with encryption off, encryption is enabled and
    /// the connect retried once.
    pub async fn tree_connect(&self, share: &str) -> crate::Result<Tree> {
        let path = self.handler.upstream.unc_share_path(share).await?;

        let first_attempt = Tree::connect(share, &path, &self.handler).await;
        let tree = match first_attempt {
            Ok(tree) => tree,
            Err(e) if e.status() == Some(Status::U32_ACCESS_DENIED) => {
                if !self.handler.session_state.lock().await.can_enable_encryption() {
                    return Err(e);
                }
                log::info!(
                    "Tree connect to {} denied; retrying with encryption enabled.",
                    share
                );
                self.handler.enable_encryption().await?;
                Tree::connect(share, &path, &self.handler).await?
            }
            Err(e) => return Err(e),
        };

        self.handler
            .trees
            .lock()
            .await
            .push(Arc::downgrade(&tree.handler().handler));
        Ok(tree)
    }

    /// Disconnects every tree and logs the session off. Idempotent.
    pub async fn logoff(&self) -> crate::Result<()> {
        self.handler.logoff().await
    }

    pub(crate) fn handler(&self) -> &HandlerReference<SessionMessageHandler> {
        &self.handler
    }
}

/// The session's link in the handler chain: stamps the session ID and the
/// signing/encryption policy on outgoing messages.
pub struct SessionMessageHandler {
    session_id: u64,
    upstream: Upstream,
    session_state: Arc<Mutex<SessionInfo>>,
    neg_info: Arc<NegotiateInfo>,
    /// Trees connected through this session.
    trees: Mutex<Vec<Weak<TreeMessageHandler>>>,
}

impl SessionMessageHandler {
    pub(crate) fn new(
        session_id: u64,
        upstream: Upstream,
        session_state: Arc<Mutex<SessionInfo>>,
        neg_info: Arc<NegotiateInfo>,
    ) -> HandlerReference<SessionMessageHandler> {
        HandlerReference::new(SessionMessageHandler {
            session_id,
            upstream,
            session_state,
            neg_info,
            trees: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn negotiate_info(&self) -> &Arc<NegotiateInfo> {
        &self.neg_info
    }

    pub(crate) fn events_sender(&self) -> &tokio::sync::broadcast::Sender<ClientEvent> {
        self.upstream.events_sender()
    }

    pub(crate) async fn events_receiver(
        &self,
    ) -> tokio::sync::broadcast::Receiver<ClientEvent> {
        self.upstream.events_sender().subscribe()
    }

    /// Turns on Transform encryption for all further session traffic.
    pub(crate) async fn enable_encryption(&self) -> crate::Result<()> {
        self.session_state.lock().await.enable_encryption()
    }

    /// Whether the tree layer must ensure encryption (encrypt-data share
    /// flag).
    pub(crate) async fn ensure_encryption(&self) -> crate::Result<()> {
        let mut state = self.session_state.lock().await;
        if !state.should_encrypt() {
            state.enable_encryption()?;
        }
        Ok(())
    }

    pub(crate) async fn logoff(&self) -> crate::Result<()> {
        {
            let state = self.session_state.lock().await;
            if state.is_invalid() {
                log::trace!("Session {} already logged off.", self.session_id);
                return Ok(());
            }
        }

        log::debug!("Logging off session {}.", self.session_id);

        // Children first: disconnect every tree still alive.
        let trees: Vec<_> = self.trees.lock().await.drain(..).collect();
        for tree in trees {
            if let Some(tree) = tree.upgrade() {
                if let Err(e) = tree.disconnect().await {
                    log::debug!("Tree disconnect during logoff failed: {}", e);
                }
            }
        }

        let _response = self
            .send_recv(LogoffRequest::default().into())
            .await?;

        // Unregister from the transformer; this also invalidates the state.
        self.upstream
            .worker()
            .await?
            .transformer()
            .session_ended(self.session_id)
            .await?;

        log::info!("Session {} logged off.", self.session_id);
        self.upstream
            .events_sender()
            .send(ClientEvent::SessionLoggedOff {
                session_id: self.session_id,
            })
            .ok();
        Ok(())
    }
}

impl MessageHandler for SessionMessageHandler {
    async fn sendo(&self, mut msg: OutgoingMessage) -> crate::Result<SendMessageResult> {
        {
            let session = self.session_state.lock().await;
            if session.is_invalid() {
                return Err(crate::Error::InvalidState(
                    "session is logged off".to_string(),
                ));
            }
            if session.should_encrypt() {
                msg.encrypt = true;
            } else if session.is_ready() && session.has_keys() {
                msg.message.header.flags = msg.message.header.flags.with_signed(true);
            }
        }
        msg.message.header.session_id = self.session_id;
        self.upstream.sendo(msg).await
    }

    async fn recvo(&self, options: ReceiveOptions<'_>) -> crate::Result<IncomingMessage> {
        let incoming = self.upstream.recvo(options).await?;
        if incoming.message.header.session_id != self.session_id {
            return Err(crate::Error::InvalidMessage(
                "response does not belong to this session".to_string(),
            ));
        }
        Ok(incoming)
    }
}
