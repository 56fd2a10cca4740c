//! Chain-of-responsibility plumbing for SMB messages: resources send
//! through their tree, trees through their session, sessions through the
//! client. Each handler stamps its identifiers and policy on the way down
//! and filters responses on the way up.

use std::sync::Arc;

use crate::packets::smb2::*;

/// An SMB2 message on its way to the server, with transport policy knobs.
#[derive(Debug)]
pub struct OutgoingMessage {
    pub message: PlainMessage,

    /// Ask the sender to wrap the message in a Transform envelope.
    /// Signing is requested via the header's signed flag instead.
    pub encrypt: bool,
}

impl OutgoingMessage {
    pub fn new(content: Content) -> OutgoingMessage {
        OutgoingMessage {
            message: PlainMessage::new(content),
            encrypt: false,
        }
    }
}

/// The result of sending a message: the ID assigned to it, used to claim
/// the matching response.
#[derive(Debug)]
pub struct SendMessageResult {
    pub msg_id: u64,
}

impl SendMessageResult {
    pub fn new(msg_id: u64) -> SendMessageResult {
        SendMessageResult { msg_id }
    }
}

/// How a response arrived on the wire.
#[derive(Debug, Default)]
pub struct MessageForm {
    pub encrypted: bool,
    pub signed: bool,
}

/// A parsed response, along with the raw plain bytes it was parsed from.
#[derive(Debug)]
pub struct IncomingMessage {
    pub message: PlainMessage,
    pub raw: Vec<u8>,
    pub form: MessageForm,
}

/// Options for receiving a message.
#[derive(Debug)]
pub struct ReceiveOptions<'a> {
    /// The accepted status(es) of the received message. Any other status
    /// is surfaced as an error.
    pub status: &'a [Status],

    /// If set, the received command is checked against this.
    pub cmd: Option<Command>,

    /// Only the response carrying this message ID is returned.
    pub msg_id: u64,
}

impl<'a> ReceiveOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: &'a [Status]) -> Self {
        self.status = status;
        self
    }

    pub fn with_cmd(mut self, cmd: Option<Command>) -> Self {
        self.cmd = cmd;
        self
    }

    pub fn with_msg_id_filter(mut self, msg_id: u64) -> Self {
        self.msg_id = msg_id;
        self
    }
}

impl<'a> Default for ReceiveOptions<'a> {
    fn default() -> Self {
        ReceiveOptions {
            status: &[Status::Success],
            cmd: None,
            msg_id: 0,
        }
    }
}

/// A handler in the send/receive chain. Implementations modify the message
/// and delegate to the next handler.
#[allow(async_fn_in_trait)]
pub trait MessageHandler {
    /// Sends a message to the server, returning the assigned message ID.
    async fn sendo(&self, msg: OutgoingMessage) -> crate::Result<SendMessageResult>;

    /// Receives the response selected by `options`.
    async fn recvo(&self, options: ReceiveOptions<'_>) -> crate::Result<IncomingMessage>;

    async fn send(&self, msg: Content) -> crate::Result<SendMessageResult> {
        self.sendo(OutgoingMessage::new(msg)).await
    }

    async fn sendo_recvo(
        &self,
        msg: OutgoingMessage,
        mut options: ReceiveOptions<'_>,
    ) -> crate::Result<IncomingMessage> {
        let send_result = self.sendo(msg).await?;
        options.msg_id = send_result.msg_id;
        self.recvo(options).await
    }

    async fn send_recvo(
        &self,
        msg: Content,
        options: ReceiveOptions<'_>,
    ) -> crate::Result<IncomingMessage> {
        self.sendo_recvo(OutgoingMessage::new(msg), options).await
    }

    async fn send_recv(&self, msg: Content) -> crate::Result<IncomingMessage> {
        let cmd = msg.associated_cmd();
        let options = ReceiveOptions::new().with_cmd(Some(cmd));
        self.send_recvo(msg, options).await
    }
}

/// A shared reference to a message handler, the link type of the chain.
pub struct HandlerReference<T: MessageHandler + ?Sized> {
    pub handler: Arc<T>,
}

impl<T: MessageHandler> HandlerReference<T> {
    pub fn new(handler: T) -> HandlerReference<T> {
        HandlerReference {
            handler: Arc::new(handler),
        }
    }
}

impl<T: MessageHandler> std::ops::Deref for HandlerReference<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.handler
    }
}

impl<T: MessageHandler> Clone for HandlerReference<T> {
    fn clone(&self) -> Self {
        HandlerReference {
            handler: self.handler.clone(),
        }
    }
}
