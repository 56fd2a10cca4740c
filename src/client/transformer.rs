//! Transforms messages between their in-memory and on-the-wire forms:
//! serialization, AES-CMAC signing and verification, and Transform-envelope
//! encryption and decryption, dispatched to the owning session by session
//! ID.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use binrw::prelude::*;
use tokio::sync::Mutex;

use crate::msg_handler::{IncomingMessage, MessageForm, OutgoingMessage};
use crate::packets::netbios::is_transform_header;
use crate::packets::smb2::*;
use crate::session::SessionInfo;

#[derive(Debug, Default)]
pub struct Transformer {
    /// Sessions able to sign/encrypt, keyed by session ID.
    sessions: Mutex<HashMap<u64, Arc<Mutex<SessionInfo>>>>,
}

impl Transformer {
    /// Registers a session so its inbound messages can be verified and
    /// decrypted.
    pub async fn session_started(&self, session: Arc<Mutex<SessionInfo>>) {
        let session_id = session.lock().await.id();
        self.sessions.lock().await.insert(session_id, session);
    }

    /// Unregisters a session and invalidates it.
    pub async fn session_ended(&self, session_id: u64) -> crate::Result<()> {
        match self.sessions.lock().await.remove(&session_id) {
            Some(session) => {
                session.lock().await.invalidate();
                Ok(())
            }
            None => Err(crate::Error::InvalidState(format!(
                "session {} is not registered",
                session_id
            ))),
        }
    }

    async fn get_session(&self, session_id: u64) -> crate::Result<Arc<Mutex<SessionInfo>>> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| {
                crate::Error::InvalidState(format!("session {} is not registered", session_id))
            })
    }

    /// Serializes an outgoing message, signing or encrypting it according
    /// to its policy, and returns the frame payload to put on the wire.
    pub async fn transform_outgoing(&self, msg: OutgoingMessage) -> crate::Result<Vec<u8>> {
        let should_encrypt = msg.encrypt;
        let should_sign = msg.message.header.flags.signed();
        let session_id = msg.message.header.session_id;
        let msg_id = msg.message.header.message_id;

        let mut data = Vec::new();
        msg.message.write(&mut Cursor::new(&mut data))?;

        if should_sign {
            debug_assert!(!should_encrypt, "a message is either signed or encrypted");
            let signer = {
                self.get_session(session_id)
                    .await?
                    .lock()
                    .await
                    .signer()
                    .cloned()
            };
            match signer {
                Some(signer) => signer.sign_message(&mut data),
                None => {
                    return Err(crate::Error::TransformFailed(TransformError {
                        outgoing: true,
                        phase: TransformPhase::SignVerify,
                        session_id: Some(session_id),
                        msg_id: Some(msg_id),
                        why: "signing was requested, but the session has no signing key",
                    }))
                }
            }
        }

        if should_encrypt {
            let encryptor = {
                self.get_session(session_id)
                    .await?
                    .lock()
                    .await
                    .encryptor()
                    .cloned()
            };
            match encryptor {
                Some(encryptor) => {
                    let encrypted = encryptor.encrypt_message(data, session_id)?;
                    let mut cursor = Cursor::new(Vec::new());
                    encrypted.write(&mut cursor)?;
                    data = cursor.into_inner();
                }
                None => {
                    return Err(crate::Error::TransformFailed(TransformError {
                        outgoing: true,
                        phase: TransformPhase::EncryptDecrypt,
                        session_id: Some(session_id),
                        msg_id: Some(msg_id),
                        why: "encryption is required, but the session has no encryption key",
                    }))
                }
            }
        }

        Ok(data)
    }

    /// Parses an inbound frame payload, decrypting and verifying as needed.
    pub async fn transform_incoming(&self, frame: Vec<u8>) -> crate::Result<IncomingMessage> {
        let mut form = MessageForm::default();

        let raw = if is_transform_header(&frame) {
            form.encrypted = true;
            let encrypted = TransformMessage::read(&mut Cursor::new(&frame))?;
            let session = self.get_session(encrypted.header.session_id).await?;
            let decryptor = { session.lock().await.decryptor().cloned() };
            match decryptor {
                Some(decryptor) => decryptor.decrypt_message(encrypted)?,
                None => {
                    return Err(crate::Error::TransformFailed(TransformError {
                        outgoing: false,
                        phase: TransformPhase::EncryptDecrypt,
                        session_id: Some(encrypted.header.session_id),
                        msg_id: None,
                        why: "message is encrypted, but the session has no decryption key",
                    }))
                }
            }
        } else {
            frame
        };

        let message = PlainMessage::read(&mut Cursor::new(&raw))?;

        if let Err(e) = self.verify_plain_incoming(&message, &raw, &mut form).await {
            log::error!("Failed to verify incoming message: {}", e);
            return Err(crate::Error::TransformFailed(TransformError {
                outgoing: false,
                phase: TransformPhase::SignVerify,
                session_id: Some(message.header.session_id),
                msg_id: Some(message.header.message_id),
                why: "signature verification failed",
            }));
        }

        Ok(IncomingMessage { message, raw, form })
    }

    /// Verifies the signature of a plain inbound message, when one is
    /// required. Encrypted messages are already authenticated by their
    /// CCM tag; interim `Pending` responses arrive unsigned.
    async fn verify_plain_incoming(
        &self,
        message: &PlainMessage,
        raw: &[u8],
        form: &mut MessageForm,
    ) -> crate::Result<()> {
        if form.encrypted
            || message.header.message_id == u64::MAX
            || message.header.status == Status::Pending as u32
            || !message.header.flags.signed()
        {
            return Ok(());
        }

        let session_id = message.header.session_id;
        let verifier = {
            self.get_session(session_id)
                .await?
                .lock()
                .await
                .signer()
                .cloned()
        };
        match verifier {
            Some(verifier) => {
                form.signed = true;
                verifier.verify_signature(&message.header, raw)
            }
            None => Err(crate::Error::SignatureVerificationFailed),
        }
    }
}

/// An error during message transformation, carrying enough context to
/// route the failure to the task waiting on the message.
#[derive(Debug)]
pub struct TransformError {
    /// True when the failure happened on the outgoing path.
    pub outgoing: bool,
    pub phase: TransformPhase,
    pub session_id: Option<u64>,
    /// Set when a message ID is known, so the waiter can be failed.
    pub msg_id: Option<u64>,
    pub why: &'static str,
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to transform {} message: {:?} (session {:?}) - {}",
            if self.outgoing { "outgoing" } else { "incoming" },
            self.phase,
            self.session_id,
            self.why
        )
    }
}

#[derive(Debug)]
pub enum TransformPhase {
    /// Initial to/from bytes.
    EncodeDecode,
    /// Signature calculation and verification.
    SignVerify,
    /// Encryption and decryption.
    EncryptDecrypt,
}
