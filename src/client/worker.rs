//! The connection worker: owns the two transport loops, the in-flight
//! message table, and the notification event channel.
//!
//! Sending registers nothing; receiving registers a one-shot waiter under
//! the message ID. A response arriving before its waiter is buffered until
//! claimed. Each receive is bounded by the configured request timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::netbios_client::{NetBiosClient, NetBiosReader, NetBiosWriter};
use super::transformer::Transformer;
use super::ClientEvent;
use crate::msg_handler::{IncomingMessage, OutgoingMessage, SendMessageResult};
use crate::packets::smb2::{Command, Status};

/// In-flight message table state: tasks awaiting a message ID, and
/// responses that arrived before anyone awaited them.
#[derive(Debug, Default)]
struct AwaitState {
    awaiting: HashMap<u64, oneshot::Sender<crate::Result<IncomingMessage>>>,
    /// Buffered responses, in arrival order per message ID.
    pending: HashMap<u64, Vec<crate::Result<IncomingMessage>>>,
}

pub struct ConnectionWorker {
    state: Mutex<AwaitState>,
    transformer: Transformer,
    /// Queue into the send loop.
    sender: mpsc::Sender<Vec<u8>>,
    events: broadcast::Sender<ClientEvent>,
    stopped: AtomicBool,
    timeout: RwLock<Duration>,
    loop_handles: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
    token: CancellationToken,
}

impl ConnectionWorker {
    /// Takes ownership of the connection and starts the send/receive
    /// loops.
    pub async fn start(
        netbios: NetBiosClient,
        timeout: Duration,
        events: broadcast::Sender<ClientEvent>,
    ) -> crate::Result<Arc<ConnectionWorker>> {
        let (tx, rx) = mpsc::channel(100);
        let worker = Arc::new(ConnectionWorker {
            state: Default::default(),
            transformer: Transformer::default(),
            sender: tx,
            events,
            stopped: AtomicBool::new(false),
            timeout: RwLock::new(timeout),
            loop_handles: Default::default(),
            token: CancellationToken::new(),
        });

        let (reader, writer) = netbios.split();
        let recv_task = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.loop_receive(reader).await })
        };
        let send_task = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.loop_send(writer, rx).await })
        };
        worker
            .loop_handles
            .lock()
            .await
            .replace((recv_task, send_task));

        Ok(worker)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    pub async fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write().await = timeout;
    }

    /// Stops the loops and fails all in-flight waiters.
    pub async fn stop(&self) {
        log::debug!("Stopping connection worker.");
        self.stopped.store(true, Ordering::SeqCst);
        self.token.cancel();
        if let Some((recv_task, send_task)) = self.loop_handles.lock().await.take() {
            recv_task.await.ok();
            send_task.await.ok();
        }
        self.drop_waiters().await;
    }

    /// Transforms and queues a message for sending.
    pub async fn send(&self, msg: OutgoingMessage) -> crate::Result<SendMessageResult> {
        if self.stopped() {
            return Err(crate::Error::NotConnected);
        }
        let msg_id = msg.message.header.message_id;
        let payload = self.transformer.transform_outgoing(msg).await?;

        log::trace!("Message {} queued for sending.", msg_id);
        self.sender
            .send(payload)
            .await
            .map_err(|_| crate::Error::NotConnected)?;
        Ok(SendMessageResult::new(msg_id))
    }

    /// Waits for the response carrying `msg_id`, bounded by the configured
    /// request timeout. A timed-out waiter is deregistered, so a late
    /// response is buffered and eventually dropped rather than delivered.
    pub async fn receive(&self, msg_id: u64) -> crate::Result<IncomingMessage> {
        let receiver = {
            let mut state = self.state.lock().await;
            if self.stopped() {
                return Err(crate::Error::NotConnected);
            }

            if let Some(queue) = state.pending.get_mut(&msg_id) {
                let response = queue.remove(0);
                if queue.is_empty() {
                    state.pending.remove(&msg_id);
                }
                return response;
            }

            let (tx, rx) = oneshot::channel();
            state.awaiting.insert(msg_id, tx);
            rx
        };

        let timeout = { *self.timeout.read().await };
        tokio::select! {
            response = receiver => {
                response.map_err(|_| crate::Error::ConnectionAborted)?
            }
            _ = tokio::time::sleep(timeout) => {
                // Deregister so a late response cannot wake a dead waiter.
                self.state.lock().await.awaiting.remove(&msg_id);
                Err(crate::Error::RequestTimeout(
                    format!("response for message {}", msg_id),
                    timeout,
                ))
            }
        }
    }

    async fn loop_receive(self: Arc<Self>, mut reader: NetBiosReader) {
        log::debug!("Starting receive loop.");
        loop {
            let result = tokio::select! {
                frame = reader.receive() => {
                    match frame {
                        Ok(frame) => self.incoming(frame).await,
                        Err(e) => Err(e),
                    }
                }
                _ = self.token.cancelled() => Err(crate::Error::NotConnected),
            };
            match result {
                Ok(()) => {}
                Err(crate::Error::NotConnected) => {
                    if self.token.is_cancelled() {
                        log::info!("Connection closed.");
                    } else {
                        log::error!("Connection closed by the server.");
                        self.events.send(ClientEvent::Disconnected).ok();
                    }
                    break;
                }
                Err(e) => {
                    log::error!("Error in receive loop: {}", e);
                    self.events
                        .send(ClientEvent::Error {
                            message: e.to_string(),
                        })
                        .ok();
                }
            }
        }

        self.stopped.store(true, Ordering::SeqCst);
        self.drop_waiters().await;
    }

    async fn loop_send(self: Arc<Self>, mut writer: NetBiosWriter, mut rx: mpsc::Receiver<Vec<u8>>) {
        log::debug!("Starting send loop.");
        loop {
            let result = tokio::select! {
                payload = rx.recv() => {
                    match payload {
                        Some(payload) => writer.send(&payload).await,
                        None => Err(crate::Error::NotConnected),
                    }
                }
                _ = self.token.cancelled() => Err(crate::Error::NotConnected),
            };
            match result {
                Ok(()) => {}
                Err(crate::Error::NotConnected) => {
                    log::debug!("Send loop closed.");
                    break;
                }
                Err(e) => {
                    log::error!("Error in send loop: {}", e);
                }
            }
        }
        rx.close();
    }

    /// Processes one inbound frame: transform, then route by message ID —
    /// except ChangeNotify deliveries, which go to the notification
    /// channel rather than to a waiter.
    async fn incoming(self: &Arc<Self>, frame: Vec<u8>) -> crate::Result<()> {
        log::trace!("Received a message frame from the server.");
        let result = self.transformer.transform_incoming(frame).await;

        let (msg, msg_id) = match result {
            Ok(msg) => {
                let msg_id = msg.message.header.message_id;
                (Ok(msg), msg_id)
            }
            // If the failure names a message ID, fail that waiter.
            Err(crate::Error::TransformFailed(e)) => match e.msg_id {
                Some(msg_id) => (Err(crate::Error::TransformFailed(e)), msg_id),
                None => return Err(crate::Error::TransformFailed(e)),
            },
            Err(e) => return Err(e),
        };

        if let Ok(msg) = &msg {
            if msg.message.header.command == Command::ChangeNotify
                && msg.message.header.status == Status::Success as u32
            {
                self.emit_change_notify(msg);
                return Ok(());
            }
        }

        let mut state = self.state.lock().await;
        if let Some(tx) = state.awaiting.remove(&msg_id) {
            log::trace!("Waking up the task awaiting message {}.", msg_id);
            tx.send(msg).map_err(|_| {
                crate::Error::InvalidState(format!("waiter for message {} went away", msg_id))
            })?;
        } else {
            log::trace!("Buffering message {} until awaited.", msg_id);
            state.pending.entry(msg_id).or_default().push(msg);
        }
        Ok(())
    }

    /// Emits a ChangeNotify delivery on the notification channel.
    fn emit_change_notify(&self, msg: &IncomingMessage) {
        use crate::packets::smb2::Content;

        let notifications = match &msg.message.content {
            Content::ChangeNotifyResponse(response) => match response.read_notifications() {
                Ok(list) => list.items,
                Err(e) => {
                    log::error!("Failed to parse change notifications: {}", e);
                    return;
                }
            },
            _ => {
                log::warn!("ChangeNotify response with unexpected content.");
                return;
            }
        };

        log::debug!(
            "Change notification for message {} with {} entries.",
            msg.message.header.message_id,
            notifications.len()
        );
        self.events
            .send(ClientEvent::ChangeNotify {
                message_id: msg.message.header.message_id,
                notifications: Arc::new(notifications),
            })
            .ok();
    }

    /// Fails every registered waiter with a connection-aborted error.
    async fn drop_waiters(&self) {
        let mut state = self.state.lock().await;
        for (_, tx) in state.awaiting.drain() {
            tx.send(Err(crate::Error::ConnectionAborted)).ok();
        }
    }
}

impl std::fmt::Debug for ConnectionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("stopped", &self.stopped)
            .finish()
    }
}
