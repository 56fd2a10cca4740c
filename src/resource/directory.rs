//! An opened directory: enumeration and change watching.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::client::ClientEvent;
use crate::msg_handler::ReceiveOptions;
use crate::packets::fscc::*;
use crate::packets::smb2::*;

use super::ResourceHandle;

/// Enumeration requests ask for this much output per message.
const QUERY_BUFFER_SIZE: u32 = 0x10000;

/// An opened directory on the server. Obtained from
/// [`Tree::open_dir`][crate::tree::Tree::open_dir] or a create call.
pub struct Directory {
    handle: ResourceHandle,
    access: FileAccessMask,
}

impl Directory {
    pub(crate) fn new(handle: ResourceHandle, access: FileAccessMask) -> Directory {
        Directory { handle, access }
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    /// One QueryDirectory round trip. An empty vector means the
    /// enumeration is exhausted.
    async fn send_query(
        &self,
        pattern: &str,
        restart: bool,
    ) -> crate::Result<Vec<FileDirectoryInformation>> {
        if !self.access.list_directory() {
            return Err(crate::Error::MissingPermissions(
                "list_directory".to_string(),
            ));
        }

        let response = self
            .handle
            .send_recv(
                QueryDirectoryRequest {
                    file_information_class: FileDirectoryInformation::CLASS_ID,
                    flags: QueryDirectoryFlags::new().with_restart_scans(restart),
                    file_index: 0,
                    file_id: self.handle.file_id(),
                    output_buffer_length: QUERY_BUFFER_SIZE,
                    file_name: pattern.into(),
                }
                .into(),
            )
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.status() == Some(Status::U32_NO_MORE_FILES) => return Ok(vec![]),
            Err(e) => return Err(e),
        };

        match response.message.content {
            Content::QueryDirectoryResponse(content) => Ok(content.read_output()?.items),
            _ => Err(crate::Error::InvalidMessage(
                "expected a query directory response".to_string(),
            )),
        }
    }

    /// Enumerates the directory with the given pattern (`*` for all),
    /// stripping the `.` and `..` pseudo-entries.
    pub async fn entries(&self, pattern: &str) -> crate::Result<Vec<FileDirectoryInformation>> {
        log::debug!("Enumerating directory {}.", self.handle.name());
        let mut entries = Vec::new();
        let mut restart = true;
        loop {
            let batch = self.send_query(pattern, restart).await?;
            if batch.is_empty() {
                break;
            }
            restart = false;
            entries.extend(
                batch
                    .into_iter()
                    .filter(|entry| entry.name() != "." && entry.name() != ".."),
            );
        }
        Ok(entries)
    }

    /// Starts watching the directory for changes. The returned watcher
    /// delivers change batches and re-arms itself after each one.
    pub async fn watch(
        &self,
        filter: NotifyFilter,
        recursive: bool,
    ) -> crate::Result<DirectoryWatcher> {
        // Subscribe before arming, so no delivery can be missed.
        let events = self.handle.handler().events_receiver().await;
        let msg_id = arm_change_notify(&self.handle, filter, recursive).await?;
        log::debug!(
            "Watching {} (message {}), recursive: {}.",
            self.handle.name(),
            msg_id,
            recursive
        );
        Ok(DirectoryWatcher {
            handle: self.handle.clone(),
            events,
            msg_id,
            filter,
            recursive,
        })
    }

    pub async fn close(&self) -> crate::Result<()> {
        self.handle.close().await
    }

    pub async fn close_quiet(&self) {
        self.handle.close_quiet().await
    }
}

/// Issues a ChangeNotify request and waits for the interim `Pending`
/// acknowledgment. Returns the message ID under which the delivery will
/// arrive later.
async fn arm_change_notify(
    handle: &ResourceHandle,
    filter: NotifyFilter,
    recursive: bool,
) -> crate::Result<u64> {
    let response = handle
        .send_recvo(
            ChangeNotifyRequest {
                flags: NotifyFlags::new().with_watch_tree(recursive),
                output_buffer_length: QUERY_BUFFER_SIZE,
                file_id: handle.file_id(),
                completion_filter: filter,
            }
            .into(),
            ReceiveOptions::new()
                .with_status(&[Status::Pending])
                .with_cmd(Some(Command::ChangeNotify)),
        )
        .await?;
    Ok(response.message.header.message_id)
}

/// A registered directory watch. Deliveries arrive on the client's
/// notification channel and are matched here by the message ID of the
/// outstanding ChangeNotify request.
pub struct DirectoryWatcher {
    handle: ResourceHandle,
    events: broadcast::Receiver<ClientEvent>,
    msg_id: u64,
    filter: NotifyFilter,
    recursive: bool,
}

impl DirectoryWatcher {
    /// Waits for the next change batch, then re-arms the watch.
    pub async fn next(&mut self) -> crate::Result<Arc<Vec<FileNotifyInformation>>> {
        loop {
            let event = match self.events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Watcher lagged behind, {} events dropped.", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(crate::Error::ConnectionAborted)
                }
            };

            match event {
                ClientEvent::ChangeNotify {
                    message_id,
                    notifications,
                } if message_id == self.msg_id => {
                    self.msg_id =
                        arm_change_notify(&self.handle, self.filter, self.recursive).await?;
                    return Ok(notifications);
                }
                ClientEvent::Disconnected => return Err(crate::Error::ConnectionAborted),
                _ => continue,
            }
        }
    }

    /// Cancels the watch by closing the directory handle; the server
    /// completes the outstanding request with a cleanup status that no
    /// waiter consumes.
    pub async fn unwatch(self) -> crate::Result<()> {
        log::debug!("Unwatching {}.", self.handle.name());
        self.handle.close().await
    }
}
