//! Open handles on a tree: the shared handle state, and the [`File`] and
//! [`Directory`] resources built on it.

pub mod directory;
pub mod file;

pub use directory::{Directory, DirectoryWatcher};
pub use file::File;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use binrw::prelude::*;

use crate::client::ClientEvent;
use crate::msg_handler::*;
use crate::packets::binrw_util::prelude::*;
use crate::packets::smb2::*;
use crate::tree::TreeMessageHandler;

/// A resource opened by a create request: either a file or a directory,
/// depending on what the server reported.
pub enum Resource {
    File(File),
    Directory(Directory),
}

impl Resource {
    pub fn as_file(&self) -> Option<&File> {
        match self {
            Resource::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_dir(&self) -> Option<&Directory> {
        match self {
            Resource::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.as_file().is_some()
    }

    pub fn is_dir(&self) -> bool {
        self.as_dir().is_some()
    }

    pub fn into_file(self) -> crate::Result<File> {
        match self {
            Resource::File(file) => Ok(file),
            Resource::Directory(dir) => Err(crate::Error::InvalidArgument(format!(
                "{} is a directory",
                dir.handle().name()
            ))),
        }
    }

    pub fn into_directory(self) -> crate::Result<Directory> {
        match self {
            Resource::Directory(dir) => Ok(dir),
            Resource::File(file) => Err(crate::Error::InvalidArgument(format!(
                "{} is not a directory",
                file.handle().name()
            ))),
        }
    }

    pub fn handle(&self) -> &ResourceHandle {
        match self {
            Resource::File(file) => file.handle(),
            Resource::Directory(dir) => dir.handle(),
        }
    }

    pub async fn close(&self) -> crate::Result<()> {
        self.handle().close().await
    }

    pub async fn close_quiet(&self) {
        self.handle().close_quiet().await
    }
}

/// The state shared between a resource, its watchers, and the owning
/// tree's teardown list.
pub struct HandleState {
    name: String,
    handler: HandlerReference<TreeMessageHandler>,
    file_id: FileId,
    is_open: AtomicBool,
    created: FileTime,
    modified: FileTime,
}

impl HandleState {
    /// Closes the handle during tree teardown, tolerating failures.
    pub(crate) async fn close_for_teardown(self: &Arc<Self>) {
        let handle = ResourceHandle {
            state: self.clone(),
        };
        handle.close_quiet().await;
    }
}

/// A shared reference to an open handle. Cloning shares the same server
/// handle; closing through any clone closes them all.
#[derive(Clone)]
pub struct ResourceHandle {
    state: Arc<HandleState>,
}

impl ResourceHandle {
    pub(crate) fn new(
        name: String,
        handler: HandlerReference<TreeMessageHandler>,
        file_id: FileId,
        created: FileTime,
        modified: FileTime,
    ) -> ResourceHandle {
        ResourceHandle {
            state: Arc::new(HandleState {
                name,
                handler,
                file_id,
                is_open: AtomicBool::new(true),
                created,
                modified,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn file_id(&self) -> FileId {
        self.state.file_id
    }

    /// Creation time, as reported when the handle was opened.
    pub fn created(&self) -> FileTime {
        self.state.created
    }

    /// Last write time, as reported when the handle was opened.
    pub fn modified(&self) -> FileTime {
        self.state.modified
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> &Arc<HandleState> {
        &self.state
    }

    pub(crate) fn handler(&self) -> &HandlerReference<TreeMessageHandler> {
        &self.state.handler
    }

    /// Sends a request through the tree, refusing if the handle was
    /// closed.
    pub(crate) async fn send_recv(&self, msg: Content) -> crate::Result<IncomingMessage> {
        self.ensure_open()?;
        self.state.handler.send_recv(msg).await
    }

    pub(crate) async fn send_recvo(
        &self,
        msg: Content,
        options: ReceiveOptions<'_>,
    ) -> crate::Result<IncomingMessage> {
        self.ensure_open()?;
        self.state.handler.send_recvo(msg, options).await
    }

    pub(crate) fn ensure_open(&self) -> crate::Result<()> {
        if !self.is_open() {
            return Err(crate::Error::HandleClosed(self.state.name.clone()));
        }
        Ok(())
    }

    /// Sets a file information class on the handle.
    pub(crate) async fn set_info<T>(&self, class_id: u8, info: &T) -> crate::Result<()>
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        let request = SetInfoRequest::file_info(self.file_id(), class_id, info)?;
        let _response = self.send_recv(request.into()).await?;
        Ok(())
    }

    /// Queries a file information class from the handle.
    pub(crate) async fn query_info<T>(&self, class_id: u8) -> crate::Result<T>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        let response = self
            .send_recv(
                QueryInfoRequest {
                    info_type: InfoType::File,
                    file_info_class: class_id,
                    output_buffer_length: 1024,
                    additional_information: 0,
                    flags: 0,
                    file_id: self.file_id(),
                }
                .into(),
            )
            .await?;
        match response.message.content {
            Content::QueryInfoResponse(content) => content.parse(),
            _ => Err(crate::Error::InvalidMessage(
                "expected a query info response".to_string(),
            )),
        }
    }

    /// Closes the handle. A second close is refused; a `FileClosed` status
    /// from the server (teardown race) counts as success.
    pub async fn close(&self) -> crate::Result<()> {
        if self.state.is_open.swap(false, Ordering::SeqCst) == false {
            return Err(crate::Error::HandleClosed(self.state.name.clone()));
        }

        log::debug!("Closing handle for {} ({}).", self.state.name, self.state.file_id);
        let result = self
            .state
            .handler
            .send_recv(
                CloseRequest {
                    flags: CloseFlags::new(),
                    file_id: self.state.file_id,
                }
                .into(),
            )
            .await;

        match result {
            Ok(_) => {}
            Err(e) if e.status() == Some(Status::U32_FILE_CLOSED) => {
                log::debug!("Handle {} was already closed on the server.", self.state.name);
            }
            Err(e) => return Err(e),
        }

        log::info!("Closed {}.", self.state.name);
        self.state
            .handler
            .events_sender()
            .send(ClientEvent::HandleClosed {
                name: self.state.name.clone(),
            })
            .ok();
        Ok(())
    }

    /// Closes the handle, logging instead of failing. A no-op when already
    /// closed.
    pub async fn close_quiet(&self) {
        if !self.is_open() {
            return;
        }
        if let Err(e) = self.close().await {
            log::error!("Error closing {}: {}", self.state.name, e);
        }
    }
}
