//! A connected share, and the convenience operations that open a handle,
//! act on it, and close it again.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, RwLock};

use crate::client::ClientEvent;
use crate::msg_handler::*;
use crate::packets::fscc::*;
use crate::packets::smb2::*;
use crate::resource::{Directory, File, HandleState, Resource, ResourceHandle};
use crate::session::SessionMessageHandler;

type Upstream = HandlerReference<SessionMessageHandler>;

#[derive(Debug)]
struct TreeConnectInfo {
    tree_id: u32,
    share_type: TreeShareType,
    share_flags: TreeShareFlags,
}

/// A connected share. Created by
/// [`Session::tree_connect`][crate::Session::tree_connect].
pub struct Tree {
    handler: HandlerReference<TreeMessageHandler>,
    name: String,
}

impl Tree {
    /// Issues the TreeConnect exchange for `path` (`\\host:port\share`).
    pub(crate) async fn connect(
        name: &str,
        path: &str,
        upstream: &Upstream,
    ) -> crate::Result<Tree> {
        let handler = TreeMessageHandler::new(upstream.clone(), name.to_string());

        let response = handler
            .send_recv(TreeConnectRequest::new(path).into())
            .await?;
        let tree_id = response.message.header.tree_id.ok_or_else(|| {
            crate::Error::InvalidMessage("tree connect response without a tree ID".to_string())
        })?;
        let content = match response.message.content {
            Content::TreeConnectResponse(content) => content,
            _ => {
                return Err(crate::Error::InvalidMessage(
                    "expected a tree connect response".to_string(),
                ))
            }
        };

        // A share that mandates encryption turns it on for the session.
        if content.share_flags.encrypt_data() {
            log::debug!("Share {} requires encryption.", name);
            upstream.ensure_encryption().await?;
        }

        *handler.connect_info.write().await = Some(TreeConnectInfo {
            tree_id,
            share_type: content.share_type,
            share_flags: content.share_flags,
        });
        log::info!("Connected to tree {} (#{}).", name, tree_id);
        upstream
            .events_sender()
            .send(ClientEvent::TreeConnected {
                tree_id,
                share: name.to_string(),
            })
            .ok();

        Ok(Tree {
            handler,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn tree_id(&self) -> Option<u32> {
        self.handler
            .connect_info
            .read()
            .await
            .as_ref()
            .map(|info| info.tree_id)
    }

    pub async fn is_connected(&self) -> bool {
        self.handler.connect_info.read().await.is_some()
    }

    /// The share flags snapshot taken at connect time.
    pub async fn share_flags(&self) -> Option<TreeShareFlags> {
        self.handler
            .connect_info
            .read()
            .await
            .as_ref()
            .map(|info| info.share_flags)
    }

    pub async fn share_type(&self) -> Option<TreeShareType> {
        self.handler
            .connect_info
            .read()
            .await
            .as_ref()
            .map(|info| info.share_type)
    }

    /// Closes all open handles and disconnects from the share. Idempotent.
    pub async fn disconnect(&self) -> crate::Result<()> {
        self.handler.disconnect().await
    }

    /// Opens a resource on the share. The server decides whether the path
    /// is a file or a directory; the returned [`Resource`] tells which.
    pub async fn open(
        &self,
        path: &str,
        desired_access: FileAccessMask,
        disposition: CreateDisposition,
        options: CreateOptions,
    ) -> crate::Result<Resource> {
        let response = self
            .handler
            .send_recv(
                CreateRequest {
                    requested_oplock_level: OplockLevel::None,
                    impersonation_level: ImpersonationLevel::Impersonation,
                    desired_access,
                    file_attributes: FileAttributes::new(),
                    share_access: ShareAccessFlags::new()
                        .with_read(true)
                        .with_write(true)
                        .with_delete(true),
                    create_disposition: disposition,
                    create_options: options,
                    name: path.into(),
                }
                .into(),
            )
            .await?;

        let content = match response.message.content {
            Content::CreateResponse(content) => content,
            _ => {
                return Err(crate::Error::InvalidMessage(
                    "expected a create response".to_string(),
                ))
            }
        };
        log::debug!("Opened '{}' ({}).", path, content.file_id);

        let handle = ResourceHandle::new(
            path.to_string(),
            self.handler.clone(),
            content.file_id,
            content.creation_time,
            content.last_write_time,
        );
        self.handler
            .resources
            .lock()
            .await
            .push(Arc::downgrade(handle.state()));
        self.handler
            .upstream
            .events_sender()
            .send(ClientEvent::HandleOpened {
                name: path.to_string(),
            })
            .ok();

        if content.file_attributes.directory() {
            Ok(Resource::Directory(Directory::new(handle, desired_access)))
        } else {
            Ok(Resource::File(File::new(
                handle,
                desired_access,
                content.endof_file,
            )))
        }
    }

    /// Opens an existing file for reading.
    pub async fn open_file(&self, path: &str) -> crate::Result<File> {
        self.open(
            path,
            FileAccessMask::new()
                .with_read_data(true)
                .with_read_attributes(true),
            CreateDisposition::Open,
            CreateOptions::new().with_non_directory_file(true),
        )
        .await?
        .into_file()
    }

    /// Opens an existing directory for enumeration or watching.
    pub async fn open_dir(&self, path: &str) -> crate::Result<Directory> {
        self.open(
            path,
            FileAccessMask::new()
                .with_read_data(true)
                .with_read_attributes(true),
            CreateDisposition::Open,
            CreateOptions::new().with_directory_file(true),
        )
        .await?
        .into_directory()
    }

    /// Whether `path` exists on the share.
    pub async fn exists(&self, path: &str) -> crate::Result<bool> {
        let opened = self
            .open(
                path,
                FileAccessMask::new().with_read_attributes(true),
                CreateDisposition::Open,
                CreateOptions::new(),
            )
            .await;
        match opened {
            Ok(resource) => {
                resource.close_quiet().await;
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reads a whole file.
    pub async fn read_file(&self, path: &str) -> crate::Result<Vec<u8>> {
        let file = self.open_file(path).await?;
        let result = file.read_to_end().await;
        file.close_quiet().await;
        result
    }

    /// Creates or overwrites a file with `data`.
    pub async fn write_file(&self, path: &str, data: &[u8]) -> crate::Result<()> {
        let file = self
            .open(
                path,
                FileAccessMask::new()
                    .with_write_data(true)
                    .with_read_attributes(true),
                CreateDisposition::OverwriteIf,
                CreateOptions::new().with_non_directory_file(true),
            )
            .await?
            .into_file()?;
        let result = file.write(data).await;
        file.close_quiet().await;
        result
    }

    /// Lists a directory, without the `.` and `..` pseudo-entries.
    pub async fn read_dir(&self, path: &str) -> crate::Result<Vec<FileDirectoryInformation>> {
        let dir = self.open_dir(path).await?;
        let result = dir.entries("*").await;
        dir.close_quiet().await;
        result
    }

    /// Creates a new directory.
    pub async fn create_dir(&self, path: &str) -> crate::Result<()> {
        let resource = self
            .open(
                path,
                FileAccessMask::new().with_read_attributes(true),
                CreateDisposition::Create,
                CreateOptions::new().with_directory_file(true),
            )
            .await?;
        resource.close().await
    }

    /// Removes a file by marking it delete-on-close.
    pub async fn remove_file(&self, path: &str) -> crate::Result<()> {
        self.remove(path, CreateOptions::new().with_non_directory_file(true))
            .await
    }

    /// Removes an empty directory.
    pub async fn remove_dir(&self, path: &str) -> crate::Result<()> {
        self.remove(path, CreateOptions::new().with_directory_file(true))
            .await
    }

    async fn remove(&self, path: &str, options: CreateOptions) -> crate::Result<()> {
        let resource = self
            .open(
                path,
                FileAccessMask::new().with_delete(true),
                CreateDisposition::Open,
                options,
            )
            .await?;
        let result = resource
            .handle()
            .set_info(
                FileDispositionInformation::CLASS_ID,
                &FileDispositionInformation { delete_pending: 1 },
            )
            .await;
        let close_result = resource.close().await;
        result?;
        close_result
    }

    /// Renames a file or directory. The new path is share-relative.
    pub async fn rename(&self, path: &str, new_path: &str) -> crate::Result<()> {
        let resource = self
            .open(
                path,
                FileAccessMask::new().with_delete(true),
                CreateDisposition::Open,
                CreateOptions::new(),
            )
            .await?;
        let result = resource
            .handle()
            .set_info(
                FileRenameInformation::CLASS_ID,
                &FileRenameInformation {
                    replace_if_exists: 0,
                    file_name: new_path.into(),
                },
            )
            .await;
        let close_result = resource.close().await;
        result?;
        close_result
    }

    pub(crate) fn handler(&self) -> &HandlerReference<TreeMessageHandler> {
        &self.handler
    }
}

/// The tree's link in the handler chain: stamps the tree ID on outgoing
/// messages and refuses traffic while disconnected.
pub struct TreeMessageHandler {
    pub(crate) upstream: Upstream,
    tree_name: String,
    connect_info: RwLock<Option<TreeConnectInfo>>,
    /// Handles opened through this tree.
    pub(crate) resources: Mutex<Vec<Weak<HandleState>>>,
}

impl TreeMessageHandler {
    fn new(upstream: Upstream, tree_name: String) -> HandlerReference<TreeMessageHandler> {
        HandlerReference::new(TreeMessageHandler {
            upstream,
            tree_name,
            connect_info: RwLock::new(None),
            resources: Mutex::new(Vec::new()),
        })
    }

    pub(crate) async fn events_receiver(
        &self,
    ) -> tokio::sync::broadcast::Receiver<ClientEvent> {
        self.upstream.events_receiver().await
    }

    pub(crate) fn events_sender(&self) -> &tokio::sync::broadcast::Sender<ClientEvent> {
        self.upstream.events_sender()
    }

    pub(crate) async fn disconnect(&self) -> crate::Result<()> {
        let tree_id = {
            match self.connect_info.read().await.as_ref() {
                Some(info) => info.tree_id,
                None => {
                    log::trace!("Tree {} already disconnected.", self.tree_name);
                    return Ok(());
                }
            }
        };

        log::debug!("Disconnecting from tree {}.", self.tree_name);

        // Children first: close every handle still alive.
        let resources: Vec<_> = self.resources.lock().await.drain(..).collect();
        for resource in resources {
            if let Some(resource) = resource.upgrade() {
                resource.close_for_teardown().await;
            }
        }

        let _response = self
            .send_recv(TreeDisconnectRequest::default().into())
            .await?;
        self.connect_info.write().await.take();

        log::info!("Disconnected from tree {}.", self.tree_name);
        self.upstream
            .events_sender()
            .send(ClientEvent::TreeDisconnected { tree_id })
            .ok();
        Ok(())
    }
}

impl MessageHandler for TreeMessageHandler {
    async fn sendo(&self, mut msg: OutgoingMessage) -> crate::Result<SendMessageResult> {
        let tree_id = {
            match self.connect_info.read().await.as_ref() {
                Some(info) => Some(info.tree_id),
                None => None,
            }
        };
        match tree_id {
            Some(tree_id) => msg.message.header.tree_id = Some(tree_id),
            // Only the connect itself may pass through without a tree ID.
            None if msg.message.header.command == Command::TreeConnect => {}
            None => {
                return Err(crate::Error::InvalidState(format!(
                    "tree {} is not connected",
                    self.tree_name
                )))
            }
        }
        self.upstream.sendo(msg).await
    }

    async fn recvo(&self, options: ReceiveOptions<'_>) -> crate::Result<IncomingMessage> {
        self.upstream.recvo(options).await
    }
}
