//! An opened file: chunked reads and writes, size management, and flush.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::packets::fscc::*;
use crate::packets::smb2::*;

use super::ResourceHandle;

/// The per-message I/O ceiling, regardless of what the server negotiated.
const MAX_CHUNK_SIZE: u32 = 0x10000;

/// An opened file on the server. Obtained from
/// [`Tree::open_file`][crate::tree::Tree::open_file] or a create call.
pub struct File {
    handle: ResourceHandle,
    access: FileAccessMask,
    /// Size as last reported or written; refreshed by size-changing calls.
    end_of_file: AtomicU64,
}

impl File {
    pub(crate) fn new(handle: ResourceHandle, access: FileAccessMask, end_of_file: u64) -> File {
        File {
            handle,
            access,
            end_of_file: AtomicU64::new(end_of_file),
        }
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn access(&self) -> FileAccessMask {
        self.access
    }

    /// The cached end-of-file position. Server-side changes by other
    /// writers are not reflected here; see [`File::query_standard_info`].
    pub fn end_of_file(&self) -> u64 {
        self.end_of_file.load(Ordering::SeqCst)
    }

    /// The largest read the client will issue in one message.
    fn max_read_size(&self) -> u32 {
        let info = self.handle.handler().upstream.negotiate_info();
        info.max_read_size.min(MAX_CHUNK_SIZE)
    }

    fn max_write_size(&self) -> u32 {
        let info = self.handle.handler().upstream.negotiate_info();
        info.max_write_size.min(MAX_CHUNK_SIZE)
    }

    /// Reads up to `buf.len()` bytes at `pos` with a single request.
    /// Returns the number of bytes read; zero at end of file.
    pub async fn read_block(&self, buf: &mut [u8], pos: u64) -> crate::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.access.read_data() {
            return Err(crate::Error::MissingPermissions("read_data".to_string()));
        }

        let length = (buf.len() as u32).min(self.max_read_size());
        log::trace!(
            "Reading up to {} bytes at offset {} from {}.",
            length,
            pos,
            self.handle.name()
        );

        let response = self
            .handle
            .send_recv(
                ReadRequest {
                    flags: ReadFlags::new(),
                    length,
                    offset: pos,
                    file_id: self.handle.file_id(),
                    minimum_count: 1,
                }
                .into(),
            )
            .await;

        let response = match response {
            Ok(response) => response,
            // Reading at or past the end of file is a clean EOF.
            Err(e) if e.status() == Some(Status::U32_END_OF_FILE) => return Ok(0),
            Err(e) => return Err(e),
        };

        let content = match response.message.content {
            Content::ReadResponse(content) => content,
            _ => {
                return Err(crate::Error::InvalidMessage(
                    "expected a read response".to_string(),
                ))
            }
        };
        let read = content.buffer.len().min(buf.len());
        buf[..read].copy_from_slice(&content.buffer[..read]);
        Ok(read)
    }

    /// Reads the whole file, issuing as many chunked reads as needed and
    /// concatenating them in offset order.
    pub async fn read_to_end(&self) -> crate::Result<Vec<u8>> {
        let size = self.end_of_file();
        let mut data = vec![0u8; size as usize];
        let mut pos = 0u64;

        while pos < size {
            let read = self.read_block(&mut data[pos as usize..], pos).await?;
            if read == 0 {
                // The file shrank under us; return what is there.
                data.truncate(pos as usize);
                break;
            }
            pos += read as u64;
        }
        Ok(data)
    }

    /// Writes a block at `pos` with a single request, bounded by the
    /// per-message limit. Returns the number of bytes written.
    pub async fn write_block(&self, buf: &[u8], pos: u64) -> crate::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.access.write_data() {
            return Err(crate::Error::MissingPermissions("write_data".to_string()));
        }

        let length = (buf.len() as u32).min(self.max_write_size()) as usize;
        log::trace!(
            "Writing {} bytes at offset {} to {}.",
            length,
            pos,
            self.handle.name()
        );

        let response = self
            .handle
            .send_recv(
                WriteRequest {
                    offset: pos,
                    file_id: self.handle.file_id(),
                    flags: WriteFlags::new(),
                    buffer: buf[..length].to_vec(),
                }
                .into(),
            )
            .await?;

        let content = match response.message.content {
            Content::WriteResponse(content) => content,
            _ => {
                return Err(crate::Error::InvalidMessage(
                    "expected a write response".to_string(),
                ))
            }
        };

        let written = content.count as usize;
        let end = pos + written as u64;
        self.end_of_file.fetch_max(end, Ordering::SeqCst);
        Ok(written)
    }

    /// Writes all of `buf` at `pos`, chunking as needed.
    pub async fn write_all_at(&self, buf: &[u8], pos: u64) -> crate::Result<()> {
        let mut written = 0usize;
        while written < buf.len() {
            let n = self.write_block(&buf[written..], pos + written as u64).await?;
            if n == 0 {
                return Err(crate::Error::InvalidMessage(
                    "server accepted a write of zero bytes".to_string(),
                ));
            }
            written += n;
        }
        Ok(())
    }

    /// Replaces the file content with `data`: chunked writes from offset
    /// zero, then an end-of-file fixup when the previous size differs.
    pub async fn write(&self, data: &[u8]) -> crate::Result<()> {
        let previous_size = self.end_of_file();
        self.write_all_at(data, 0).await?;
        if previous_size != data.len() as u64 {
            self.set_end_of_file(data.len() as u64).await?;
        }
        Ok(())
    }

    /// Truncates or extends the file via SetInfo.
    pub async fn set_end_of_file(&self, size: u64) -> crate::Result<()> {
        self.handle
            .set_info(
                FileEndOfFileInformation::CLASS_ID,
                &FileEndOfFileInformation { end_of_file: size },
            )
            .await?;
        self.end_of_file.store(size, Ordering::SeqCst);
        Ok(())
    }

    /// Fetches the current standard information (sizes, link count,
    /// delete-pending) from the server and refreshes the cached size.
    pub async fn query_standard_info(&self) -> crate::Result<FileStandardInformation> {
        let info: FileStandardInformation = self
            .handle
            .query_info(FileStandardInformation::CLASS_ID)
            .await?;
        self.end_of_file.store(info.end_of_file, Ordering::SeqCst);
        Ok(info)
    }

    /// Asks the server to flush the file's buffers.
    pub async fn flush(&self) -> crate::Result<()> {
        let _response = self
            .handle
            .send_recv(
                FlushRequest {
                    file_id: self.handle.file_id(),
                }
                .into(),
            )
            .await?;
        log::debug!("Flushed {}.", self.handle.name());
        Ok(())
    }

    pub async fn close(&self) -> crate::Result<()> {
        self.handle.close().await
    }

    pub async fn close_quiet(&self) {
        self.handle.close_quiet().await
    }
}
