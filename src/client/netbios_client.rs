//! TCP transport with NetBIOS session service framing.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::packets::netbios::{frame_message, NetBiosFramer};

/// A TCP connection carrying NetBIOS-framed messages.
pub struct NetBiosClient {
    stream: TcpStream,
}

impl NetBiosClient {
    /// Connects to the server, bounded by `connect_timeout`.
    pub async fn connect(address: &str, connect_timeout: Duration) -> crate::Result<NetBiosClient> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                crate::Error::RequestTimeout("TCP connect".to_string(), connect_timeout)
            })??;
        stream.set_nodelay(true)?;
        Ok(NetBiosClient { stream })
    }

    /// Splits the connection into independent reader and writer halves for
    /// the worker loops.
    pub fn split(self) -> (NetBiosReader, NetBiosWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            NetBiosReader {
                half: read_half,
                framer: NetBiosFramer::new(),
                ready: std::collections::VecDeque::new(),
            },
            NetBiosWriter { half: write_half },
        )
    }
}

/// The receiving half: reads raw TCP chunks, reassembles NetBIOS frames.
pub struct NetBiosReader {
    half: OwnedReadHalf,
    framer: NetBiosFramer,
    ready: std::collections::VecDeque<Vec<u8>>,
}

impl NetBiosReader {
    /// Receives the next complete frame payload.
    pub async fn receive(&mut self) -> crate::Result<Vec<u8>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }
            while let Some(frame) = self.framer.next_frame()? {
                self.ready.push_back(frame);
            }
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let mut chunk = [0u8; 0x10000];
            let n = self.half.read(&mut chunk).await.map_err(map_tcp_error)?;
            if n == 0 {
                return Err(crate::Error::NotConnected);
            }
            self.framer.feed(&chunk[..n]);
        }
    }
}

/// The sending half: frames and writes message payloads.
pub struct NetBiosWriter {
    half: OwnedWriteHalf,
}

impl NetBiosWriter {
    /// Frames `payload` with the session service header and writes it out.
    pub async fn send(&mut self, payload: &[u8]) -> crate::Result<()> {
        let framed = frame_message(payload)?;
        self.half
            .write_all(&framed)
            .await
            .map_err(map_tcp_error)?;
        Ok(())
    }
}

/// Connection aborts and unexpected EOFs surface as [`Error::NotConnected`].
fn map_tcp_error(e: std::io::Error) -> crate::Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::UnexpectedEof => crate::Error::NotConnected,
        _ => e.into(),
    }
}
