//! NetBIOS session service framing.
//!
//! Every SMB2 message on the wire is preceded by a 4-byte session service
//! header: a packet type byte (only `0x00`, session message, is valid over
//! direct TCP) followed by a 24-bit big-endian payload length.

use binrw::prelude::*;

/// The protocol ID that opens an encrypted (Transform) SMB3 message.
pub const TRANSFORM_PROTOCOL_ID: &[u8; 4] = b"\xfdSMB";

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
#[brw(big)]
pub struct NetBiosHeader {
    pub packet_type: u8,
    #[br(parse_with = binrw::helpers::read_u24)]
    #[bw(write_with = binrw::helpers::write_u24)]
    pub length: u32,
}

impl NetBiosHeader {
    pub const SIZE: usize = 4;
    /// Session message, the only packet type valid over direct TCP.
    pub const TYPE_SESSION_MESSAGE: u8 = 0x00;
    pub const MAX_LENGTH: u32 = 0x00ff_ffff;
}

/// Prepends the session service header to a message payload.
pub fn frame_message(payload: &[u8]) -> crate::Result<Vec<u8>> {
    if payload.len() as u64 > NetBiosHeader::MAX_LENGTH as u64 {
        return Err(crate::Error::InvalidArgument(format!(
            "message of {} bytes exceeds the NetBIOS frame limit",
            payload.len()
        )));
    }
    let mut framed = Vec::with_capacity(NetBiosHeader::SIZE + payload.len());
    framed.extend_from_slice(&[
        NetBiosHeader::TYPE_SESSION_MESSAGE,
        (payload.len() >> 16) as u8,
        (payload.len() >> 8) as u8,
        payload.len() as u8,
    ]);
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Whether an unwrapped frame starts with the encrypted Transform protocol
/// ID (`0xFD 'S' 'M' 'B'`).
pub fn is_transform_header(frame: &[u8]) -> bool {
    frame.len() >= 4 && &frame[..4] == TRANSFORM_PROTOCOL_ID
}

/// Splits a growing byte stream into NetBIOS session message frames.
///
/// Bytes are appended with [`NetBiosFramer::feed`]; complete frames are
/// popped with [`NetBiosFramer::next_frame`]. Bytes belonging to an
/// incomplete frame (including a partial header) stay buffered as the
/// residual until more input arrives.
#[derive(Debug, Default)]
pub struct NetBiosFramer {
    buffer: Vec<u8>,
}

impl NetBiosFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes from the stream.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pops the next complete frame payload, if one is fully buffered.
    pub fn next_frame(&mut self) -> crate::Result<Option<Vec<u8>>> {
        if self.buffer.len() < NetBiosHeader::SIZE {
            return Ok(None);
        }
        if self.buffer[0] != NetBiosHeader::TYPE_SESSION_MESSAGE {
            return Err(crate::Error::InvalidNetBiosType(self.buffer[0]));
        }
        let length = u32::from_be_bytes([0, self.buffer[1], self.buffer[2], self.buffer[3]]);
        let total = NetBiosHeader::SIZE + length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let mut rest = self.buffer.split_off(total);
        std::mem::swap(&mut self.buffer, &mut rest);
        rest.drain(..NetBiosHeader::SIZE);
        Ok(Some(rest))
    }

    /// The bytes that do not yet form a complete frame.
    pub fn residual(&self) -> &[u8] {
        &self.buffer
    }

    /// Convenience for tests and batch input: feed `data` and collect every
    /// complete frame.
    pub fn unframe(&mut self, data: &[u8]) -> crate::Result<Vec<Vec<u8>>> {
        self.feed(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_read_write() {
        let header = NetBiosHeader {
            packet_type: 0,
            length: 0x123456,
        };
        let mut buf = Vec::new();
        header.write(&mut Cursor::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x00, 0x12, 0x34, 0x56]);
        assert_eq!(
            NetBiosHeader::read(&mut Cursor::new(&buf)).unwrap(),
            header
        );
    }

    #[test]
    fn test_two_concatenated_frames() {
        let mut input = Vec::new();
        input.extend_from_slice(&[0x00, 0x00, 0x00, 0x07]);
        input.extend_from_slice(b"packet1");
        input.extend_from_slice(&[0x00, 0x00, 0x00, 0x07]);
        input.extend_from_slice(b"packet2");

        let mut framer = NetBiosFramer::new();
        let frames = framer.unframe(&input).unwrap();
        assert_eq!(frames, vec![b"packet1".to_vec(), b"packet2".to_vec()]);
        assert!(framer.residual().is_empty());
    }

    #[test]
    fn test_partial_frame_stays_in_residual() {
        let mut framer = NetBiosFramer::new();
        let frames = framer.unframe(&[0x00, 0x00, 0x00, 0x05, b'a', b'b']).unwrap();
        assert!(frames.is_empty());
        assert_eq!(framer.residual().len(), 6);

        let frames = framer.unframe(b"cde").unwrap();
        assert_eq!(frames, vec![b"abcde".to_vec()]);
        assert!(framer.residual().is_empty());
    }

    #[test]
    fn test_split_across_header_boundary() {
        let mut framer = NetBiosFramer::new();
        assert!(framer.unframe(&[0x00, 0x00]).unwrap().is_empty());
        let frames = framer.unframe(&[0x00, 0x02, 0xaa, 0xbb]).unwrap();
        assert_eq!(frames, vec![vec![0xaa, 0xbb]]);
    }

    #[test]
    fn test_invalid_packet_type() {
        let mut framer = NetBiosFramer::new();
        framer.feed(&[0x85, 0x00, 0x00, 0x00]);
        assert!(matches!(
            framer.next_frame(),
            Err(crate::Error::InvalidNetBiosType(0x85))
        ));
    }

    #[test]
    fn test_frame_roundtrip() {
        let framed = frame_message(b"hello").unwrap();
        let mut framer = NetBiosFramer::new();
        assert_eq!(framer.unframe(&framed).unwrap(), vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_transform_header_detection() {
        assert!(is_transform_header(b"\xfdSMB\x01\x02"));
        assert!(!is_transform_header(b"\xfeSMB\x01\x02"));
        assert!(!is_transform_header(b"\xfd"));
    }
}
