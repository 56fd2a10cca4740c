//! File I/O messages: Flush, Read, Write.

use std::io::SeekFrom;

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use super::create::FileId;
use super::header::Header;
use crate::packets::binrw_util::prelude::*;

#[binrw::binrw]
#[derive(Debug)]
pub struct FlushRequest {
    #[bw(calc = 24)]
    #[br(assert(_structure_size == 24))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _reserved1: u16,
    #[bw(calc = 0)]
    _reserved2: u32,
    pub file_id: FileId,
}

#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlushResponse {
    #[bw(calc = 4)]
    #[br(assert(_structure_size == 4))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _reserved: u16,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct ReadFlags {
    pub read_unbuffered: bool,
    pub read_compressed: bool,
    #[skip]
    __: B6,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct ReadRequest {
    #[bw(calc = 49)]
    #[br(assert(_structure_size == 49))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _padding: u8,
    pub flags: ReadFlags,
    pub length: u32,
    pub offset: u64,
    pub file_id: FileId,
    pub minimum_count: u32,
    // No RDMA channel support; the channel fields stay zero.
    #[bw(calc = 0)]
    _channel: u32,
    #[bw(calc = 0)]
    _remaining_bytes: u32,
    #[bw(calc = 0)]
    _read_channel_info_offset: u16,
    #[bw(calc = 0)]
    _read_channel_info_length: u16,
    // The structure size counts one blob byte even though no blob is sent.
    #[bw(calc = 0)]
    _pad_blob_placeholder: u8,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct ReadResponse {
    #[bw(calc = Self::STRUCT_SIZE as u16)]
    #[br(assert(_structure_size == Self::STRUCT_SIZE as u16))]
    _structure_size: u16,
    // Offsets are measured from the beginning of the SMB2 header.
    #[br(assert(_data_offset.value as usize >= Header::STRUCT_SIZE + Self::STRUCT_SIZE - 1))]
    #[bw(calc = PosMarker::default())]
    _data_offset: PosMarker<u8>,
    #[bw(calc = 0)]
    _reserved: u8,
    #[bw(try_calc = buffer.len().try_into())]
    data_length: u32,
    #[bw(calc = 0)]
    _data_remaining: u32,
    #[bw(calc = 0)]
    _reserved2: u32,
    #[br(seek_before = SeekFrom::Start(_data_offset.value as u64), count = data_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_data_offset))]
    pub buffer: Vec<u8>,
}

impl ReadResponse {
    const STRUCT_SIZE: usize = 17;
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct WriteFlags {
    pub write_through: bool,
    #[skip]
    __: B29,
    pub write_unbuffered: bool,
    #[skip]
    __: B1,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct WriteRequest {
    #[bw(calc = 49)]
    #[br(assert(_structure_size == 49))]
    _structure_size: u16,
    #[bw(calc = PosMarker::default())]
    _data_offset: PosMarker<u16>,
    #[bw(try_calc = buffer.len().try_into())]
    length: u32,
    pub offset: u64,
    pub file_id: FileId,
    #[bw(calc = 0)]
    _channel: u32,
    #[bw(calc = 0)]
    _remaining_bytes: u32,
    #[bw(calc = 0)]
    _write_channel_info_offset: u16,
    #[bw(calc = 0)]
    _write_channel_info_length: u16,
    pub flags: WriteFlags,
    #[br(seek_before = SeekFrom::Start(_data_offset.value as u64), count = length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_data_offset))]
    pub buffer: Vec<u8>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct WriteResponse {
    #[bw(calc = 17)]
    #[br(assert(_structure_size == 17))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _reserved: u16,
    pub count: u32,
    #[bw(calc = 0)]
    _remaining: u32,
    #[bw(calc = 0)]
    _write_channel_info_offset: u16,
    #[bw(calc = 0)]
    _write_channel_info_length: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::smb2::*;

    #[test]
    fn test_read_req_write() {
        let req = ReadRequest {
            flags: ReadFlags::new(),
            length: 0x10000,
            offset: 0x20000,
            file_id: FileId {
                persistent: 1,
                volatile: 2,
            },
            minimum_count: 1,
        };
        let data = encode_content(Content::ReadRequest(req));
        assert_eq!(data.len(), 49);
        assert_eq!(&data[0..2], &[49, 0]);
        assert_eq!(u32::from_le_bytes([data[4], data[5], data[6], data[7]]), 0x10000);
        assert_eq!(
            u64::from_le_bytes(data[8..16].try_into().unwrap()),
            0x20000
        );
    }

    #[test]
    fn test_write_req_layout() {
        let req = WriteRequest {
            offset: 512,
            file_id: FileId::default(),
            flags: WriteFlags::new(),
            buffer: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let data = encode_content(Content::WriteRequest(req));
        let data_offset = u16::from_le_bytes([data[2], data[3]]) as usize;
        assert_eq!(data_offset, Header::STRUCT_SIZE + 48);
        assert_eq!(&data[48..52], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_read_resp_roundtrip() {
        let resp = ReadResponse {
            buffer: vec![7; 42],
        };
        let data = encode_server_message(Content::ReadResponse(resp), Status::Success);
        match decode_message(&data).content {
            Content::ReadResponse(r) => assert_eq!(r.buffer, vec![7; 42]),
            _ => panic!("wrong content type"),
        }
    }

    #[test]
    fn test_write_resp_parse() {
        let data = encode_server_message(
            Content::WriteResponse(WriteResponse { count: 77 }),
            Status::Success,
        );
        match decode_message(&data).content {
            Content::WriteResponse(r) => assert_eq!(r.count, 77),
            _ => panic!("wrong content type"),
        }
    }
}
