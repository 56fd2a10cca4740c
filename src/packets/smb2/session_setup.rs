//! Session Setup and Logoff messages. The security buffer carries the raw
//! NTLMSSP token.

use std::io::SeekFrom;

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::packets::binrw_util::prelude::*;

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct SessionSecurityMode {
    pub signing_enabled: bool,
    pub signing_required: bool,
    #[skip]
    __: B6,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct SetupRequestFlags {
    pub binding: bool,
    #[skip]
    __: B7,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct SessionSetupRequest {
    #[bw(calc = 25)]
    #[br(assert(_structure_size == 25))]
    _structure_size: u16,
    pub flags: SetupRequestFlags,
    pub security_mode: SessionSecurityMode,
    pub capabilities: u32,
    pub channel: u32,
    #[bw(calc = PosMarker::default())]
    _security_buffer_offset: PosMarker<u16>,
    #[bw(try_calc(u16::try_from(buffer.len())))]
    security_buffer_length: u16,
    pub previous_session_id: u64,
    #[br(seek_before = SeekFrom::Start(_security_buffer_offset.value as u64), count = security_buffer_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_security_buffer_offset))]
    pub buffer: Vec<u8>,
}

impl SessionSetupRequest {
    pub fn new(buffer: Vec<u8>) -> SessionSetupRequest {
        SessionSetupRequest {
            flags: SetupRequestFlags::new(),
            security_mode: SessionSecurityMode::new().with_signing_enabled(true),
            capabilities: 0,
            channel: 0,
            previous_session_id: 0,
            buffer,
        }
    }
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct SessionFlags {
    pub is_guest: bool,
    pub is_null_session: bool,
    pub encrypt_data: bool,
    #[skip]
    __: B13,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct SessionSetupResponse {
    #[bw(calc = 9)]
    #[br(assert(_structure_size == 9))]
    _structure_size: u16,
    pub session_flags: SessionFlags,
    #[bw(calc = PosMarker::default())]
    _security_buffer_offset: PosMarker<u16>,
    #[bw(try_calc(u16::try_from(buffer.len())))]
    security_buffer_length: u16,
    #[br(seek_before = SeekFrom::Start(_security_buffer_offset.value as u64), count = security_buffer_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_security_buffer_offset))]
    pub buffer: Vec<u8>,
}

#[binrw::binrw]
#[derive(Debug, Default)]
pub struct LogoffRequest {
    #[bw(calc = 4)]
    #[br(assert(_structure_size == 4))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _reserved: u16,
}

#[binrw::binrw]
#[derive(Debug, Default)]
pub struct LogoffResponse {
    #[bw(calc = 4)]
    #[br(assert(_structure_size == 4))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _reserved: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::smb2::*;

    #[test]
    fn test_setup_req_layout() {
        let blob = vec![0xaa, 0xbb, 0xcc];
        let data = encode_content(Content::SessionSetupRequest(SessionSetupRequest::new(
            blob.clone(),
        )));
        assert_eq!(&data[0..2], &[25, 0]);
        // Security buffer offset is absolute from the message start.
        let offset = u16::from_le_bytes([data[12], data[13]]) as usize;
        assert_eq!(offset, Header::STRUCT_SIZE + 24);
        let length = u16::from_le_bytes([data[14], data[15]]) as usize;
        assert_eq!(length, 3);
        assert_eq!(&data[24..27], &blob[..]);
    }

    #[test]
    fn test_setup_resp_parse() {
        let resp = SessionSetupResponse {
            session_flags: SessionFlags::new().with_is_guest(true),
            buffer: vec![1, 2, 3, 4],
        };
        let data = encode_server_message(
            Content::SessionSetupResponse(resp),
            Status::MoreProcessingRequired,
        );
        let parsed = decode_message(&data);
        assert_eq!(
            parsed.header.status,
            Status::MoreProcessingRequired as u32
        );
        match parsed.content {
            Content::SessionSetupResponse(r) => {
                assert!(r.session_flags.is_guest());
                assert_eq!(r.buffer, vec![1, 2, 3, 4]);
            }
            _ => panic!("wrong content type"),
        }
    }
}
