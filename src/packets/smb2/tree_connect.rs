//! Tree Connect and Tree Disconnect messages.

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::packets::binrw_util::prelude::*;

#[binrw::binrw]
#[derive(Debug)]
pub struct TreeConnectRequest {
    #[bw(calc = 9)]
    #[br(assert(_structure_size == 9))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _flags: u16,
    #[bw(calc = PosMarker::default())]
    _path_offset: PosMarker<u16>,
    #[bw(try_calc = buffer.size().try_into())]
    path_length: u16,
    #[br(args(path_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_path_offset))]
    pub buffer: SizedWideString,
}

impl TreeConnectRequest {
    /// `path` is the full UNC path of the share: `\\server:port\share`.
    pub fn new(path: &str) -> TreeConnectRequest {
        TreeConnectRequest {
            buffer: path.into(),
        }
    }
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[brw(repr(u8))]
pub enum TreeShareType {
    Disk = 0x1,
    Pipe = 0x2,
    Print = 0x3,
}

#[derive(BitfieldSpecifier, Debug, Clone, Copy)]
#[bits = 4]
pub enum TreeShareCacheMode {
    Manual,
    Auto,
    Vdo,
    NoCache,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct TreeShareFlags {
    pub dfs: bool,
    pub dfs_root: bool,
    #[skip]
    __: B1,
    /// The server requires messages on this tree to be encrypted.
    pub encrypt_data: bool,
    pub caching_mode: TreeShareCacheMode,

    pub restrict_exclusive_opens: bool,
    pub force_shared_delete: bool,
    pub allow_namespace_caching: bool,
    pub access_based_directory_enum: bool,
    pub force_levelii_oplock: bool,
    pub enable_hash_v1: bool,
    pub enable_hash_v2: bool,
    #[skip]
    __: B1,

    #[skip]
    __: B16,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct TreeCapabilities {
    #[skip]
    __: B3,
    pub dfs: bool,
    pub continuous_availability: bool,
    pub scaleout: bool,
    pub cluster: bool,
    pub asymmetric: bool,

    pub redirect_to_owner: bool,
    #[skip]
    __: B23,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct TreeConnectResponse {
    #[bw(calc = 16)]
    #[br(assert(_structure_size == 16))]
    _structure_size: u16,
    pub share_type: TreeShareType,
    #[bw(calc = 0)]
    _reserved: u8,
    pub share_flags: TreeShareFlags,
    pub capabilities: TreeCapabilities,
    pub maximal_access: u32,
}

#[binrw::binrw]
#[derive(Debug, Default)]
pub struct TreeDisconnectRequest {
    #[bw(calc = 4)]
    #[br(assert(_structure_size == 4))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _reserved: u16,
}

#[binrw::binrw]
#[derive(Debug, Default)]
pub struct TreeDisconnectResponse {
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
    fn test_tree_connect_req_write() {
        let data = encode_content(Content::TreeConnectRequest(TreeConnectRequest::new(
            r"\\srv:445\Public",
        )));
        assert_eq!(&data[0..2], &[9, 0]);
        let offset = u16::from_le_bytes([data[4], data[5]]) as usize;
        assert_eq!(offset, Header::STRUCT_SIZE + 8);
        let length = u16::from_le_bytes([data[6], data[7]]) as usize;
        assert_eq!(length, r"\\srv:445\Public".len() * 2);
        // Path is UTF-16LE.
        assert_eq!(&data[8..12], &[b'\\', 0, b'\\', 0]);
    }

    #[test]
    fn test_tree_connect_resp_share_flags() {
        // encrypt_data is bit 3 of the share flags word.
        let resp = TreeConnectResponse {
            share_type: TreeShareType::Disk,
            share_flags: TreeShareFlags::new().with_encrypt_data(true),
            capabilities: TreeCapabilities::new(),
            maximal_access: 0x001f01ff,
        };
        let data = encode_content(Content::TreeConnectResponse(resp));
        let flags = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        assert_eq!(flags, 0x00000008);
    }
}
