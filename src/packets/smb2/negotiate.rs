//! Negotiate request and response, SMB 2.0.2 through 3.0.2 (no negotiate
//! contexts).

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::packets::binrw_util::prelude::*;
use crate::packets::guid::Guid;

#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
#[brw(repr(u16))]
pub enum Dialect {
    Smb0202 = 0x0202,
    Smb021 = 0x0210,
    Smb030 = 0x0300,
    Smb0302 = 0x0302,
}

impl Dialect {
    /// The dialects this client offers, in preference order on the wire.
    pub const SUPPORTED: [Dialect; 4] = [
        Dialect::Smb0202,
        Dialect::Smb021,
        Dialect::Smb030,
        Dialect::Smb0302,
    ];

    #[inline]
    pub fn is_smb3(&self) -> bool {
        matches!(self, Dialect::Smb030 | Dialect::Smb0302)
    }
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct NegotiateSecurityMode {
    pub signing_enabled: bool,
    pub signing_required: bool,
    #[skip]
    __: B14,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct GlobalCapabilities {
    pub dfs: bool,
    pub leasing: bool,
    pub large_mtu: bool,
    pub multi_channel: bool,

    pub persistent_handles: bool,
    pub directory_leasing: bool,
    pub encryption: bool,
    #[skip]
    __: B25,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct NegotiateRequest {
    #[bw(calc = 0x24)]
    #[br(assert(_structure_size == 0x24))]
    _structure_size: u16,
    #[bw(try_calc(u16::try_from(dialects.len())))]
    dialect_count: u16,
    pub security_mode: NegotiateSecurityMode,
    #[bw(calc = 0)]
    #[br(assert(_reserved == 0))]
    _reserved: u16,
    pub capabilities: GlobalCapabilities,
    pub client_guid: Guid,
    // Without SMB 3.1.1 there are no negotiate contexts; these eight bytes
    // are the ClientStartTime field and stay zero.
    #[bw(calc = 0)]
    _negotiate_context_offset: u32,
    #[bw(calc = 0)]
    _negotiate_context_count: u16,
    #[bw(calc = 0)]
    _reserved2: u16,
    #[br(count = dialect_count)]
    pub dialects: Vec<Dialect>,
}

impl NegotiateRequest {
    pub fn new(client_guid: Guid) -> NegotiateRequest {
        NegotiateRequest {
            security_mode: NegotiateSecurityMode::new().with_signing_enabled(true),
            capabilities: GlobalCapabilities::new().with_encryption(true),
            client_guid,
            dialects: Dialect::SUPPORTED.to_vec(),
        }
    }
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct NegotiateResponse {
    #[bw(calc = 0x41)]
    #[br(assert(_structure_size == 0x41))]
    _structure_size: u16,
    pub security_mode: NegotiateSecurityMode,
    pub dialect_revision: Dialect,
    // Reserved below 3.1.1; not validated to stay lenient with servers.
    #[bw(calc = 0)]
    _negotiate_context_count: u16,
    pub server_guid: Guid,
    pub capabilities: GlobalCapabilities,
    pub max_transact_size: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
    pub system_time: FileTime,
    pub server_start_time: FileTime,
    #[bw(calc = PosMarker::default())]
    _security_buffer_offset: PosMarker<u16>,
    #[bw(try_calc(u16::try_from(buffer.len())))]
    security_buffer_length: u16,
    #[bw(calc = 0)]
    _negotiate_context_offset: u32,
    #[br(count = security_buffer_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_security_buffer_offset))]
    pub buffer: Vec<u8>,
}
