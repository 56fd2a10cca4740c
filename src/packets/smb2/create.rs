//! Create and Close messages.

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::packets::binrw_util::prelude::*;
use crate::packets::fscc::{FileAccessMask, FileAttributes};

/// The 16-byte opaque file handle identifier assigned by the server.
#[binrw::binrw]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub persistent: u64,
    pub volatile: u64,
}

impl FileId {
    /// The all-ones value, used on the wire to mean "no handle".
    pub const MAX: FileId = FileId {
        persistent: u64::MAX,
        volatile: u64::MAX,
    };
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}:{:016x}", self.persistent, self.volatile)
    }
}

#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(repr(u8))]
pub enum OplockLevel {
    None = 0x00,
    Level2 = 0x01,
    Exclusive = 0x08,
    Batch = 0x09,
    Lease = 0xFF,
}

#[binrw::binrw]
#[derive(Debug, Clone, Copy)]
#[brw(repr(u32))]
pub enum ImpersonationLevel {
    Anonymous = 0x0,
    Identification = 0x1,
    Impersonation = 0x2,
    Delegate = 0x3,
}

#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(repr(u32))]
pub enum CreateDisposition {
    Supersede = 0x0,
    Open = 0x1,
    Create = 0x2,
    OpenIf = 0x3,
    Overwrite = 0x4,
    OverwriteIf = 0x5,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct ShareAccessFlags {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    #[skip]
    __: B29,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct CreateOptions {
    pub directory_file: bool,
    pub write_through: bool,
    pub sequential_only: bool,
    pub no_intermediate_buffering: bool,

    pub synchronous_io_alert: bool,
    pub synchronous_io_nonalert: bool,
    pub non_directory_file: bool,
    #[skip]
    __: B1,

    pub complete_if_oplocked: bool,
    pub no_ea_knowledge: bool,
    #[skip]
    __: B1,
    pub random_access: bool,

    pub delete_on_close: bool,
    pub open_by_file_id: bool,
    pub open_for_backup_intent: bool,
    pub no_compression: bool,

    #[skip]
    __: B16,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct CreateRequest {
    #[bw(calc = 57)]
    #[br(assert(_structure_size == 57))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _security_flags: u8,
    pub requested_oplock_level: OplockLevel,
    pub impersonation_level: ImpersonationLevel,
    #[bw(calc = 0)]
    _smb_create_flags: u64,
    #[bw(calc = 0)]
    _reserved: u64,
    pub desired_access: FileAccessMask,
    pub file_attributes: FileAttributes,
    pub share_access: ShareAccessFlags,
    pub create_disposition: CreateDisposition,
    pub create_options: CreateOptions,
    #[bw(calc = PosMarker::default())]
    _name_offset: PosMarker<u16>,
    #[bw(try_calc = name.size().try_into())]
    name_length: u16,
    // No create contexts: durable handles and leases are not requested.
    #[bw(calc = 0)]
    _create_contexts_offset: u32,
    #[bw(calc = 0)]
    _create_contexts_length: u32,
    #[br(args(name_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_name_offset))]
    pub name: SizedWideString,
    // The structure size counts one buffer byte even when the name is empty.
    #[br(calc = None)]
    #[bw(calc = if name.is_empty() { Some(0u8) } else { None })]
    _name_pad_placeholder: Option<u8>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct CreateResponse {
    #[bw(calc = 89)]
    #[br(assert(_structure_size == 89))]
    _structure_size: u16,
    pub oplock_level: OplockLevel,
    #[bw(calc = 0)]
    _flags: u8,
    pub create_action: u32,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub change_time: FileTime,
    pub allocation_size: u64,
    pub endof_file: u64,
    pub file_attributes: FileAttributes,
    #[bw(calc = 0)]
    _reserved2: u32,
    pub file_id: FileId,
    #[bw(calc = 0)]
    _create_contexts_offset: u32,
    #[bw(calc = 0)]
    _create_contexts_length: u32,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct CloseFlags {
    pub postquery_attrib: bool,
    #[skip]
    __: B15,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct CloseRequest {
    #[bw(calc = 24)]
    #[br(assert(_structure_size == 24))]
    _structure_size: u16,
    pub flags: CloseFlags,
    #[bw(calc = 0)]
    _reserved: u32,
    pub file_id: FileId,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct CloseResponse {
    #[bw(calc = 60)]
    #[br(assert(_structure_size == 60))]
    _structure_size: u16,
    pub flags: CloseFlags,
    #[bw(calc = 0)]
    _reserved: u32,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub change_time: FileTime,
    pub allocation_size: u64,
    pub endof_file: u64,
    pub file_attributes: FileAttributes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::smb2::*;

    #[test]
    fn test_create_req_layout() {
        let req = CreateRequest {
            requested_oplock_level: OplockLevel::None,
            impersonation_level: ImpersonationLevel::Impersonation,
            desired_access: FileAccessMask::new().with_read_data(true),
            file_attributes: FileAttributes::new(),
            share_access: ShareAccessFlags::new()
                .with_read(true)
                .with_write(true)
                .with_delete(true),
            create_disposition: CreateDisposition::Open,
            create_options: CreateOptions::new(),
            name: "dir\\file.txt".into(),
        };
        let data = encode_content(Content::CreateRequest(req));
        assert_eq!(&data[0..2], &[57, 0]);
        // The name starts right after the 56-byte fixed part.
        let name_offset = u16::from_le_bytes([data[44], data[45]]) as usize;
        assert_eq!(name_offset, Header::STRUCT_SIZE + 56);
        let name_length = u16::from_le_bytes([data[46], data[47]]) as usize;
        assert_eq!(name_length, "dir\\file.txt".len() * 2);
        assert_eq!(data.len(), 56 + name_length);
    }

    #[test]
    fn test_create_req_empty_name_has_pad_byte() {
        let req = CreateRequest {
            requested_oplock_level: OplockLevel::None,
            impersonation_level: ImpersonationLevel::Impersonation,
            desired_access: FileAccessMask::new().with_read_data(true),
            file_attributes: FileAttributes::new(),
            share_access: ShareAccessFlags::new().with_read(true),
            create_disposition: CreateDisposition::Open,
            create_options: CreateOptions::new().with_directory_file(true),
            name: "".into(),
        };
        let data = encode_content(Content::CreateRequest(req));
        assert_eq!(data.len(), 57);
    }

    #[test]
    fn test_create_resp_roundtrip() {
        let resp = CreateResponse {
            oplock_level: OplockLevel::None,
            create_action: 1,
            creation_time: FileTime::from(132232032000000000u64),
            last_access_time: FileTime::default(),
            last_write_time: FileTime::default(),
            change_time: FileTime::default(),
            allocation_size: 4096,
            endof_file: 1234,
            file_attributes: FileAttributes::new().with_archive(true),
            file_id: FileId {
                persistent: 0x1122,
                volatile: 0x3344,
            },
        };
        let data = encode_server_message(Content::CreateResponse(resp), Status::Success);
        match decode_message(&data).content {
            Content::CreateResponse(r) => {
                assert_eq!(r.endof_file, 1234);
                assert_eq!(r.file_id.persistent, 0x1122);
                assert_eq!(r.file_id.volatile, 0x3344);
            }
            _ => panic!("wrong content type"),
        }
    }
}
