use std::io::Cursor;

use binrw::prelude::*;
use modular_bitfield::prelude::*;

#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, Clone, Copy)]
#[brw(repr(u16))]
pub enum Command {
    Negotiate = 0x00,
    SessionSetup = 0x01,
    Logoff = 0x02,
    TreeConnect = 0x03,
    TreeDisconnect = 0x04,
    Create = 0x05,
    Close = 0x06,
    Flush = 0x07,
    Read = 0x08,
    Write = 0x09,
    Lock = 0x0A,
    Ioctl = 0x0B,
    Cancel = 0x0C,
    Echo = 0x0D,
    QueryDirectory = 0x0E,
    ChangeNotify = 0x0F,
    QueryInfo = 0x10,
    SetInfo = 0x11,
    OplockBreak = 0x12,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Negotiate => "Negotiate",
            Command::SessionSetup => "Session Setup",
            Command::Logoff => "Logoff",
            Command::TreeConnect => "Tree Connect",
            Command::TreeDisconnect => "Tree Disconnect",
            Command::Create => "Create",
            Command::Close => "Close",
            Command::Flush => "Flush",
            Command::Read => "Read",
            Command::Write => "Write",
            Command::Lock => "Lock",
            Command::Ioctl => "Ioctl",
            Command::Cancel => "Cancel",
            Command::Echo => "Echo",
            Command::QueryDirectory => "Query Directory",
            Command::ChangeNotify => "Change Notify",
            Command::QueryInfo => "Query Info",
            Command::SetInfo => "Set Info",
            Command::OplockBreak => "Oplock Break",
        };
        write!(f, "{} ({:#x})", name, *self as u16)
    }
}

macro_rules! make_status {
    (
        $($name:ident = $value:literal: $description:literal, )+
    ) => {

/// NT status codes the client recognizes.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[brw(repr(u32))]
pub enum Status {
    $(
        $name = $value,
    )+
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            $(
                Status::$name => $description,
            )+
        };
        write!(f, "{} ({:#010x})", name, *self as u32)
    }
}

impl Status {
    // Consts for easy status-as-u32 matching.
    paste::paste! {
        $(
            #[doc = concat!("`", stringify!($name), "` as u32")]
            pub const [<U32_ $name:snake:upper>]: u32 = $value;
        )+
    }

    /// Renders a raw NT status as its known name, or as hex when the value
    /// is not in the [`Status`] enum.
    pub fn try_display_as_status(value: u32) -> String {
        match Self::try_from(value) {
            Ok(status) => format!("{}", status),
            Err(_) => format!("{:#010x}", value),
        }
    }
}

impl TryFrom<u32> for Status {
    type Error = crate::Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Status::read_le(&mut Cursor::new(value.to_le_bytes())).map_err(|_| {
            crate::Error::InvalidMessage(format!("unknown NT status code: {:#010x}", value))
        })
    }
}
    };
}

make_status! {
    Success = 0x00000000: "Success",
    Pending = 0x00000103: "Pending",
    NotifyCleanup = 0x0000010B: "Notify Cleanup",
    NotifyEnumDir = 0x0000010C: "Notify Enum Dir",
    BufferOverflow = 0x80000005: "Buffer Overflow",
    NoMoreFiles = 0x80000006: "No More Files",
    InvalidParameter = 0xC000000D: "Invalid Parameter",
    EndOfFile = 0xC0000011: "End of File",
    MoreProcessingRequired = 0xC0000016: "More Processing Required",
    AccessDenied = 0xC0000022: "Access Denied",
    BufferTooSmall = 0xC0000023: "Buffer Too Small",
    ObjectNameInvalid = 0xC0000033: "Object Name Invalid",
    ObjectNameNotFound = 0xC0000034: "Object Name Not Found",
    ObjectNameCollision = 0xC0000035: "Object Name Collision",
    ObjectPathNotFound = 0xC000003A: "Object Path Not Found",
    SharingViolation = 0xC0000043: "Sharing Violation",
    DeletePending = 0xC0000056: "Delete Pending",
    LogonFailure = 0xC000006D: "Logon Failure",
    IoTimeout = 0xC00000B5: "I/O Timeout",
    FileIsADirectory = 0xC00000BA: "File is a Directory",
    NotSupported = 0xC00000BB: "Not Supported",
    BadNetworkName = 0xC00000CC: "Bad Network Name",
    DirectoryNotEmpty = 0xC0000101: "Directory Not Empty",
    NotADirectory = 0xC0000103: "Not a Directory",
    Cancelled = 0xC0000120: "Cancelled",
    FileClosed = 0xC0000128: "File Closed",
    UserSessionDeleted = 0xC0000203: "User Session Deleted",
    NetworkSessionExpired = 0xC000035C: "Network Session Expired",
}

/// The 64-byte SMB2 message header, sync or async flavor.
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(magic(b"\xfeSMB"), little)]
pub struct Header {
    #[bw(calc = Self::STRUCT_SIZE as u16)]
    #[br(assert(_structure_size == Self::STRUCT_SIZE as u16))]
    _structure_size: u16,
    pub credit_charge: u16,
    /// Raw NT status (channel sequence + reserved on requests). Use
    /// [`Header::status`] to interpret it.
    pub status: u32,
    pub command: Command,
    pub credit_request: u16,
    pub flags: HeaderFlags,
    pub next_command: u32,
    pub message_id: u64,

    // Sync: Reserved + TreeId, when flags.async_command is unset.
    #[brw(if(!flags.async_command()))]
    #[bw(calc = 0)]
    _reserved: u32,
    #[br(if(!flags.async_command()))]
    #[bw(assert(tree_id.is_some() == !flags.async_command()))]
    pub tree_id: Option<u32>,

    // Async: AsyncId, when flags.async_command is set.
    #[brw(if(flags.async_command()))]
    #[bw(assert(async_id.is_some() == flags.async_command()))]
    pub async_id: Option<u64>,

    pub session_id: u64,
    pub signature: u128,
}

impl Header {
    pub const STRUCT_SIZE: usize = 64;
    /// Byte range of the signature field within the serialized header.
    pub const SIGNATURE_RANGE: std::ops::Range<usize> = 48..64;

    /// Tries to interpret the raw status as a known [`Status`].
    pub fn status(&self) -> crate::Result<Status> {
        self.status.try_into()
    }
}

#[bitfield]
#[derive(BinWrite, BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct HeaderFlags {
    pub server_to_redir: bool,
    pub async_command: bool,
    pub related_operations: bool,
    pub signed: bool,
    pub priority_mask: B3,
    #[skip]
    __: B21,
    pub dfs_operation: bool,
    pub replay_operation: bool,
    #[skip]
    __: B2,
}
