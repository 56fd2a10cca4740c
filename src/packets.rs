//! Wire structures: NetBIOS framing, binrw utilities, FSCC information
//! classes, and the SMB2 packet catalog.

pub mod binrw_util;
pub mod fscc;
pub mod guid;
pub mod netbios;
pub mod smb2;
