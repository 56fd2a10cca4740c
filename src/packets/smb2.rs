//! SMB2 message structures: the 64-byte header, the per-command packet
//! catalog, and the encrypted Transform envelope.

pub mod create;
pub mod echo;
pub mod encrypted;
pub mod error;
pub mod file;
pub mod header;
pub mod info;
pub mod negotiate;
pub mod notify;
pub mod plain;
pub mod query_dir;
pub mod session_setup;
pub mod tree_connect;

pub use create::*;
pub use echo::*;
pub use encrypted::*;
pub use error::*;
pub use file::*;
pub use header::*;
pub use info::*;
pub use negotiate::*;
pub use notify::*;
pub use plain::*;
pub use query_dir::*;
pub use session_setup::*;
pub use tree_connect::*;

#[cfg(test)]
pub use plain::test_helpers::*;
