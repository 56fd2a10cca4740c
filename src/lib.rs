//! An SMB2/SMB3 client over TCP, with native NTLM (v1/v2) authentication.
//!
//! The crate is structured as a chain of message handlers: a [`Client`] owns
//! the TCP connection and the in-flight message table, a [`Session`] owns the
//! authenticated state and the SMB3 keys, a [`Tree`] owns a connected share,
//! and [`File`]/[`Directory`] wrap open handles. Each layer stamps its
//! identifiers and policy on outgoing messages and hands them down the chain.

pub mod client;
pub mod crypto;
pub mod error;
pub mod msg_handler;
pub mod ntlm;
pub mod packets;
pub mod resource;
pub mod session;
pub mod tree;

pub use client::{Client, ClientConfig, ClientEvent};
pub use error::Error;
pub use ntlm::NtlmVersion;
pub use resource::{Directory, DirectoryWatcher, File, Resource};
pub use session::Session;
pub use tree::Tree;

pub type Result<T> = std::result::Result<T, crate::Error>;
