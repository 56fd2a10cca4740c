use std::num::TryFromIntError;
use std::time::Duration;

use thiserror::Error;

use crate::client::TransformError;
use crate::packets::smb2::{Command, Status};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Binrw error: {0}")]
    BinRwError(#[from] binrw::Error),
    #[error("Int conversion error: {0}")]
    ParsingError(#[from] TryFromIntError),

    #[error("Client is not connected.")]
    NotConnected,
    #[error("Connection closed while requests were outstanding.")]
    ConnectionAborted,
    #[error("Request timed out after {1:?}: {0}")]
    RequestTimeout(String, Duration),

    #[error("Invalid NetBIOS packet type: {0:#04x}")]
    InvalidNetBiosType(u8),
    #[error("Unexpected message, {0}")]
    InvalidMessage(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Unsupported dialect revision: {0:#06x}")]
    UnsupportedDialect(u16),

    #[error("Unexpected message status: {}{}", display_status(.0), sharing_violation_hint(.0))]
    UnexpectedMessageStatus(u32),
    #[error("Server returned an error message, status: {}{}", display_status(.0), sharing_violation_hint(.0))]
    ReceivedErrorMessage(u32),
    #[error("Unexpected command: {0}")]
    UnexpectedCommand(Command),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] crate::crypto::CryptoError),
    #[error("Signature verification failed!")]
    SignatureVerificationFailed,
    #[error("Unable to transform message: {0}")]
    TransformFailed(TransformError),

    #[error("Handle is closed: {0}")]
    HandleClosed(String),
    #[error("Missing permissions: {0}")]
    MissingPermissions(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Returns the NT status carried by this error, if there is one.
    pub fn status(&self) -> Option<u32> {
        match self {
            Error::UnexpectedMessageStatus(status) | Error::ReceivedErrorMessage(status) => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether this error indicates the target file or path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.status(),
            Some(Status::U32_OBJECT_NAME_NOT_FOUND) | Some(Status::U32_OBJECT_PATH_NOT_FOUND)
        )
    }
}

fn display_status(status: &u32) -> String {
    Status::try_display_as_status(*status)
}

fn sharing_violation_hint(status: &u32) -> &'static str {
    if *status == Status::U32_SHARING_VIOLATION {
        " (the file is opened by another process with a conflicting share mode)"
    } else {
        ""
    }
}
