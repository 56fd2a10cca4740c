//! Cryptographic building blocks for the SMB3 secure channel: the
//! SP800-108 key derivation function, AES-CMAC message signing, and
//! AES-128-CCM message encryption.

use aes::cipher::InvalidLength;

pub mod encryption;
pub mod kbkdf;
pub mod signing;

pub use encryption::{make_encrypting_algo, EncryptingAlgo, EncryptionResult};
pub use kbkdf::{derive_session_keys, kbkdf_hmacsha256, DerivedKey, KeyToDerive, SessionKeys};
pub use signing::{make_signing_algo, SigningAlgo};

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(#[from] InvalidLength),
    #[error("AEAD cipher failure (tag verification or input size)")]
    AeadError,
    #[error("Key derivation failed: {0}")]
    KdfError(String),
    #[error("Keys are missing for the requested operation")]
    MissingKeys,
}

impl From<aead::Error> for CryptoError {
    fn from(_: aead::Error) -> Self {
        CryptoError::AeadError
    }
}
