//! The SMB 3.x Transform envelope carrying an encrypted message.

use std::io::Cursor;

use binrw::prelude::*;

const SIGNATURE_SIZE: usize = 16;

/// The transmitted nonce field. AES-128-CCM only consumes the first
/// [`CCM_NONCE_SIZE`] bytes of it.
pub type TransformNonce = [u8; 16];

/// Bytes of the nonce actually used by AES-128-CCM.
pub const CCM_NONCE_SIZE: usize = 11;

/// The 52-byte Transform header: protocol ID, auth-tag-as-signature, nonce,
/// original message size, flags, and the owning session ID.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
#[brw(little, magic(b"\xfdSMB"))]
pub struct TransformHeader {
    pub signature: u128,
    pub nonce: TransformNonce,
    pub original_message_size: u32,
    #[bw(calc = 0)]
    #[br(assert(_reserved == 0))]
    _reserved: u16,
    /// Flags/EncryptionAlgorithm: MUST be 0x0001 (encrypted).
    #[bw(calc = 1)]
    #[br(assert(_flags == 1))]
    _flags: u16,
    pub session_id: u64,
}

impl TransformHeader {
    const MAGIC_SIZE: usize = 4;
    pub const STRUCTURE_SIZE: usize = 52;
    const AAD_SIZE: usize = Self::STRUCTURE_SIZE - Self::MAGIC_SIZE - SIGNATURE_SIZE;

    /// The additional authenticated data for the AEAD: header bytes 20..52
    /// (nonce through session ID). Call after every field except the
    /// signature is final.
    pub fn aead_bytes(&self) -> [u8; Self::AAD_SIZE] {
        let mut cursor = Cursor::new([0u8; Self::STRUCTURE_SIZE]);
        // Writing a fixed-layout header to a fixed-size buffer cannot fail.
        self.write(&mut cursor).unwrap();
        cursor.into_inner()[Self::MAGIC_SIZE + SIGNATURE_SIZE..]
            .try_into()
            .unwrap()
    }
}

/// A full encrypted message: the Transform header followed by ciphertext.
#[binrw::binrw]
#[derive(Debug)]
#[brw(little)]
pub struct TransformMessage {
    pub header: TransformHeader,
    #[br(parse_with = binrw::helpers::until_eof)]
    pub encrypted_message: Vec<u8>,
}
