//! AES-128-CCM message encryption, the cipher of SMB 3.0/3.0.2: 16-byte
//! key, 11-byte nonce, 16-byte tag, with the Transform header tail as AAD.

use std::fmt::Debug;

use aead::AeadInPlace;
use aes::cipher::generic_array::GenericArray;
use aes::Aes128;
use ccm::{
    consts::{U11, U16},
    Ccm, KeyInit,
};

use crate::packets::smb2::{TransformNonce, CCM_NONCE_SIZE};

use super::CryptoError;

pub struct EncryptionResult {
    /// The 16-byte authentication tag, written back into the Transform
    /// header's signature field.
    pub signature: u128,
}

pub trait EncryptingAlgo: Debug + Send + Sync {
    /// Encrypts `payload` in place, authenticating `aad`, and returns the
    /// tag.
    fn encrypt(
        &self,
        payload: &mut [u8],
        aad: &[u8],
        nonce: &TransformNonce,
    ) -> Result<EncryptionResult, CryptoError>;

    /// Decrypts `payload` in place, verifying `aad` and the tag carried in
    /// `signature`.
    fn decrypt(
        &self,
        payload: &mut [u8],
        aad: &[u8],
        nonce: &TransformNonce,
        signature: u128,
    ) -> Result<(), CryptoError>;

    /// How many bytes of the transmitted 16-byte nonce the cipher consumes.
    fn nonce_size(&self) -> usize;

    fn clone_box(&self) -> Box<dyn EncryptingAlgo>;
}

pub fn make_encrypting_algo(encrypting_key: &[u8; 16]) -> Result<Box<dyn EncryptingAlgo>, CryptoError> {
    Aes128CcmEncryptor::build(encrypting_key)
}

type Aes128Ccm = Ccm<Aes128, U16, U11>;

#[derive(Clone)]
struct Aes128CcmEncryptor {
    cipher: Aes128Ccm,
}

impl Aes128CcmEncryptor {
    pub fn build(key: &[u8; 16]) -> Result<Box<dyn EncryptingAlgo>, CryptoError> {
        Ok(Box::new(Self {
            cipher: Aes128Ccm::new_from_slice(key)?,
        }))
    }
}

impl EncryptingAlgo for Aes128CcmEncryptor {
    fn encrypt(
        &self,
        payload: &mut [u8],
        aad: &[u8],
        nonce: &TransformNonce,
    ) -> Result<EncryptionResult, CryptoError> {
        let tag = self.cipher.encrypt_in_place_detached(
            GenericArray::from_slice(&nonce[..self.nonce_size()]),
            aad,
            payload,
        )?;
        Ok(EncryptionResult {
            signature: u128::from_le_bytes(tag.into()),
        })
    }

    fn decrypt(
        &self,
        payload: &mut [u8],
        aad: &[u8],
        nonce: &TransformNonce,
        signature: u128,
    ) -> Result<(), CryptoError> {
        self.cipher.decrypt_in_place_detached(
            GenericArray::from_slice(&nonce[..self.nonce_size()]),
            aad,
            payload,
            &signature.to_le_bytes().into(),
        )?;
        Ok(())
    }

    fn nonce_size(&self) -> usize {
        CCM_NONCE_SIZE
    }

    fn clone_box(&self) -> Box<dyn EncryptingAlgo> {
        Box::new(self.clone())
    }
}

impl Debug for Aes128CcmEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Aes128CcmEncryptor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f, 0x10,
    ];

    fn nonce() -> TransformNonce {
        let mut nonce = [0u8; 16];
        for (i, b) in nonce.iter_mut().enumerate() {
            *b = i as u8;
        }
        nonce
    }

    #[test]
    fn test_ccm_roundtrip() {
        let algo = make_encrypting_algo(&KEY).unwrap();
        let aad = [0x55u8; 32];
        let plaintext: Vec<u8> = (0..132u32).map(|i| i as u8).collect();

        let mut payload = plaintext.clone();
        let result = algo.encrypt(&mut payload, &aad, &nonce()).unwrap();
        assert_ne!(payload, plaintext);

        algo.decrypt(&mut payload, &aad, &nonce(), result.signature)
            .unwrap();
        assert_eq!(payload, plaintext);
    }

    #[test]
    fn test_ccm_rejects_flipped_ciphertext_bit() {
        let algo = make_encrypting_algo(&KEY).unwrap();
        let aad = [0u8; 32];
        let mut payload = b"attack at dawn".to_vec();
        let result = algo.encrypt(&mut payload, &aad, &nonce()).unwrap();

        payload[3] ^= 0x01;
        assert!(algo
            .decrypt(&mut payload, &aad, &nonce(), result.signature)
            .is_err());
    }

    #[test]
    fn test_ccm_rejects_flipped_tag_bit() {
        let algo = make_encrypting_algo(&KEY).unwrap();
        let aad = [0u8; 32];
        let mut payload = b"attack at dawn".to_vec();
        let result = algo.encrypt(&mut payload, &aad, &nonce()).unwrap();

        assert!(algo
            .decrypt(&mut payload, &aad, &nonce(), result.signature ^ 1)
            .is_err());
    }

    #[test]
    fn test_ccm_rejects_modified_aad() {
        let algo = make_encrypting_algo(&KEY).unwrap();
        let mut aad = [0u8; 32];
        let mut payload = b"attack at dawn".to_vec();
        let result = algo.encrypt(&mut payload, &aad, &nonce()).unwrap();

        aad[31] = 1;
        assert!(algo
            .decrypt(&mut payload, &aad, &nonce(), result.signature)
            .is_err());
    }

    #[test]
    fn test_empty_payload() {
        let algo = make_encrypting_algo(&KEY).unwrap();
        let aad = [1u8; 32];
        let mut payload = Vec::new();
        let result = algo.encrypt(&mut payload, &aad, &nonce()).unwrap();
        algo.decrypt(&mut payload, &aad, &nonce(), result.signature)
            .unwrap();
    }
}
