//! AES-128-CMAC message signing (RFC 4493), the SMB 3.x signing algorithm.

use aes::Aes128;
use cmac::{Cmac, Mac};

use super::CryptoError;

pub type SigningKey = [u8; 16];

/// A message signing algorithm. The whole serialized message (with the
/// header's signature field zeroed) is fed in one call.
pub trait SigningAlgo: std::fmt::Debug + Send + Sync {
    /// Computes the 128-bit signature over `data`.
    fn sign(&self, data: &[u8]) -> u128;

    fn clone_box(&self) -> Box<dyn SigningAlgo>;
}

pub fn make_signing_algo(signing_key: &SigningKey) -> Result<Box<dyn SigningAlgo>, CryptoError> {
    Cmac128Signer::build(signing_key)
}

#[derive(Clone)]
struct Cmac128Signer {
    key: SigningKey,
}

impl Cmac128Signer {
    pub fn build(signing_key: &SigningKey) -> Result<Box<dyn SigningAlgo>, CryptoError> {
        // Validate the key eagerly so signing itself cannot fail.
        Cmac::<Aes128>::new_from_slice(signing_key)?;
        Ok(Box::new(Cmac128Signer { key: *signing_key }))
    }
}

impl SigningAlgo for Cmac128Signer {
    fn sign(&self, data: &[u8]) -> u128 {
        // Key length was validated at construction.
        let mut cmac = Cmac::<Aes128>::new_from_slice(&self.key).unwrap();
        cmac.update(data);
        u128::from_le_bytes(cmac.finalize().into_bytes().into())
    }

    fn clone_box(&self) -> Box<dyn SigningAlgo> {
        Box::new(self.clone())
    }
}

impl std::fmt::Debug for Cmac128Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of debug output.
        write!(f, "Cmac128Signer")
    }
}
