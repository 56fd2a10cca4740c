//! Message signing and verification with the session's signing key.

use crate::crypto;
use crate::packets::smb2::Header;

/// Signs and verifies serialized messages. The signature is the AES-CMAC
/// over the whole message with the header's signature field zeroed.
#[derive(Debug)]
pub struct MessageSigner {
    algo: Box<dyn crypto::SigningAlgo>,
}

impl MessageSigner {
    pub fn new(algo: Box<dyn crypto::SigningAlgo>) -> MessageSigner {
        MessageSigner { algo }
    }

    /// Signs a serialized message in place, patching the signature field.
    pub fn sign_message(&self, data: &mut [u8]) {
        debug_assert!(data.len() >= Header::STRUCT_SIZE);
        data[Header::SIGNATURE_RANGE].fill(0);
        let signature = self.algo.sign(data);
        data[Header::SIGNATURE_RANGE].copy_from_slice(&signature.to_le_bytes());
    }

    /// Verifies the signature of a received serialized message against its
    /// parsed header.
    pub fn verify_signature(&self, header: &Header, raw: &[u8]) -> crate::Result<()> {
        if raw.len() < Header::STRUCT_SIZE {
            return Err(crate::Error::SignatureVerificationFailed);
        }
        let mut copy = raw.to_vec();
        copy[Header::SIGNATURE_RANGE].fill(0);
        let expected = self.algo.sign(&copy);

        if expected != header.signature {
            log::warn!(
                "Signature mismatch on message {}.",
                header.message_id
            );
            return Err(crate::Error::SignatureVerificationFailed);
        }
        Ok(())
    }
}

impl Clone for MessageSigner {
    fn clone(&self) -> Self {
        MessageSigner {
            algo: self.algo.clone_box(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg_handler::OutgoingMessage;
    use crate::packets::smb2::*;
    use binrw::prelude::*;
    use std::io::Cursor;

    fn signer() -> MessageSigner {
        MessageSigner::new(crypto::make_signing_algo(&[7u8; 16]).unwrap())
    }

    fn serialized_echo() -> (Header, Vec<u8>) {
        let msg = OutgoingMessage::new(EchoRequest::default().into());
        let mut cursor = Cursor::new(Vec::new());
        msg.message.write(&mut cursor).unwrap();
        (msg.message.header, cursor.into_inner())
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let (mut header, mut data) = serialized_echo();
        signer().sign_message(&mut data);

        // The signature landed in bytes 48..64.
        let signature = u128::from_le_bytes(data[48..64].try_into().unwrap());
        assert_ne!(signature, 0);

        header.signature = signature;
        signer().verify_signature(&header, &data).unwrap();
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let (mut header, mut data) = serialized_echo();
        signer().sign_message(&mut data);
        header.signature = u128::from_le_bytes(data[48..64].try_into().unwrap());

        let last = data.len() - 1;
        data[last] ^= 0xff;
        assert!(matches!(
            signer().verify_signature(&header, &data),
            Err(crate::Error::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let (mut header, mut data) = serialized_echo();
        signer().sign_message(&mut data);
        header.signature = u128::from_le_bytes(data[48..64].try_into().unwrap());

        let other = MessageSigner::new(crypto::make_signing_algo(&[8u8; 16]).unwrap());
        assert!(other.verify_signature(&header, &data).is_err());
    }
}
