//! NTLM cryptographic functions ([MS-NLMP] 3.3): the v1 one-way functions
//! and DES challenge responses, and the v2 HMAC-MD5 response family.

use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use digest::Digest;
use hmac::{Hmac, Mac};
use md4::Md4;
use md5::Md5;

use crate::packets::binrw_util::prelude::*;

type HmacMd5 = Hmac<Md5>;

pub type NtHash = [u8; 16];
pub type SessionKey = [u8; 16];

/// The constant plaintext DES-encrypted by the two LM hash halves.
const LM_MAGIC: &[u8; 8] = b"KGS!@#$%";

fn utf16le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    // HMAC-MD5 accepts keys of any length.
    let mut mac = <HmacMd5 as Mac>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// NTOWFv1: MD4 over the UTF-16LE password.
pub fn nt_owf_v1(password: &str) -> NtHash {
    Md4::digest(utf16le_bytes(password)).into()
}

/// LMOWFv1: the password is uppercased, padded/truncated to 14 ASCII
/// bytes, and each 7-byte half DES-encrypts `"KGS!@#$%"`.
pub fn lm_owf_v1(password: &str) -> NtHash {
    let mut padded = [0u8; 14];
    for (dst, src) in padded.iter_mut().zip(password.to_uppercase().bytes()) {
        *dst = src;
    }

    let mut result = [0u8; 16];
    result[..8].copy_from_slice(&des_encrypt(&expand_des_key(&padded[..7]), LM_MAGIC));
    result[8..].copy_from_slice(&des_encrypt(&expand_des_key(&padded[7..]), LM_MAGIC));
    result
}

/// NTOWFv2: `HMAC_MD5(NTOWFv1(password), UTF16LE(UPPER(user) || domain))`.
/// The domain keeps the caller's casing.
pub fn nt_owf_v2(password: &str, user: &str, domain: &str) -> NtHash {
    let identity = user.to_uppercase() + domain;
    hmac_md5(&nt_owf_v1(password), &utf16le_bytes(&identity))
}

/// The v1 challenge response: the 16-byte hash is zero-padded to 21 bytes,
/// split into three 7-byte DES keys, and each encrypts the server
/// challenge.
pub fn des_long_encrypt(hash: &NtHash, challenge: &[u8; 8]) -> [u8; 24] {
    let mut padded = [0u8; 21];
    padded[..16].copy_from_slice(hash);

    let mut response = [0u8; 24];
    for i in 0..3 {
        let key = expand_des_key(&padded[i * 7..(i + 1) * 7]);
        response[i * 8..(i + 1) * 8].copy_from_slice(&des_encrypt(&key, challenge));
    }
    response
}

/// Expands a 7-byte key to DES's 8-byte form by spreading the 56 key bits
/// over 8 bytes, leaving the low (parity) bit of each byte clear.
fn expand_des_key(key: &[u8]) -> [u8; 8] {
    debug_assert_eq!(key.len(), 7);
    let mut result = [0u8; 8];
    result[0] = key[0] >> 1;
    result[1] = ((key[0] & 0x01) << 6) | (key[1] >> 2);
    result[2] = ((key[1] & 0x03) << 5) | (key[2] >> 3);
    result[3] = ((key[2] & 0x07) << 4) | (key[3] >> 4);
    result[4] = ((key[3] & 0x0F) << 3) | (key[4] >> 5);
    result[5] = ((key[4] & 0x1F) << 2) | (key[5] >> 6);
    result[6] = ((key[5] & 0x3F) << 1) | (key[6] >> 7);
    result[7] = key[6] & 0x7F;
    for b in result.iter_mut() {
        *b <<= 1;
    }
    result
}

fn des_encrypt(key: &[u8; 8], plaintext: &[u8; 8]) -> [u8; 8] {
    // An 8-byte DES key is always accepted.
    let des = Des::new_from_slice(key).unwrap();
    let mut block = *plaintext;
    des.encrypt_block((&mut block).into());
    block
}

/// The NTLMv1 responses: 24-byte NT and LM responses over the server
/// challenge.
pub fn ntlm_v1_responses(password: &str, server_challenge: &[u8; 8]) -> ([u8; 24], [u8; 24]) {
    let nt_response = des_long_encrypt(&nt_owf_v1(password), server_challenge);
    let lm_response = des_long_encrypt(&lm_owf_v1(password), server_challenge);
    (nt_response, lm_response)
}

/// The output of the NTLMv2 computation.
pub struct NtlmV2Response {
    /// `NTProofStr || temp`.
    pub nt_response: Vec<u8>,
    /// `HMAC_MD5(NTOWFv2, challenge || client_challenge) || client_challenge`.
    pub lm_response: [u8; 24],
    /// `HMAC_MD5(NTOWFv2, NTProofStr)`.
    pub session_key: SessionKey,
}

/// Computes the NTLMv2 responses over the server challenge, echoing the
/// server's target info blob inside the `temp` structure.
pub fn ntlm_v2_responses(
    nt_owf: &NtHash,
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
    timestamp: FileTime,
    target_info: &[u8],
) -> NtlmV2Response {
    // temp: version 1.1, 6 zero bytes, timestamp, client challenge,
    // 4 zero bytes, the echoed target info, 4 zero bytes.
    let mut temp = Vec::with_capacity(28 + target_info.len() + 4);
    temp.extend_from_slice(&[0x01, 0x01]);
    temp.extend_from_slice(&[0u8; 6]);
    temp.extend_from_slice(&timestamp.to_le_bytes());
    temp.extend_from_slice(client_challenge);
    temp.extend_from_slice(&[0u8; 4]);
    temp.extend_from_slice(target_info);
    temp.extend_from_slice(&[0u8; 4]);

    let mut challenge_and_temp = Vec::with_capacity(8 + temp.len());
    challenge_and_temp.extend_from_slice(server_challenge);
    challenge_and_temp.extend_from_slice(&temp);
    let nt_proof_str = hmac_md5(nt_owf, &challenge_and_temp);

    let mut nt_response = Vec::with_capacity(16 + temp.len());
    nt_response.extend_from_slice(&nt_proof_str);
    nt_response.extend_from_slice(&temp);

    let mut challenges = [0u8; 16];
    challenges[..8].copy_from_slice(server_challenge);
    challenges[8..].copy_from_slice(client_challenge);
    let mut lm_response = [0u8; 24];
    lm_response[..16].copy_from_slice(&hmac_md5(nt_owf, &challenges));
    lm_response[16..].copy_from_slice(client_challenge);

    NtlmV2Response {
        nt_response,
        lm_response,
        session_key: hmac_md5(nt_owf, &nt_proof_str),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // [MS-NLMP] 4.2 test account: user "User", domain "Domain", password
    // "Password".
    const PASSWORD: &str = "Password";
    const USER: &str = "User";
    const DOMAIN: &str = "Domain";
    const SERVER_CHALLENGE: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
    const CLIENT_CHALLENGE: [u8; 8] = [0xaa; 8];

    #[test]
    fn test_nt_owf_v1_reference() {
        assert_eq!(
            nt_owf_v1(PASSWORD),
            [
                0xa4, 0xf4, 0x9c, 0x40, 0x65, 0x10, 0xbd, 0xca, 0xb6, 0x82, 0x4e, 0xe7, 0xc3,
                0x0f, 0xd8, 0x52
            ]
        );
    }

    #[test]
    fn test_lm_owf_v1_reference() {
        assert_eq!(
            lm_owf_v1(PASSWORD),
            [
                0xe5, 0x2c, 0xac, 0x67, 0x41, 0x9a, 0x9a, 0x22, 0x4a, 0x3b, 0x10, 0x8f, 0x3f,
                0xa6, 0xcb, 0x6d
            ]
        );
    }

    #[test]
    fn test_ntlm_v1_nt_response_reference() {
        let (nt_response, lm_response) = ntlm_v1_responses(PASSWORD, &SERVER_CHALLENGE);
        assert_eq!(
            nt_response,
            [
                0x67, 0xc4, 0x30, 0x11, 0xf3, 0x02, 0x98, 0xa2, 0xad, 0x35, 0xec, 0xe6, 0x4f,
                0x16, 0x33, 0x1c, 0x44, 0xbd, 0xbe, 0xd9, 0x27, 0x84, 0x1f, 0x94
            ]
        );
        assert_eq!(
            lm_response,
            [
                0x98, 0xde, 0xf7, 0xb8, 0x7f, 0x88, 0xaa, 0x5d, 0xaf, 0xe2, 0xdf, 0x77, 0x96,
                0x88, 0xa1, 0x72, 0xde, 0xf1, 0x1c, 0x7d, 0x5c, 0xcd, 0xef, 0x13
            ]
        );
    }

    #[test]
    fn test_nt_owf_v2_reference() {
        assert_eq!(
            nt_owf_v2(PASSWORD, USER, DOMAIN),
            [
                0x0c, 0x86, 0x8a, 0x40, 0x3b, 0xfd, 0x7a, 0x93, 0xa3, 0x00, 0x1e, 0xf2, 0x2e,
                0xf0, 0x2e, 0x3f
            ]
        );
    }

    #[test]
    fn test_nt_owf_v2_user_case_insensitive() {
        assert_eq!(
            nt_owf_v2(PASSWORD, "user", DOMAIN),
            nt_owf_v2(PASSWORD, "USER", DOMAIN)
        );
        // Domain casing is preserved verbatim.
        assert_ne!(
            nt_owf_v2(PASSWORD, USER, "domain"),
            nt_owf_v2(PASSWORD, USER, "DOMAIN")
        );
    }

    #[test]
    fn test_ntlm_v2_lm_response_reference() {
        // [MS-NLMP] 4.2.4.2.1: LMv2 response for the reference inputs.
        let nt_owf = nt_owf_v2(PASSWORD, USER, DOMAIN);
        let result = ntlm_v2_responses(
            &nt_owf,
            &SERVER_CHALLENGE,
            &CLIENT_CHALLENGE,
            FileTime::from(0u64),
            &[],
        );
        assert_eq!(
            &result.lm_response[..16],
            &[
                0x86, 0xc3, 0x50, 0x97, 0xac, 0x9c, 0xec, 0x10, 0x25, 0x54, 0x76, 0x4a, 0x57,
                0xcc, 0xcc, 0x19
            ]
        );
        assert_eq!(&result.lm_response[16..], &CLIENT_CHALLENGE);
    }

    #[test]
    fn test_ntlm_v2_temp_layout() {
        let nt_owf = nt_owf_v2(PASSWORD, USER, DOMAIN);
        let target_info = [0x02, 0x00, 0x04, 0x00, 0x41, 0x00, 0x42, 0x00, 0x00, 0x00, 0x00, 0x00];
        let timestamp = FileTime::from(132232032000000000u64);
        let result = ntlm_v2_responses(
            &nt_owf,
            &SERVER_CHALLENGE,
            &CLIENT_CHALLENGE,
            timestamp,
            &target_info,
        );

        let temp = &result.nt_response[16..];
        assert_eq!(&temp[..2], &[0x01, 0x01]);
        assert_eq!(&temp[2..8], &[0u8; 6]);
        assert_eq!(&temp[8..16], &timestamp.to_le_bytes());
        assert_eq!(&temp[16..24], &CLIENT_CHALLENGE);
        assert_eq!(&temp[24..28], &[0u8; 4]);
        assert_eq!(&temp[28..28 + target_info.len()], &target_info);
        assert_eq!(&temp[28 + target_info.len()..], &[0u8; 4]);

        // The session key binds the proof string.
        let nt_proof: [u8; 16] = result.nt_response[..16].try_into().unwrap();
        let mut mac = <HmacMd5 as Mac>::new_from_slice(&nt_owf).unwrap();
        mac.update(&nt_proof);
        let expected: [u8; 16] = mac.finalize().into_bytes().into();
        assert_eq!(result.session_key, expected);
    }
}
