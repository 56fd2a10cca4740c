//! NTLMSSP message structures ([MS-NLMP] 2.2): the Negotiate (type 1),
//! Challenge (type 2) and Authenticate (type 3) messages, and the AV_PAIR
//! target info records.
//!
//! All buffer fields use the length/max-length/offset descriptor layout,
//! with offsets measured from the start of the NTLMSSP signature.

use std::io::{Cursor, SeekFrom};

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::packets::binrw_util::prelude::*;

/// The NTLMSSP negotiate flags word.
#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct NegotiateFlags {
    pub unicode: bool,
    pub oem: bool,
    pub request_target: bool,
    #[skip]
    __: B1,
    pub sign: bool,
    pub seal: bool,
    pub datagram: bool,
    pub lm_key: bool,

    #[skip]
    __: B1,
    pub ntlm_session_security: bool,
    #[skip]
    __: B1,
    pub anonymous: bool,
    pub oem_domain_supplied: bool,
    pub oem_workstation_supplied: bool,
    #[skip]
    __: B1,
    pub always_sign: bool,

    pub target_type_domain: bool,
    pub target_type_server: bool,
    #[skip]
    __: B1,
    pub extended_session_security: bool,
    pub identify: bool,
    #[skip]
    __: B1,
    pub request_non_nt_session_key: bool,
    pub target_info: bool,

    #[skip]
    __: B1,
    pub version: bool,
    #[skip]
    __: B3,
    pub use_128: bool,
    pub key_exchange: bool,
    pub use_56: bool,
}

/// The 8-byte version field sent when the Version flag is set.
pub const CLIENT_VERSION: [u8; 8] = [0x0a, 0x00, 0x5d, 0x58, 0x00, 0x00, 0x00, 0x0f];

/// NTLMSSP type 1: opens the exchange with the client's capabilities and
/// its ASCII workstation and domain names.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
#[brw(little, magic(b"NTLMSSP\x00"))]
pub struct NegotiateMessage {
    #[bw(calc = 1)]
    #[br(assert(_message_type == 1))]
    _message_type: u32,
    pub flags: NegotiateFlags,
    #[bw(try_calc = domain.size().try_into())]
    domain_length: u16,
    #[bw(try_calc = domain.size().try_into())]
    _domain_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _domain_offset: PosMarker<u32>,
    #[bw(try_calc = workstation.size().try_into())]
    workstation_length: u16,
    #[bw(try_calc = workstation.size().try_into())]
    _workstation_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _workstation_offset: PosMarker<u32>,
    pub version: [u8; 8],
    #[br(seek_before = SeekFrom::Start(_domain_offset.value as u64), args(domain_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_domain_offset))]
    pub domain: SizedAnsiString,
    #[br(seek_before = SeekFrom::Start(_workstation_offset.value as u64), args(workstation_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_workstation_offset))]
    pub workstation: SizedAnsiString,
}

/// NTLMSSP type 2: the server's challenge, negotiate flags, and target
/// info blob.
#[binrw::binrw]
#[derive(Debug)]
#[brw(little, magic(b"NTLMSSP\x00"))]
pub struct ChallengeMessage {
    #[bw(calc = 2)]
    #[br(assert(_message_type == 2))]
    _message_type: u32,
    #[bw(try_calc = target_name.size().try_into())]
    target_name_length: u16,
    #[bw(try_calc = target_name.size().try_into())]
    _target_name_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _target_name_offset: PosMarker<u32>,
    pub flags: NegotiateFlags,
    pub server_challenge: [u8; 8],
    #[bw(calc = 0)]
    _reserved: u64,
    #[bw(try_calc = target_info.len().try_into())]
    target_info_length: u16,
    #[bw(try_calc = target_info.len().try_into())]
    _target_info_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _target_info_offset: PosMarker<u32>,
    // Present iff the server sets the Version flag.
    #[br(if(flags.version()))]
    pub version: Option<[u8; 8]>,
    #[br(seek_before = SeekFrom::Start(_target_name_offset.value as u64), args(target_name_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_target_name_offset))]
    pub target_name: SizedWideString,
    #[br(seek_before = SeekFrom::Start(_target_info_offset.value as u64), count = target_info_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_target_info_offset))]
    pub target_info: Vec<u8>,
}

impl ChallengeMessage {
    pub fn parse(buffer: &[u8]) -> crate::Result<ChallengeMessage> {
        ChallengeMessage::read(&mut Cursor::new(buffer)).map_err(|e| {
            crate::Error::AuthenticationFailed(format!("malformed NTLM challenge: {}", e))
        })
    }
}

/// NTLMSSP type 3: the challenge responses and the client identity. The
/// payload carries, in order: LM response, NT response, domain, user name,
/// workstation, and the (empty) encrypted session key.
#[binrw::binrw]
#[derive(Debug)]
#[brw(little, magic(b"NTLMSSP\x00"))]
pub struct AuthenticateMessage {
    #[bw(calc = 3)]
    #[br(assert(_message_type == 3))]
    _message_type: u32,
    #[bw(try_calc = lm_response.len().try_into())]
    lm_response_length: u16,
    #[bw(try_calc = lm_response.len().try_into())]
    _lm_response_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _lm_response_offset: PosMarker<u32>,
    #[bw(try_calc = nt_response.len().try_into())]
    nt_response_length: u16,
    #[bw(try_calc = nt_response.len().try_into())]
    _nt_response_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _nt_response_offset: PosMarker<u32>,
    #[bw(try_calc = domain.size().try_into())]
    domain_length: u16,
    #[bw(try_calc = domain.size().try_into())]
    _domain_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _domain_offset: PosMarker<u32>,
    #[bw(try_calc = user.size().try_into())]
    user_length: u16,
    #[bw(try_calc = user.size().try_into())]
    _user_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _user_offset: PosMarker<u32>,
    #[bw(try_calc = workstation.size().try_into())]
    workstation_length: u16,
    #[bw(try_calc = workstation.size().try_into())]
    _workstation_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _workstation_offset: PosMarker<u32>,
    #[bw(try_calc = session_key.len().try_into())]
    session_key_length: u16,
    #[bw(try_calc = session_key.len().try_into())]
    _session_key_max_length: u16,
    #[bw(calc = PosMarker::default())]
    _session_key_offset: PosMarker<u32>,
    pub flags: NegotiateFlags,
    pub version: [u8; 8],
    #[br(seek_before = SeekFrom::Start(_lm_response_offset.value as u64), count = lm_response_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_lm_response_offset))]
    pub lm_response: Vec<u8>,
    #[br(seek_before = SeekFrom::Start(_nt_response_offset.value as u64), count = nt_response_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_nt_response_offset))]
    pub nt_response: Vec<u8>,
    #[br(seek_before = SeekFrom::Start(_domain_offset.value as u64), args(domain_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_domain_offset))]
    pub domain: SizedWideString,
    #[br(seek_before = SeekFrom::Start(_user_offset.value as u64), args(user_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_user_offset))]
    pub user: SizedWideString,
    #[br(seek_before = SeekFrom::Start(_workstation_offset.value as u64), args(workstation_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_workstation_offset))]
    pub workstation: SizedWideString,
    /// Always empty; session-key exchange is not negotiated.
    #[br(seek_before = SeekFrom::Start(_session_key_offset.value as u64), count = session_key_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_session_key_offset))]
    pub session_key: Vec<u8>,
}

/// Serializes an NTLMSSP message into its transport buffer.
pub fn to_buffer<T>(message: &T) -> crate::Result<Vec<u8>>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    message.write_le(&mut cursor)?;
    Ok(cursor.into_inner())
}

/// An AV_PAIR target info record: `{2-byte id, 2-byte length, value}`.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct AvPair {
    pub av_id: u16,
    #[bw(try_calc = value.len().try_into())]
    av_len: u16,
    #[br(count = av_len)]
    pub value: Vec<u8>,
}

impl AvPair {
    pub const EOL: u16 = 0x0000;
    pub const NB_COMPUTER_NAME: u16 = 0x0001;
    pub const NB_DOMAIN_NAME: u16 = 0x0002;
    pub const DNS_COMPUTER_NAME: u16 = 0x0003;
    pub const DNS_DOMAIN_NAME: u16 = 0x0004;
    pub const TIMESTAMP: u16 = 0x0007;
}

/// Parses a target info blob into its AV_PAIR records, stopping at (and
/// including) the EOL terminator.
pub fn parse_av_pairs(target_info: &[u8]) -> crate::Result<Vec<AvPair>> {
    let mut cursor = Cursor::new(target_info);
    let mut pairs: Vec<AvPair> = Vec::new();
    loop {
        let pair = AvPair::read(&mut cursor).map_err(|e| {
            crate::Error::AuthenticationFailed(format!("malformed target info: {}", e))
        })?;
        let done = pair.av_id == AvPair::EOL;
        pairs.push(pair);
        if done {
            return Ok(pairs);
        }
    }
}

/// The server's timestamp from target info, when present.
pub fn target_info_timestamp(pairs: &[AvPair]) -> Option<FileTime> {
    pairs
        .iter()
        .find(|p| p.av_id == AvPair::TIMESTAMP && p.value.len() == 8)
        .map(|p| FileTime::from(u64::from_le_bytes(p.value[..8].try_into().unwrap())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_message_layout() {
        let msg = NegotiateMessage {
            flags: NegotiateFlags::new()
                .with_unicode(true)
                .with_ntlm_session_security(true)
                .with_always_sign(true),
            version: [0; 8],
            domain: "EXAMPLE".into(),
            workstation: "WS".into(),
        };
        let buffer = to_buffer(&msg).unwrap();

        assert_eq!(&buffer[..8], b"NTLMSSP\x00");
        assert_eq!(u32::from_le_bytes(buffer[8..12].try_into().unwrap()), 1);
        // Fixed part is 40 bytes; domain payload comes first.
        let domain_offset = u32::from_le_bytes(buffer[20..24].try_into().unwrap());
        assert_eq!(domain_offset, 40);
        assert_eq!(&buffer[40..47], b"EXAMPLE");
        let ws_offset = u32::from_le_bytes(buffer[28..32].try_into().unwrap());
        assert_eq!(ws_offset, 47);
        assert_eq!(&buffer[47..49], b"WS");
        assert_eq!(buffer.len(), 49);
    }

    #[test]
    fn test_challenge_message_roundtrip() {
        let target_info = {
            let pairs = [
                AvPair {
                    av_id: AvPair::NB_DOMAIN_NAME,
                    value: b"E\x00X\x00".to_vec(),
                },
                AvPair {
                    av_id: AvPair::TIMESTAMP,
                    value: 132232032000000000u64.to_le_bytes().to_vec(),
                },
                AvPair {
                    av_id: AvPair::EOL,
                    value: vec![],
                },
            ];
            let mut cursor = Cursor::new(Vec::new());
            for pair in &pairs {
                pair.write(&mut cursor).unwrap();
            }
            cursor.into_inner()
        };

        let msg = ChallengeMessage {
            flags: NegotiateFlags::new()
                .with_unicode(true)
                .with_extended_session_security(true)
                .with_target_info(true),
            server_challenge: [1, 2, 3, 4, 5, 6, 7, 8],
            version: None,
            target_name: "EX".into(),
            target_info: target_info.clone(),
        };
        let buffer = to_buffer(&msg).unwrap();
        // The server challenge sits at offset 24, flags at offset 20.
        assert_eq!(&buffer[24..32], &[1, 2, 3, 4, 5, 6, 7, 8]);

        let parsed = ChallengeMessage::parse(&buffer).unwrap();
        assert_eq!(parsed.server_challenge, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(parsed.flags.extended_session_security());
        assert_eq!(parsed.target_info, target_info);

        let pairs = parse_av_pairs(&parsed.target_info).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(
            target_info_timestamp(&pairs),
            Some(FileTime::from(132232032000000000u64))
        );
    }

    #[test]
    fn test_authenticate_message_roundtrip() {
        let msg = AuthenticateMessage {
            flags: NegotiateFlags::new().with_unicode(true),
            version: CLIENT_VERSION,
            lm_response: vec![0xaa; 24],
            nt_response: vec![0xbb; 62],
            domain: "Example".into(),
            user: "alice".into(),
            workstation: "WS1".into(),
            session_key: vec![],
        };
        let buffer = to_buffer(&msg).unwrap();
        assert_eq!(&buffer[..8], b"NTLMSSP\x00");
        assert_eq!(u32::from_le_bytes(buffer[8..12].try_into().unwrap()), 3);

        let parsed = AuthenticateMessage::read(&mut Cursor::new(&buffer)).unwrap();
        assert_eq!(parsed.lm_response, vec![0xaa; 24]);
        assert_eq!(parsed.nt_response, vec![0xbb; 62]);
        assert_eq!(parsed.domain.to_string(), "Example");
        assert_eq!(parsed.user.to_string(), "alice");
        assert_eq!(parsed.workstation.to_string(), "WS1");
        assert!(parsed.session_key.is_empty());
    }

    #[test]
    fn test_av_pairs_reject_truncated_blob() {
        // Missing EOL terminator.
        let data = [0x01, 0x00, 0x02, 0x00, 0x41, 0x42];
        assert!(parse_av_pairs(&data).is_err());
    }
}
