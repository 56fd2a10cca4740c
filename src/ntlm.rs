//! The NTLM authentication state machine: negotiate → challenge →
//! authenticate, carried as the opaque security blob inside SessionSetup.
//!
//! Version selection: a forced version is obeyed; otherwise the server's
//! ExtendedSessionSecurity flag in the challenge picks v2 over v1. Only the
//! v2 path yields a session key, which in turn is what unlocks SMB3 key
//! derivation.

pub mod crypto;
pub mod messages;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::packets::binrw_util::prelude::*;
use messages::*;

pub use crypto::SessionKey;

/// Which NTLM version to use, when the caller wants to override the
/// server-driven auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtlmVersion {
    V1,
    V2,
}

/// The outcome of processing the server challenge: the Type 3 buffer to
/// send, and the session key when NTLMv2 produced one.
pub struct NtlmAuthOutput {
    pub buffer: Vec<u8>,
    pub session_key: Option<SessionKey>,
}

#[derive(Debug, PartialEq, Eq)]
enum NtlmState {
    Initial,
    NegotiateSent,
    Complete,
}

/// Drives one NTLMSSP exchange for a single session setup.
pub struct NtlmAuthenticator {
    domain: String,
    username: String,
    password: String,
    /// The client's short host name, uppercased.
    workstation: String,
    force_version: Option<NtlmVersion>,
    state: NtlmState,
}

impl NtlmAuthenticator {
    pub fn new(
        domain: &str,
        username: &str,
        password: &str,
        workstation: &str,
        force_version: Option<NtlmVersion>,
    ) -> NtlmAuthenticator {
        NtlmAuthenticator {
            domain: domain.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            workstation: workstation.to_uppercase(),
            force_version,
            state: NtlmState::Initial,
        }
    }

    fn negotiate_flags(&self) -> NegotiateFlags {
        let flags = NegotiateFlags::new()
            .with_unicode(true)
            .with_ntlm_session_security(true)
            .with_always_sign(true);
        if self.force_version == Some(NtlmVersion::V1) {
            flags
        } else {
            flags
                .with_extended_session_security(true)
                .with_target_info(true)
                .with_version(true)
        }
    }

    /// Builds the Type 1 (Negotiate) buffer.
    pub fn negotiate(&mut self) -> crate::Result<Vec<u8>> {
        if self.state != NtlmState::Initial {
            return Err(crate::Error::InvalidState(
                "NTLM negotiate was already sent".to_string(),
            ));
        }

        let flags = self.negotiate_flags();
        let message = NegotiateMessage {
            flags,
            version: if flags.version() {
                CLIENT_VERSION
            } else {
                [0; 8]
            },
            domain: self.domain.as_str().into(),
            workstation: self.workstation.as_str().into(),
        };
        self.state = NtlmState::NegotiateSent;
        to_buffer(&message)
    }

    /// Processes the Type 2 (Challenge) buffer and builds the Type 3
    /// (Authenticate) response.
    pub fn authenticate(&mut self, challenge_buffer: &[u8]) -> crate::Result<NtlmAuthOutput> {
        if self.state != NtlmState::NegotiateSent {
            return Err(crate::Error::InvalidState(
                "NTLM challenge arrived out of order".to_string(),
            ));
        }

        let challenge = ChallengeMessage::parse(challenge_buffer)?;
        let version = match self.force_version {
            Some(version) => version,
            None if challenge.flags.extended_session_security() => NtlmVersion::V2,
            None => NtlmVersion::V1,
        };
        log::debug!("Authenticating with NTLM{:?}.", version);

        let (nt_response, lm_response, session_key) = match version {
            NtlmVersion::V1 => {
                let (nt, lm) =
                    crypto::ntlm_v1_responses(&self.password, &challenge.server_challenge);
                (nt.to_vec(), lm.to_vec(), None)
            }
            NtlmVersion::V2 => {
                let nt_owf = crypto::nt_owf_v2(&self.password, &self.username, &self.domain);

                let mut client_challenge = [0u8; 8];
                OsRng.fill_bytes(&mut client_challenge);

                // Prefer the server's timestamp from target info; fall back
                // to the local clock.
                let pairs = parse_av_pairs(&challenge.target_info)?;
                let timestamp = target_info_timestamp(&pairs).unwrap_or_else(FileTime::now);

                let result = crypto::ntlm_v2_responses(
                    &nt_owf,
                    &challenge.server_challenge,
                    &client_challenge,
                    timestamp,
                    &challenge.target_info,
                );
                (
                    result.nt_response,
                    result.lm_response.to_vec(),
                    Some(result.session_key),
                )
            }
        };

        let flags = self.negotiate_flags();
        let message = AuthenticateMessage {
            flags,
            version: if flags.version() {
                CLIENT_VERSION
            } else {
                [0; 8]
            },
            lm_response,
            nt_response,
            domain: self.domain.as_str().into(),
            user: self.username.as_str().into(),
            workstation: self.workstation.as_str().into(),
            session_key: vec![],
        };

        self.state = NtlmState::Complete;
        Ok(NtlmAuthOutput {
            buffer: to_buffer(&message)?,
            session_key,
        })
    }
}
