//! Session state: the authentication lifecycle, the derived key set, and
//! the encryption enablement policy.

use crate::crypto::{derive_session_keys, make_encrypting_algo, make_signing_algo, KeyToDerive};
use crate::packets::smb2::SessionFlags;

use super::{MessageDecryptor, MessageEncryptor, MessageSigner};

/// The signing and encryption algorithm instances of a session. All three
/// are present together (SMB 3.x with an NTLMv2 session key) or absent
/// together.
#[derive(Debug)]
struct SessionAlgos {
    signer: MessageSigner,
    encryptor: MessageEncryptor,
    decryptor: MessageDecryptor,
}

impl SessionAlgos {
    fn build(session_key: &KeyToDerive) -> crate::Result<SessionAlgos> {
        let keys = derive_session_keys(session_key)?;
        Ok(SessionAlgos {
            signer: MessageSigner::new(make_signing_algo(&keys.signing)?),
            encryptor: MessageEncryptor::new(make_encrypting_algo(&keys.encryption)?),
            decryptor: MessageDecryptor::new(make_encrypting_algo(&keys.decryption)?),
        })
    }
}

#[derive(Debug)]
enum SessionState {
    /// Authentication is in flight; keys may already be derived so the
    /// final setup response can be verified.
    SettingUp { algos: Option<SessionAlgos> },
    /// Authenticated and usable.
    Ready {
        algos: Option<SessionAlgos>,
        flags: SessionFlags,
        encryption_enabled: bool,
    },
    /// Logged off; refuses everything.
    LoggedOff,
}

/// Per-session state shared between the session handler and the
/// connection's transformer. One instance per session, behind a lock.
#[derive(Debug)]
pub struct SessionInfo {
    session_id: u64,
    state: SessionState,
}

impl SessionInfo {
    pub fn new(session_id: u64) -> SessionInfo {
        SessionInfo {
            session_id,
            state: SessionState::SettingUp { algos: None },
        }
    }

    pub fn id(&self) -> u64 {
        self.session_id
    }

    /// Derives the session keys from the NTLMv2 session key. Must happen
    /// before the final session setup exchange, while still setting up.
    pub fn setup_keys(&mut self, session_key: &KeyToDerive) -> crate::Result<()> {
        match &mut self.state {
            SessionState::SettingUp { algos } => {
                *algos = Some(SessionAlgos::build(session_key)?);
                log::trace!("Session {} keys derived.", self.session_id);
                Ok(())
            }
            _ => Err(crate::Error::InvalidState(
                "keys can only be derived while setting up".to_string(),
            )),
        }
    }

    /// Transitions to the authenticated state. Encryption is switched on
    /// when the server advertised the capability, or when the session
    /// flags demand it; either way it requires the derived keys.
    pub fn ready(
        &mut self,
        flags: SessionFlags,
        server_supports_encryption: bool,
    ) -> crate::Result<()> {
        if !matches!(self.state, SessionState::SettingUp { .. }) {
            return Err(crate::Error::InvalidState(
                "session is not setting up".to_string(),
            ));
        }
        if flags.encrypt_data() && !self.has_keys() {
            return Err(crate::Error::CryptoError(
                crate::crypto::CryptoError::MissingKeys,
            ));
        }

        let algos = match std::mem::replace(&mut self.state, SessionState::LoggedOff) {
            SessionState::SettingUp { algos } => algos,
            _ => unreachable!(),
        };
        let encryption_enabled =
            algos.is_some() && (server_supports_encryption || flags.encrypt_data());

        self.state = SessionState::Ready {
            algos,
            flags,
            encryption_enabled,
        };
        log::debug!(
            "Session {} ready, encryption enabled: {}.",
            self.session_id,
            encryption_enabled
        );
        Ok(())
    }

    /// Marks the session unusable (logoff or teardown).
    pub fn invalidate(&mut self) {
        log::debug!("Invalidating session {}.", self.session_id);
        self.state = SessionState::LoggedOff;
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.state, SessionState::LoggedOff)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready { .. })
    }

    /// Whether the derived key set is present.
    pub fn has_keys(&self) -> bool {
        match &self.state {
            SessionState::SettingUp { algos } => algos.is_some(),
            SessionState::Ready { algos, .. } => algos.is_some(),
            SessionState::LoggedOff => false,
        }
    }

    /// Whether outgoing messages must be wrapped in Transform envelopes.
    pub fn should_encrypt(&self) -> bool {
        matches!(
            self.state,
            SessionState::Ready {
                encryption_enabled: true,
                ..
            }
        )
    }

    /// Turns encryption on for all further traffic. Fails without keys.
    pub fn enable_encryption(&mut self) -> crate::Result<()> {
        match &mut self.state {
            SessionState::Ready {
                algos: Some(_),
                encryption_enabled,
                ..
            } => {
                if !*encryption_enabled {
                    log::info!("Enabling encryption for session {}.", self.session_id);
                    *encryption_enabled = true;
                }
                Ok(())
            }
            SessionState::Ready { algos: None, .. } => Err(crate::Error::CryptoError(
                crate::crypto::CryptoError::MissingKeys,
            )),
            _ => Err(crate::Error::InvalidState(
                "session is not ready".to_string(),
            )),
        }
    }

    /// Whether the AccessDenied retry policy may enable encryption here:
    /// keys are present but encryption is off.
    pub fn can_enable_encryption(&self) -> bool {
        matches!(
            self.state,
            SessionState::Ready {
                algos: Some(_),
                encryption_enabled: false,
                ..
            }
        )
    }

    pub fn signer(&self) -> Option<&MessageSigner> {
        match &self.state {
            SessionState::SettingUp { algos } | SessionState::Ready { algos, .. } => {
                algos.as_ref().map(|a| &a.signer)
            }
            SessionState::LoggedOff => None,
        }
    }

    pub fn encryptor(&self) -> Option<&MessageEncryptor> {
        match &self.state {
            SessionState::SettingUp { algos } | SessionState::Ready { algos, .. } => {
                algos.as_ref().map(|a| &a.encryptor)
            }
            SessionState::LoggedOff => None,
        }
    }

    pub fn decryptor(&self) -> Option<&MessageDecryptor> {
        match &self.state {
            SessionState::SettingUp { algos } | SessionState::Ready { algos, .. } => {
                algos.as_ref().map(|a| &a.decryptor)
            }
            SessionState::LoggedOff => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_KEY: KeyToDerive = [0x3c; 16];

    #[test]
    fn test_lifecycle_with_keys() {
        let mut info = SessionInfo::new(7);
        assert!(!info.has_keys());
        info.setup_keys(&SESSION_KEY).unwrap();
        assert!(info.has_keys());
        assert!(info.signer().is_some());
        assert!(!info.should_encrypt());

        info.ready(SessionFlags::new(), true).unwrap();
        assert!(info.is_ready());
        // Keys + server capability => encryption on.
        assert!(info.should_encrypt());

        info.invalidate();
        assert!(info.is_invalid());
        assert!(info.signer().is_none());
    }

    #[test]
    fn test_no_keys_no_encryption() {
        let mut info = SessionInfo::new(8);
        info.ready(SessionFlags::new(), true).unwrap();
        assert!(!info.should_encrypt());
        assert!(!info.can_enable_encryption());
        assert!(info.enable_encryption().is_err());
    }

    #[test]
    fn test_adaptive_enable() {
        let mut info = SessionInfo::new(9);
        info.setup_keys(&SESSION_KEY).unwrap();
        // Server did not advertise the encryption capability.
        info.ready(SessionFlags::new(), false).unwrap();
        assert!(!info.should_encrypt());
        assert!(info.can_enable_encryption());

        info.enable_encryption().unwrap();
        assert!(info.should_encrypt());
        assert!(!info.can_enable_encryption());
    }

    #[test]
    fn test_encrypt_data_flag_requires_keys() {
        let mut info = SessionInfo::new(10);
        let flags = SessionFlags::new().with_encrypt_data(true);
        assert!(info.ready(flags, false).is_err());
    }

    #[test]
    fn test_keys_after_ready_rejected() {
        let mut info = SessionInfo::new(11);
        info.ready(SessionFlags::new(), false).unwrap();
        assert!(info.setup_keys(&SESSION_KEY).is_err());
    }
}
