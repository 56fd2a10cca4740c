use std::time::Duration;

use crate::ntlm::NtlmVersion;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP port of the server.
    pub port: u16,
    /// How long to wait for the TCP connection to be established.
    pub connect_timeout: Duration,
    /// Per-request response deadline.
    pub request_timeout: Duration,
    /// Overrides the server-driven NTLM version auto-detection.
    pub force_ntlm_version: Option<NtlmVersion>,
    /// The workstation name sent in the NTLM exchange. Defaults to the
    /// local host's short name, uppercased.
    pub workstation: Option<String>,
}

impl ClientConfig {
    pub const DEFAULT_PORT: u16 = 445;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// The workstation name to use: the configured override, or the local
    /// short host name uppercased.
    pub fn workstation_name(&self) -> String {
        match &self.workstation {
            Some(name) => name.to_uppercase(),
            None => local_workstation_name(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            port: Self::DEFAULT_PORT,
            connect_timeout: Self::DEFAULT_TIMEOUT,
            request_timeout: Self::DEFAULT_TIMEOUT,
            force_ntlm_version: None,
            workstation: None,
        }
    }
}

/// The local short host name, uppercased, from the usual environment
/// variables, or a fixed fallback.
fn local_workstation_name() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .map(|name| {
            name.split('.')
                .next()
                .unwrap_or(name.as_str())
                .to_uppercase()
        })
        .unwrap_or_else(|_| "WORKSTATION".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 445);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.force_ntlm_version.is_none());
    }

    #[test]
    fn test_workstation_override_uppercased() {
        let config = ClientConfig {
            workstation: Some("my-laptop".to_string()),
            ..Default::default()
        };
        assert_eq!(config.workstation_name(), "MY-LAPTOP");
    }
}
