//! Client configuration.

/// Configuration for joining a relay.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL (e.g., "wss://relay:8080" or "ws://localhost:8080")
    pub relay_url: String,
    /// Participant name to register as
    pub username: String,
    /// Allow insecure ws:// connections (for localhost development only)
    pub insecure_dev: bool,
}

impl ClientConfig {
    /// Create a configuration that requires `wss://`.
    pub fn new(relay_url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            username: username.into(),
            insecure_dev: false,
        }
    }

    /// Allow insecure ws:// connections (for localhost development only).
    ///
    /// # Security Warning
    ///
    /// Envelopes and plaintext echoes then travel unencrypted between the
    /// client and the relay. Only use for local testing.
    pub fn with_insecure_dev(mut self) -> Self {
        self.insecure_dev = true;
        self
    }

    /// Whether the URL scheme is acceptable under this configuration.
    pub(crate) fn scheme_allowed(&self) -> bool {
        self.relay_url.starts_with("wss://")
            || (self.insecure_dev && self.relay_url.starts_with("ws://"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wss_required_by_default() {
        assert!(!ClientConfig::new("ws://localhost:8080", "Alice").scheme_allowed());
        assert!(ClientConfig::new("wss://relay:8080", "Alice").scheme_allowed());
    }

    #[test]
    fn test_insecure_dev_allows_ws() {
        let config = ClientConfig::new("ws://localhost:8080", "Alice").with_insecure_dev();
        assert!(config.scheme_allowed());
        assert!(!ClientConfig::new("http://x", "Alice")
            .with_insecure_dev()
            .scheme_allowed());
    }
}
