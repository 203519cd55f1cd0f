use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts applied by a [`crate::SubscriptionEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound on opening a channel.
    pub connect_timeout_ms: u64,
    /// Bound on waiting for the initial snapshot after a subscribe request.
    pub handshake_timeout_ms: u64,
    /// How long an unacknowledged unsubscribe keeps an idle channel open.
    pub unsubscribe_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            unsubscribe_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn unsubscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.unsubscribe_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"handshake_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.handshake_timeout(), Duration::from_millis(250));
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.unsubscribe_timeout_ms, 5_000);
    }
}
