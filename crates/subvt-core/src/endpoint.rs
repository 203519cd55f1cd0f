//! Backend endpoint addressing.
//!
//! Endpoint format: `[scheme://]host:port`
//!
//! Supported schemes:
//! - `wss` - TLS WebSocket (default when no scheme is given)
//! - `ws` - plain WebSocket (local development)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A feed endpoint: host, port and whether the connection uses TLS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
    tls: bool,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
        }
    }

    /// Create a TLS endpoint.
    pub fn secure(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, true)
    }

    /// Create a plain-text endpoint.
    pub fn plain(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, false)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// WebSocket URL for this endpoint.
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tls, rest) = match s.split_once("://") {
            Some(("wss", rest)) => (true, rest),
            Some(("ws", rest)) => (false, rest),
            Some((scheme, _)) => return Err(EndpointParseError::UnknownScheme(scheme.to_string())),
            None => (true, s),
        };

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(s.to_string()))?;

        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost);
        }

        let port = port
            .parse()
            .map_err(|_| EndpointParseError::InvalidPort(port.to_string()))?;

        Ok(Self::new(host, port, tls))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

/// Error parsing an endpoint string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    #[error("endpoint must contain a ':port' suffix, got: {0}")]
    MissingPort(String),
    #[error("endpoint host cannot be empty")]
    EmptyHost,
    #[error("invalid endpoint port: {0}")]
    InvalidPort(String),
    #[error("unsupported endpoint scheme: {0}")]
    UnknownScheme(String),
}
