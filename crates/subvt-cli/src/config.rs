//! Engine timeouts and the network catalogue.

use serde::{Deserialize, Serialize};
use std::path::Path;
use subvt_client::{EngineConfig, Endpoint};
use subvt_core::EndpointParseError;
use subvt_feeds::{Balance, FeedKind};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("network {network}: invalid {service} endpoint: {source}")]
    Endpoint {
        network: String,
        service: &'static str,
        #[source]
        source: EndpointParseError,
    },
    #[error("network {network}: token_decimals {decimals} exceeds {max}", max = Balance::MAX_DECIMALS)]
    TokenDecimals { network: String, decimals: u32 },
    #[error("network {0:?} is not in the catalogue")]
    UnknownNetwork(String),
    #[error("the network catalogue is empty")]
    NoNetworks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default = "default_networks")]
    pub networks: Vec<NetworkConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            networks: default_networks(),
        }
    }
}

/// One network and the services it exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub token_ticker: String,
    pub token_decimals: u32,
    pub network_status: ServiceEndpoint,
    pub validator_list: ServiceEndpoint,
    pub validator_details: ServiceEndpoint,
    pub report: ServiceEndpoint,
    pub app_service: ServiceEndpoint,
}

/// A `host:port` address and whether it is reached over TLS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub address: String,
    #[serde(default = "default_tls")]
    pub tls: bool,
}

fn default_tls() -> bool {
    true
}

fn default_networks() -> Vec<NetworkConfig> {
    let local = |port: u16| ServiceEndpoint {
        address: format!("127.0.0.1:{port}"),
        tls: false,
    };
    vec![NetworkConfig {
        name: "local".to_string(),
        token_ticker: "DOT".to_string(),
        token_decimals: 10,
        network_status: local(7888),
        validator_list: local(7888),
        validator_details: local(7888),
        report: local(7900),
        app_service: local(7901),
    }]
}

impl ServiceEndpoint {
    pub fn endpoint(&self) -> Result<Endpoint, EndpointParseError> {
        let parsed: Endpoint = self.address.parse()?;
        Ok(Endpoint::new(parsed.host(), parsed.port(), self.tls))
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and check every endpoint in the catalogue.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        if config.networks.is_empty() {
            return Err(ConfigError::NoNetworks);
        }
        for network in &config.networks {
            network.validate()?;
        }
        Ok(config)
    }

    /// The named network, or the first one in the catalogue.
    pub fn network(&self, name: Option<&str>) -> Result<&NetworkConfig, ConfigError> {
        match name {
            Some(name) => self
                .networks
                .iter()
                .find(|n| n.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string())),
            None => self.networks.first().ok_or(ConfigError::NoNetworks),
        }
    }
}

impl NetworkConfig {
    fn services(&self) -> [(&'static str, &ServiceEndpoint); 5] {
        [
            ("network_status", &self.network_status),
            ("validator_list", &self.validator_list),
            ("validator_details", &self.validator_details),
            ("report", &self.report),
            ("app_service", &self.app_service),
        ]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_decimals > Balance::MAX_DECIMALS {
            return Err(ConfigError::TokenDecimals {
                network: self.name.clone(),
                decimals: self.token_decimals,
            });
        }
        for (service, endpoint) in self.services() {
            endpoint.endpoint().map_err(|source| ConfigError::Endpoint {
                network: self.name.clone(),
                service,
                source,
            })?;
        }
        Ok(())
    }

    /// Endpoint serving the given feed.
    pub fn feed_endpoint(&self, kind: FeedKind) -> Result<Endpoint, ConfigError> {
        let (service, endpoint) = match kind {
            FeedKind::NetworkStatus => ("network_status", &self.network_status),
            FeedKind::ValidatorList => ("validator_list", &self.validator_list),
            FeedKind::ValidatorDetails => ("validator_details", &self.validator_details),
        };
        endpoint.endpoint().map_err(|source| ConfigError::Endpoint {
            network: self.name.clone(),
            service,
            source,
        })
    }

    /// Every service with its resolved endpoint, for listing.
    pub fn endpoints(&self) -> Vec<(&'static str, Result<Endpoint, EndpointParseError>)> {
        self.services()
            .into_iter()
            .map(|(service, endpoint)| (service, endpoint.endpoint()))
            .collect()
    }
}
