//! Gateway configuration with validation and environment overrides.

use crate::auth::AuthConfig;
use crate::enrich::EnrichmentMode;
use queue_rpc::BrokerConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Broker connection configuration
    pub broker: BrokerConfig,
    /// Bearer-token verification for protected routes
    pub auth: AuthConfig,
    /// Enrichment fan-out configuration
    pub enrichment: EnrichmentConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            broker: BrokerConfig::default(),
            auth: AuthConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 3001)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3001,
        }
    }
}

/// Enrichment fan-out configuration.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Responsibility split for the sub-queries
    pub mode: EnrichmentMode,
    /// Per-sub-query deadline
    pub timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            mode: EnrichmentMode::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    /// Build from defaults with environment overrides applied:
    /// `BROKER_URL`, `HTTP_PORT`, `AUTH_TOKEN`, `ENRICHMENT_MODE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("BROKER_URL") {
            config.broker.url = url;
        }
        if let Ok(port) = std::env::var("HTTP_PORT") {
            config.http.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("HTTP_PORT {port:?} is not a port")))?;
        }
        if let Ok(token) = std::env::var("AUTH_TOKEN") {
            config.auth.token = Some(token);
        }
        if let Ok(mode) = std::env::var("ENRICHMENT_MODE") {
            config.enrichment.mode = mode.parse().map_err(ConfigError::Invalid)?;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.url.is_empty() {
            return Err(ConfigError::Invalid("broker URL cannot be empty".into()));
        }
        if self.enrichment.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "enrichment timeout cannot be 0".into(),
            ));
        }
        if let Some(token) = &self.auth.token {
            if token.is_empty() {
                return Err(ConfigError::Invalid("auth token cannot be empty".into()));
            }
        }
        Ok(())
    }

    /// HTTP server bind address.
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
