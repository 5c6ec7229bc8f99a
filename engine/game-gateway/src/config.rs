//! Configuration for the GameGateway

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Shipped operator key; only acceptable in development
pub const PLACEHOLDER_API_KEY: &str = "change-me";

/// Main configuration for the GameGateway
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Site identity used for provider credentials
    pub site: SiteConfig,

    /// Buffalo provider configuration
    pub provider: ProviderConfig,

    /// Operator authentication
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

/// Site identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Three-character UID prefix
    pub prefix: String,

    /// Site URL mixed into UID padding and tokens
    pub url: String,

    /// Fixed label appended when deriving tokens
    pub token_label: String,
}

/// Buffalo provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the game launcher
    pub launch_base_url: String,

    /// Provider game id passed on launch
    pub game_id: u32,

    /// Lobby URL used when the caller gives none
    pub default_lobby_url: String,
}

/// Operator authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Value expected in the `x-api-key` header of operator endpoints
    pub operator_api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            prefix: "gcc".to_string(),
            url: "https://ag.goldencitycasino123.site".to_string(),
            token_label: "buffalo-persistent-token".to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            launch_base_url: "http://prime7.wlkfkskakdf.com/".to_string(),
            game_id: 23,
            default_lobby_url: "https://africanbuffalo.vip".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { operator_api_key: PLACEHOLDER_API_KEY.to_string() }
    }
}

impl AuthConfig {
    /// Whether the operator key is still the shipped placeholder
    pub fn is_placeholder(&self) -> bool {
        self.operator_api_key.trim() == PLACEHOLDER_API_KEY
    }
}

impl GatewayConfig {
    /// Get the server address
    pub fn server_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid server address: {}", e)))
    }

    /// Load configuration from file
    pub fn load_from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| GatewayError::Config(format!("Failed to read config: {}", e)))?;
        let config: GatewayConfig = toml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> GatewayResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GatewayError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| GatewayError::Config(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.site.prefix.len() != crate::uid::PREFIX_LEN
            || !self.site.prefix.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(GatewayError::Config(format!(
                "site.prefix must be {} ASCII alphanumeric characters",
                crate::uid::PREFIX_LEN
            )));
        }
        if self.site.url.is_empty() {
            return Err(GatewayError::Config("site.url must not be empty".to_string()));
        }
        if self.auth.operator_api_key.trim().is_empty() {
            return Err(GatewayError::Config("auth.operator_api_key must not be empty".to_string()));
        }
        if self.provider.launch_base_url.is_empty() {
            return Err(GatewayError::Config(
                "provider.launch_base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
