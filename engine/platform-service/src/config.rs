//! Service configuration management
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! then `PLATFORM__SECTION__KEY` environment variables. A `.env` file in the
//! working directory is loaded into the environment before the layers are read.

use account_service::{AccountServiceConfig, StorageBackend};
use anyhow::{Context, Result};
use game_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "PLATFORM";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Ledger and storage configuration
    pub ledger: AccountServiceConfig,

    /// Buffalo gateway configuration
    pub gateway: GatewayConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Enable development mode (more verbose logging, in-memory ledger allowed)
    pub development_mode: bool,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { development_mode: false, shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Load configuration from files and environment variables
pub fn load_config(config_file: Option<&Path>) -> Result<ServiceConfig> {
    if let Err(e) = dotenv::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let mut builder = ::config::Config::builder().add_source(
        ::config::Config::try_from(&ServiceConfig::default())
            .context("Failed to build default configuration")?,
    );

    if let Some(path) = config_file {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {:?}", path);
        }
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(::config::File::from(path.to_path_buf()));
    }

    let config: ServiceConfig = builder
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.ledger.backend == StorageBackend::Memory && !config.service.development_mode {
        return Err(anyhow::anyhow!("The in-memory ledger is only allowed in development mode"));
    }

    if config.gateway.auth.is_placeholder() && !config.service.development_mode {
        return Err(anyhow::anyhow!(
            "gateway.auth.operator_api_key is still the placeholder; set PLATFORM__GATEWAY__AUTH__OPERATOR_API_KEY"
        ));
    }

    config.ledger.validate().context("Invalid ledger configuration")?;
    config.gateway.validate().context("Invalid gateway configuration")?;

    Ok(())
}

/// Save configuration to a file
pub fn save_config(config: &ServiceConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

/// Default location of the configuration file, if one is present
pub fn default_config_path() -> Option<PathBuf> {
    let path = PathBuf::from("config/platform.toml");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.service.development_mode = true;
        config.ledger.backend = StorageBackend::Memory;
        config.gateway.auth.operator_api_key = "file-key".to_string();
        config
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.toml");
        save_config(&dev_config(), &path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.ledger.backend, StorageBackend::Memory);
        assert_eq!(loaded.gateway.auth.operator_api_key, "file-key");
        assert_eq!(loaded.gateway.site.prefix, "gcc");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.toml");
        std::fs::write(
            &path,
            "[service]\ndevelopment_mode = true\n\n[ledger]\nbackend = \"memory\"\nledger_timeout_ms = 250\n",
        )
        .unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.ledger.ledger_timeout_ms, 250);
        assert_eq!(loaded.ledger.history_limit, 100);
        assert_eq!(loaded.logging.level, "info");
        assert_eq!(loaded.gateway.provider.game_id, 23);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/platform.toml"))).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(validate_config(&dev_config()).is_ok());

        let mut config = dev_config();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = dev_config();
        config.service.development_mode = false;
        assert!(validate_config(&config).is_err());

        let mut config = dev_config();
        config.gateway.site.prefix = "toolong".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_placeholder_operator_key_only_in_development() {
        let config = ServiceConfig::default();
        assert!(config.gateway.auth.is_placeholder());
        assert!(validate_config(&config).is_err());

        let mut config = ServiceConfig::default();
        config.gateway.auth.operator_api_key = "prod-operator-key".to_string();
        assert!(validate_config(&config).is_ok());

        let mut config = dev_config();
        config.gateway.auth.operator_api_key = game_gateway::config::PLACEHOLDER_API_KEY.to_string();
        assert!(validate_config(&config).is_ok());

        let mut config = ServiceConfig::default();
        config.gateway.auth.operator_api_key = String::new();
        config.service.development_mode = true;
        assert!(validate_config(&config).is_err());
    }
}
