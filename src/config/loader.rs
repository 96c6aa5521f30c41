//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{GatekeeperConfig, Profile};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values from the command line or environment that win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub profile: Option<Profile>,
    pub bind_address: Option<String>,
    pub secret: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut GatekeeperConfig) {
        if let Some(profile) = self.profile {
            config.profile = profile;
        }
        if let Some(bind_address) = self.bind_address {
            config.server.bind_address = bind_address;
        }
        if let Some(secret) = self.secret {
            config.auth.secret = secret;
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatekeeperConfig, ConfigError> {
    resolve_config(Some(path), ConfigOverrides::default())
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatekeeperConfig, ConfigError> {
    let mut config: GatekeeperConfig = toml::from_str(content)?;
    finish(&mut config, ConfigOverrides::default())?;
    Ok(config)
}

/// Read the file (or start from defaults), apply `overrides`, then validate
/// the merged result once.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<GatekeeperConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => GatekeeperConfig::default(),
    };
    finish(&mut config, overrides)?;
    Ok(config)
}

fn finish(config: &mut GatekeeperConfig, overrides: ConfigOverrides) -> Result<(), ConfigError> {
    overrides.apply(config);
    validate_config(config).map_err(ConfigError::Validation)
}
