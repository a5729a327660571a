//! Configuration for the rotation handler

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment prefix for layered configuration, e.g. `ASTRA_ROTATION__ASTRA__TIMEOUT_SECONDS`.
pub const ENV_PREFIX: &str = "ASTRA_ROTATION";

/// Endpoint override honoured by earlier deployments of the rotation function.
pub const LEGACY_ENDPOINT_ENV: &str = "SECRETS_MANAGER_ENDPOINT";

pub const DEFAULT_ASTRA_BASE_URL: &str = "https://api.astra.datastax.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Token authority connection settings
    pub astra: AstraApiConfig,

    /// Secret store connection settings
    pub secrets_manager: AwsSecretsManagerConfig,

    /// Audit configuration
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AstraApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSecretsManagerConfig {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
}

impl Default for AstraApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ASTRA_BASE_URL.to_string(),
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Build the layered sources: optional file, then `ASTRA_ROTATION__*` variables.
///
/// Without an explicit path, `astra-rotation.{toml,yaml,json}` in the working
/// directory is read if present.
pub fn layered_settings(path: Option<&Path>) -> Result<::config::Config> {
    let mut builder = ::config::Config::builder();

    builder = match path {
        Some(path) => builder.add_source(::config::File::from(path).required(true)),
        None => builder.add_source(::config::File::with_name("astra-rotation").required(false)),
    };

    let settings = builder
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings)
}

impl RotationConfig {
    /// Load configuration from defaults, an optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_settings(&layered_settings(path)?)
    }

    /// Extract this crate's sections from already-built settings.
    pub fn from_settings(settings: &::config::Config) -> Result<Self> {
        let mut loaded: RotationConfig = settings.clone().try_deserialize()?;
        loaded.apply_legacy_env(std::env::var(LEGACY_ENDPOINT_ENV).ok());
        Ok(loaded)
    }

    fn apply_legacy_env(&mut self, endpoint: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.secrets_manager.endpoint_url = Some(endpoint);
        }
    }
}
