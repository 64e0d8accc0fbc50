//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::provider::model::{AuthKind, ExecutionMode, ProviderModel, Region};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub routing: RoutingSettings,
    #[serde(default)]
    pub race: RaceSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

/// Routing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingSettings {
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
    #[serde(default = "default_true")]
    pub enable_fallback: bool,
    #[serde(default = "default_max_fallbacks")]
    pub max_fallbacks: usize,
    #[serde(default)]
    pub fallback_image_providers: Vec<String>,
    #[serde(default)]
    pub fallback_video_providers: Vec<String>,
    /// Max seconds per provider attempt in the fallback chain
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
}

fn default_strategy() -> String {
    "priority".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_fallbacks() -> usize {
    2
}

fn default_provider_timeout() -> u64 {
    15
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            enable_fallback: true,
            max_fallbacks: default_max_fallbacks(),
            fallback_image_providers: Vec::new(),
            fallback_video_providers: Vec::new(),
            provider_timeout_secs: default_provider_timeout(),
        }
    }
}

/// Race engine timing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RaceSettings {
    #[serde(default = "default_soft_timeout")]
    pub soft_timeout_secs: u64,
    #[serde(default = "default_stagger_interval")]
    pub stagger_interval_secs: u64,
    #[serde(default = "default_overall_timeout")]
    pub overall_timeout_secs: u64,
}

fn default_soft_timeout() -> u64 {
    30
}

fn default_stagger_interval() -> u64 {
    10
}

fn default_overall_timeout() -> u64 {
    120
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            soft_timeout_secs: default_soft_timeout(),
            stagger_interval_secs: default_stagger_interval(),
            overall_timeout_secs: default_overall_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Credential and signing configuration for one provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderAuthSettings {
    #[serde(default = "default_auth_kind")]
    pub kind: AuthKind,
    #[serde(default)]
    pub api_key: String,
    /// Access key id for HMAC / SigV4 signing
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Header name when kind = api_key_header
    #[serde(default = "default_header_name")]
    pub header_name: String,
    /// Region and service for SigV4 signing
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub service: String,
}

fn default_auth_kind() -> AuthKind {
    AuthKind::Bearer
}

fn default_header_name() -> String {
    "X-API-Key".to_string()
}

impl Default for ProviderAuthSettings {
    fn default() -> Self {
        Self {
            kind: default_auth_kind(),
            api_key: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            header_name: default_header_name(),
            region: String::new(),
            service: String::new(),
        }
    }
}

/// Configuration for one provider adapter
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSettings {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// "sync" or "async_task"
    #[serde(default = "default_execution_mode")]
    pub kind: ExecutionMode,
    pub base_url: String,
    #[serde(default = "default_generate_path")]
    pub generate_path: String,
    /// Status path template for async-task adapters; `{task_id}` is
    /// substituted at poll time
    #[serde(default = "default_status_path")]
    pub status_path: String,
    #[serde(default)]
    pub auth: ProviderAuthSettings,
    #[serde(default = "default_provider_region")]
    pub region: Region,
    /// Lower = higher priority
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub models: Vec<ProviderModel>,
}

fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Sync
}

fn default_generate_path() -> String {
    "/v1/images/generations".to_string()
}

fn default_status_path() -> String {
    "/v1/tasks/{task_id}".to_string()
}

fn default_provider_region() -> Region {
    Region::Global
}

fn default_request_timeout() -> u64 {
    60
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("routing.default_strategy", "priority")?
            .set_default("routing.enable_fallback", true)?
            .set_default("routing.max_fallbacks", 2)?
            .set_default("routing.provider_timeout_secs", 15)?
            .set_default("race.soft_timeout_secs", 30)?
            .set_default("race.stagger_interval_secs", 10)?
            .set_default("race.overall_timeout_secs", 120)?
            // Load from configuration file
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with GEN_ROUTER_)
            .add_source(
                Environment::with_prefix("GEN_ROUTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.routing
            .default_strategy
            .parse::<crate::routing::router::RoutingStrategy>()
            .map_err(|e| AppError::Config(config::ConfigError::Message(e)))?;

        if self.race.overall_timeout_secs == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "Overall timeout cannot be 0".to_string(),
            )));
        }
        if self.race.soft_timeout_secs > self.race.overall_timeout_secs {
            return Err(AppError::Config(config::ConfigError::Message(
                "Soft timeout cannot exceed the overall timeout".to_string(),
            )));
        }

        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(AppError::Config(config::ConfigError::Message(
                    "Provider name cannot be empty".to_string(),
                )));
            }
            if provider.base_url.is_empty() {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Provider '{}' must have a base_url",
                    provider.name
                ))));
            }
            match provider.auth.kind {
                AuthKind::Bearer | AuthKind::ApiKeyHeader => {}
                AuthKind::HmacSignature | AuthKind::SigV4 => {
                    if provider.auth.access_key.is_empty() || provider.auth.secret_key.is_empty() {
                        return Err(AppError::Config(config::ConfigError::Message(format!(
                            "Provider '{}' requires access_key and secret_key for signed auth",
                            provider.name
                        ))));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            routing: RoutingSettings::default(),
            race: RaceSettings::default(),
            logging: LoggingConfig::default(),
            providers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.routing.default_strategy, "priority");
        assert!(settings.routing.enable_fallback);
        assert_eq!(settings.race.overall_timeout_secs, 120);
        assert!(settings.providers.is_empty());
        settings.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_strategy() {
        let mut settings = Settings::default();
        settings.routing.default_strategy = "psychic".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_soft_above_overall() {
        let mut settings = Settings::default();
        settings.race.soft_timeout_secs = 300;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_requires_signing_credentials() {
        let mut settings = Settings::default();
        settings.providers.push(ProviderSettings {
            name: "signed".to_string(),
            display_name: "Signed".to_string(),
            kind: ExecutionMode::Sync,
            base_url: "https://api.example.com".to_string(),
            generate_path: default_generate_path(),
            status_path: default_status_path(),
            auth: ProviderAuthSettings {
                kind: AuthKind::HmacSignature,
                ..Default::default()
            },
            region: Region::Global,
            priority: 0,
            enabled: true,
            timeout_secs: 60,
            models: Vec::new(),
        });
        assert!(settings.validate().is_err());
    }
}
