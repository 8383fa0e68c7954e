//! Layered configuration
//!
//! `blueguard.toml` (optional) or an explicit file, overridden by environment
//! variables such as `BLUEGUARD__SMS__ACCOUNT_SID`.

use crate::rate_limit::RateLimitConfig;
use alerting::{EvaluatorConfig, DEFAULT_LOCATION, DEFAULT_RETENTION_DAYS};
use config::{Config, ConfigError, Environment, File, FileFormat};
use notify::{AlertTemplate, NewRecipient, SmsGatewayConfig};
use serde::Deserialize;
use std::collections::HashMap;

/// Application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub alerting: AlertingSettings,
    pub sms: SmsSettings,
    pub storage: StorageSettings,
    pub rate_limit: RateLimitConfig,
    /// Recipients loaded into the directory at startup
    pub recipients: Vec<NewRecipient>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Upper bound for `alerting.retention_days` (ten years)
pub const MAX_RETENTION_DAYS: u32 = 3650;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertingSettings {
    pub retention_days: u32,
    pub default_location: String,
    /// SMS closing line
    pub signature: String,
    /// Startup threshold overrides by threat type
    pub thresholds: HashMap<String, f64>,
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            default_location: DEFAULT_LOCATION.to_string(),
            signature: AlertTemplate::default().signature,
            thresholds: HashMap::new(),
        }
    }
}

impl AlertingSettings {
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            retention_days: self.retention_days,
            default_location: self.default_location.clone(),
        }
    }

    pub fn template(&self) -> AlertTemplate {
        AlertTemplate {
            signature: self.signature.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsSettings {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SmsSettings {
    fn default() -> Self {
        let gateway = SmsGatewayConfig::default();
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            base_url: gateway.base_url,
            timeout_secs: gateway.timeout_secs,
        }
    }
}

impl SmsSettings {
    /// Gateway config when all credentials are present
    pub fn gateway_config(&self) -> Option<SmsGatewayConfig> {
        let config = SmsGatewayConfig {
            account_sid: self.account_sid.clone()?,
            auth_token: self.auth_token.clone()?,
            from_number: self.from_number.clone()?,
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
        };
        config.is_complete().then_some(config)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite URL; in-memory history when absent
    pub database_url: Option<String>,
}

impl Settings {
    /// Load `blueguard.toml` (if present), then `path` (if given), then the
    /// environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::with_name("blueguard").required(false));
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let settings: Self = builder
            .add_source(Environment::with_prefix("BLUEGUARD").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let days = self.alerting.retention_days;
        if !(1..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(ConfigError::Message(format!(
                "alerting.retention_days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS, days
            )));
        }
        Ok(())
    }
}
