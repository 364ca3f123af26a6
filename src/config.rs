use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_base_url() -> String {
    "https://api.coingecko.com/api/v3".into()
}

fn default_quote_currency() -> String {
    "usd".into()
}

fn default_top_coins() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_tick_interval_secs() -> u64 {
    60
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub prices: PricesConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token. Falls back to the `TELEGRAM_BOT_TOKEN` environment
    /// variable when absent.
    pub token: Option<String>,
}

impl TelegramConfig {
    pub fn resolve_token(&self) -> Result<String, Report<ConfigError>> {
        if let Some(token) = &self.token
            && !token.is_empty()
        {
            return Ok(token.clone());
        }
        std::env::var("TELEGRAM_BOT_TOKEN")
            .change_context(ConfigError::Validation {
                field: "telegram.token missing and TELEGRAM_BOT_TOKEN not set".into(),
            })
    }
}

#[derive(Debug, Deserialize)]
pub struct PricesConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default = "default_top_coins")]
    pub top_coins: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            quote_currency: default_quote_currency(),
            top_coins: default_top_coins(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !matches!(config.general.log_format.as_str(), "text" | "json") {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "general.log_format \"{}\" must be \"text\" or \"json\"",
                config.general.log_format
            ),
        }));
    }

    if config.prices.top_coins == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "prices.top_coins must be at least 1".into(),
        }));
    }

    if config.prices.requests_per_second == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "prices.requests_per_second must be at least 1".into(),
        }));
    }

    if config.evaluator.tick_interval_secs == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "evaluator.tick_interval_secs must be at least 1".into(),
        }));
    }

    Ok(())
}
