//! Boot configuration loaded from a YAML file.
//!
//! The file provides boot-time defaults only; the trading parameters it
//! carries are overlaid by rows in the `settings` table at startup and may be
//! mutated live through the dashboard. See [`crate::application::settings`].

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

/// Configuration errors are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub binance: BinanceConfig,
    pub trading: TradingConfig,
    #[serde(default)]
    pub webapi: WebApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub api_id: i32,
    pub api_hash: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub use_test_dc: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type", default = "default_db_type")]
    pub db_type: String,
    pub dsn: String,
}

/// Global exchange endpoints; accounts themselves live in the database.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BinanceConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub ws_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_order_amount")]
    pub order_amount: f64,
    #[serde(default = "default_target_percent")]
    pub target_percent: f64,
    #[serde(default = "default_stoploss_percent")]
    pub stoploss_percent: f64,
    /// Seconds before an unfilled protective order is swept.
    #[serde(default = "default_order_timeout")]
    pub order_timeout: u64,
    #[serde(default)]
    pub signal_pattern: String,
    #[serde(default)]
    pub max_positions: u32,
    #[serde(default)]
    pub dry_run: bool,
    /// Comma grammar lives in the settings table; the file takes a list.
    #[serde(default)]
    pub ignored_symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_db_type() -> String {
    "sqlite".to_string()
}

fn default_leverage() -> u32 {
    10
}

fn default_order_amount() -> f64 {
    100.0
}

fn default_target_percent() -> f64 {
    0.02
}

fn default_stoploss_percent() -> f64 {
    0.01
}

fn default_order_timeout() -> u64 {
    600
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for WebApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Read and validate the configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.api_id == 0 {
            return Err(ConfigError::Invalid("telegram.api_id is required".into()));
        }
        if self.telegram.api_hash.is_empty() {
            return Err(ConfigError::Invalid("telegram.api_hash is required".into()));
        }
        if self.telegram.phone_number.is_empty() && self.telegram.bot_token.is_empty() {
            return Err(ConfigError::Invalid(
                "either telegram.phone_number or telegram.bot_token must be provided".into(),
            ));
        }
        if self.database.dsn.is_empty() {
            return Err(ConfigError::Invalid("database.dsn is required".into()));
        }

        if self.trading.enabled {
            if !(1..=125).contains(&self.trading.leverage) {
                return Err(ConfigError::Invalid(
                    "trading.leverage must be between 1 and 125".into(),
                ));
            }
            if self.trading.order_amount <= 0.0 {
                return Err(ConfigError::Invalid(
                    "trading.order_amount must be greater than 0".into(),
                ));
            }
            if self.trading.target_percent <= 0.0 {
                return Err(ConfigError::Invalid(
                    "trading.target_percent must be greater than 0".into(),
                ));
            }
            if self.trading.stoploss_percent <= 0.0 {
                return Err(ConfigError::Invalid(
                    "trading.stoploss_percent must be greater than 0".into(),
                ));
            }
            if self.trading.order_timeout < 60 {
                return Err(ConfigError::Invalid(
                    "trading.order_timeout must be at least 60 seconds".into(),
                ));
            }
            if self.trading.signal_pattern.is_empty() {
                return Err(ConfigError::Invalid(
                    "trading.signal_pattern is required when trading is enabled".into(),
                ));
            }
            Regex::new(&self.trading.signal_pattern).map_err(|e| {
                ConfigError::Invalid(format!("trading.signal_pattern is not a valid regex: {e}"))
            })?;
        }

        Ok(())
    }

    /// Whether bot-token authentication is configured for the message feed.
    pub fn is_bot(&self) -> bool {
        !self.telegram.bot_token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_yaml() -> String {
        r#"
telegram:
  api_id: 12345
  api_hash: "abcdef"
  bot_token: "123:token"
database:
  type: sqlite
  dsn: "data/zignal.db"
channels:
  - "@cryptosignals"
trading:
  enabled: true
  leverage: 10
  order_amount: 100
  target_percent: 0.02
  stoploss_percent: 0.01
  order_timeout: 600
  signal_pattern: '(?i)\$([A-Z]{2,10})\b'
webapi:
  enabled: true
  host: 0.0.0.0
  port: 8080
"#
        .to_string()
    }

    #[test]
    fn parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(&base_yaml()).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.trading.leverage, 10);
        assert_eq!(cfg.webapi.port, 8080);
        assert_eq!(cfg.channels, vec!["@cryptosignals".to_string()]);
        assert!(cfg.is_bot());
    }

    #[test]
    fn rejects_missing_api_hash() {
        let yaml = base_yaml().replace("api_hash: \"abcdef\"", "api_hash: \"\"");
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_leverage_out_of_range() {
        for bad in ["leverage: 0", "leverage: 126"] {
            let yaml = base_yaml().replace("leverage: 10", bad);
            let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
            assert!(cfg.validate().is_err(), "expected {bad} to be rejected");
        }
    }

    #[test]
    fn rejects_invalid_signal_pattern() {
        let yaml = base_yaml().replace(r"(?i)\$([A-Z]{2,10})\b", "([unclosed");
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("signal_pattern"));
    }

    #[test]
    fn disabled_trading_skips_trading_validation() {
        let yaml = base_yaml()
            .replace("enabled: true\n  leverage", "enabled: false\n  leverage")
            .replace("order_amount: 100", "order_amount: 0");
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_short_order_timeout() {
        let yaml = base_yaml().replace("order_timeout: 600", "order_timeout: 30");
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(cfg.validate().is_err());
    }
}
