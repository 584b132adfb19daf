//! Live-tunable trading settings.
//!
//! The store is authoritative at runtime: rows in the `settings` table
//! overlay the boot values from the config file, and dashboard updates write
//! the row first and the in-memory snapshot second. Unparseable rows are
//! logged and skipped rather than poisoning the snapshot.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::TradingConfig;
use crate::persistence::repository::Repository;
use crate::persistence::StoreError;

pub const KEY_ENABLED: &str = "trading.enabled";
pub const KEY_LEVERAGE: &str = "trading.leverage";
pub const KEY_ORDER_AMOUNT: &str = "trading.order_amount";
pub const KEY_TARGET_PERCENT: &str = "trading.target_percent";
pub const KEY_STOPLOSS_PERCENT: &str = "trading.stoploss_percent";
pub const KEY_ORDER_TIMEOUT: &str = "trading.order_timeout";
pub const KEY_MAX_POSITIONS: &str = "trading.max_positions";
pub const KEY_DRY_RUN: &str = "trading.dry_run";
pub const KEY_SIGNAL_PATTERN: &str = "trading.signal_pattern";
pub const KEY_IGNORED_SYMBOLS: &str = "trading.ignored_symbols";

#[derive(Debug, Clone, Serialize)]
pub struct TradingSettings {
    pub enabled: bool,
    pub leverage: u32,
    pub order_amount: f64,
    pub target_percent: f64,
    pub stoploss_percent: f64,
    pub order_timeout: u64,
    pub max_positions: u32,
    pub dry_run: bool,
    pub signal_pattern: String,
    pub ignored_symbols: Vec<String>,
}

impl TradingSettings {
    pub fn from_config(cfg: &TradingConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            leverage: cfg.leverage,
            order_amount: cfg.order_amount,
            target_percent: cfg.target_percent,
            stoploss_percent: cfg.stoploss_percent,
            order_timeout: cfg.order_timeout,
            max_positions: cfg.max_positions,
            dry_run: cfg.dry_run,
            signal_pattern: cfg.signal_pattern.clone(),
            ignored_symbols: cfg.ignored_symbols.clone(),
        }
    }

    fn apply_row(&mut self, key: &str, value: &str) {
        let parsed = match key {
            KEY_ENABLED => parse_into(value, &mut self.enabled),
            KEY_LEVERAGE => parse_into(value, &mut self.leverage),
            KEY_ORDER_AMOUNT => parse_into(value, &mut self.order_amount),
            KEY_TARGET_PERCENT => parse_into(value, &mut self.target_percent),
            KEY_STOPLOSS_PERCENT => parse_into(value, &mut self.stoploss_percent),
            KEY_ORDER_TIMEOUT => parse_into(value, &mut self.order_timeout),
            KEY_MAX_POSITIONS => parse_into(value, &mut self.max_positions),
            KEY_DRY_RUN => parse_into(value, &mut self.dry_run),
            KEY_SIGNAL_PATTERN => {
                self.signal_pattern = value.to_string();
                true
            }
            KEY_IGNORED_SYMBOLS => {
                self.ignored_symbols = split_symbols(value);
                true
            }
            _ => return,
        };
        if !parsed {
            warn!(key, value, "ignoring unparseable settings row");
        }
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
    match value.parse() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

fn split_symbols(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Dashboard update payload; only provided fields change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub leverage: Option<u32>,
    pub order_amount: Option<f64>,
    pub target_percent: Option<f64>,
    pub stoploss_percent: Option<f64>,
    pub order_timeout: Option<u64>,
    pub max_positions: Option<u32>,
    pub dry_run: Option<bool>,
    pub signal_pattern: Option<String>,
    pub ignored_symbols: Option<Vec<String>>,
}

pub struct RuntimeSettings {
    current: RwLock<TradingSettings>,
    repo: Repository,
}

impl RuntimeSettings {
    /// Hydrate from the boot config, then overlay settings rows.
    pub async fn load(repo: Repository, boot: TradingSettings) -> Result<Arc<Self>, StoreError> {
        let mut settings = boot;
        for (key, value) in repo.all_settings().await? {
            settings.apply_row(&key, &value);
        }
        Ok(Arc::new(Self {
            current: RwLock::new(settings),
            repo,
        }))
    }

    pub fn snapshot(&self) -> TradingSettings {
        self.current.read().expect("settings lock poisoned").clone()
    }

    /// Persist the provided fields as settings rows, then swap the snapshot.
    pub async fn apply(&self, update: SettingsUpdate) -> Result<TradingSettings, StoreError> {
        let mut next = self.snapshot();

        if let Some(v) = update.enabled {
            self.repo.upsert_setting(KEY_ENABLED, &v.to_string()).await?;
            next.enabled = v;
        }
        if let Some(v) = update.leverage {
            self.repo.upsert_setting(KEY_LEVERAGE, &v.to_string()).await?;
            next.leverage = v;
        }
        if let Some(v) = update.order_amount {
            self.repo
                .upsert_setting(KEY_ORDER_AMOUNT, &v.to_string())
                .await?;
            next.order_amount = v;
        }
        if let Some(v) = update.target_percent {
            self.repo
                .upsert_setting(KEY_TARGET_PERCENT, &v.to_string())
                .await?;
            next.target_percent = v;
        }
        if let Some(v) = update.stoploss_percent {
            self.repo
                .upsert_setting(KEY_STOPLOSS_PERCENT, &v.to_string())
                .await?;
            next.stoploss_percent = v;
        }
        if let Some(v) = update.order_timeout {
            self.repo
                .upsert_setting(KEY_ORDER_TIMEOUT, &v.to_string())
                .await?;
            next.order_timeout = v;
        }
        if let Some(v) = update.max_positions {
            self.repo
                .upsert_setting(KEY_MAX_POSITIONS, &v.to_string())
                .await?;
            next.max_positions = v;
        }
        if let Some(v) = update.dry_run {
            self.repo.upsert_setting(KEY_DRY_RUN, &v.to_string()).await?;
            next.dry_run = v;
        }
        if let Some(v) = &update.signal_pattern {
            self.repo.upsert_setting(KEY_SIGNAL_PATTERN, v).await?;
            next.signal_pattern = v.clone();
        }
        if let Some(v) = &update.ignored_symbols {
            self.repo
                .upsert_setting(KEY_IGNORED_SYMBOLS, &v.join(","))
                .await?;
            next.ignored_symbols = v.clone();
        }

        *self.current.write().expect("settings lock poisoned") = next.clone();
        Ok(next)
    }
}
