//! Database models.
//!
//! Row structures for accounts, signals, positions, orders, channels,
//! messages and settings, plus the insert drafts the write paths use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Exchange account credentials and per-account trading parameters.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    pub is_testnet: bool,
    pub is_active: bool,
    pub is_default: bool,
    pub leverage: i64,
    pub order_amount_usdt: f64,
    pub target_percent: f64,
    pub stoploss_percent: f64,
    pub order_timeout_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dashboard payload for creating or updating an account. Zero-valued
/// numeric fields receive defaults on create.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub is_testnet: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub leverage: i64,
    #[serde(default)]
    pub order_amount_usdt: f64,
    #[serde(default)]
    pub target_percent: f64,
    #[serde(default)]
    pub stoploss_percent: f64,
    #[serde(default)]
    pub order_timeout_seconds: i64,
}

fn default_true() -> bool {
    true
}

impl Default for AccountDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            is_testnet: false,
            is_active: true,
            is_default: false,
            leverage: 0,
            order_amount_usdt: 0.0,
            target_percent: 0.0,
            stoploss_percent: 0.0,
            order_timeout_seconds: 0,
        }
    }
}

impl AccountDraft {
    /// Apply creation defaults where numeric fields were left at zero.
    pub fn with_defaults(mut self) -> Self {
        if self.leverage == 0 {
            self.leverage = 10;
        }
        if self.order_amount_usdt == 0.0 {
            self.order_amount_usdt = 100.0;
        }
        if self.target_percent == 0.0 {
            self.target_percent = 0.02;
        }
        if self.stoploss_percent == 0.0 {
            self.stoploss_percent = 0.01;
        }
        if self.order_timeout_seconds == 0 {
            self.order_timeout_seconds = 600;
        }
        self
    }
}

/// A parsed trading signal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Signal {
    pub id: i64,
    pub message_id: i64,
    pub channel_id: i64,
    pub symbol: String,
    pub raw_message: String,
    pub parsed_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub error: Option<String>,
}

pub const SIGNAL_PENDING: &str = "pending";
pub const SIGNAL_PROCESSED: &str = "processed";
pub const SIGNAL_FAILED: &str = "failed";

/// An open or closed trading position.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Position {
    pub id: i64,
    pub signal_id: Option<i64>,
    pub account_id: i64,
    pub symbol: String,
    pub side: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: i64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
}

pub const POSITION_OPEN: &str = "open";
pub const POSITION_CLOSED: &str = "closed";

impl Position {
    /// Realized PnL and PnL percent for a LONG position at `exit_price`.
    pub fn realized(&self, exit_price: f64) -> (f64, f64) {
        let leverage = self.leverage as f64;
        let pnl = (exit_price - self.entry_price) * self.quantity * leverage;
        let pnl_percent = (exit_price - self.entry_price) / self.entry_price * 100.0 * leverage;
        (pnl, pnl_percent)
    }
}

/// Insert draft for a position row; written only after the entry order is
/// accepted.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub signal_id: Option<i64>,
    pub account_id: i64,
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: i64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
}

/// One exchange order belonging to a position.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderRecord {
    pub id: i64,
    pub position_id: i64,
    pub exchange_order_id: i64,
    pub symbol: String,
    pub side: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub order_type: String,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub price: f64,
    pub stop_price: Option<f64>,
    pub status: String,
    pub time_in_force: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub purpose: String,
}

/// Insert draft for an order row, built from the exchange acknowledgement.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub position_id: i64,
    pub exchange_order_id: i64,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub price: f64,
    pub stop_price: Option<f64>,
    pub status: String,
    pub time_in_force: String,
    pub purpose: String,
}

/// A monitored chat channel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: i64,
    pub channel_id: i64,
    pub username: Option<String>,
    pub title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert draft for the message archive.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: i64,
    pub channel_id: i64,
    pub channel_name: String,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub text: String,
    pub media_type: Option<String>,
    pub is_forwarded: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate trade statistics for the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TradingStats {
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub open_positions: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_draft_defaults() {
        let draft = AccountDraft {
            name: "main".into(),
            api_key: "k".into(),
            api_secret: "s".into(),
            ..Default::default()
        }
        .with_defaults();
        assert_eq!(draft.leverage, 10);
        assert_eq!(draft.order_amount_usdt, 100.0);
        assert_eq!(draft.target_percent, 0.02);
        assert_eq!(draft.stoploss_percent, 0.01);
        assert_eq!(draft.order_timeout_seconds, 600);
    }

    #[test]
    fn account_draft_keeps_explicit_values() {
        let draft = AccountDraft {
            leverage: 25,
            order_amount_usdt: 50.0,
            ..Default::default()
        }
        .with_defaults();
        assert_eq!(draft.leverage, 25);
        assert_eq!(draft.order_amount_usdt, 50.0);
    }

    #[test]
    fn long_pnl_math() {
        let position = Position {
            id: 1,
            signal_id: None,
            account_id: 1,
            symbol: "BTCUSDT".into(),
            side: "LONG".into(),
            entry_price: 50_000.0,
            quantity: 0.002,
            leverage: 10,
            take_profit_price: 50_100.0,
            stop_loss_price: 49_950.0,
            status: POSITION_OPEN.into(),
            opened_at: Utc::now(),
            closed_at: None,
            exit_price: None,
            pnl: None,
            pnl_percent: None,
        };
        let (pnl, pnl_percent) = position.realized(50_100.0);
        assert!((pnl - 2.0).abs() < 1e-9); // 100 * 0.002 * 10
        assert!((pnl_percent - 2.0).abs() < 1e-9); // 0.2% move at 10x
    }
}
