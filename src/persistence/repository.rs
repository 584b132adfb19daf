//! Data access for accounts, signals, positions, orders, channels, messages
//! and settings.
//!
//! Account writes that touch `is_default` run in a transaction so that at
//! most one active account is the default at any committed state.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::Row;

use super::models::*;
use super::{DbPool, StoreError};

#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // ---- accounts ----

    pub async fn create_account(&self, draft: AccountDraft) -> Result<Account, StoreError> {
        let draft = draft.with_defaults();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO binance_accounts
                (name, api_key, api_secret, is_testnet, is_active, is_default,
                 leverage, order_amount_usdt, target_percent, stoploss_percent,
                 order_timeout_seconds, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            RETURNING id
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.api_key)
        .bind(&draft.api_secret)
        .bind(draft.is_testnet)
        .bind(draft.is_active)
        .bind(draft.is_default)
        .bind(draft.leverage)
        .bind(draft.order_amount_usdt)
        .bind(draft.target_percent)
        .bind(draft.stoploss_percent)
        .bind(draft.order_timeout_seconds)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if draft.is_default {
            sqlx::query("UPDATE binance_accounts SET is_default = 0 WHERE id != ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.get_account(id)
            .await?
            .ok_or(StoreError::NotFound("account"))
    }

    pub async fn update_account(&self, id: i64, draft: AccountDraft) -> Result<Account, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE binance_accounts
            SET name = ?1, api_key = ?2, api_secret = ?3, is_testnet = ?4,
                is_active = ?5, is_default = ?6, leverage = ?7,
                order_amount_usdt = ?8, target_percent = ?9,
                stoploss_percent = ?10, order_timeout_seconds = ?11,
                updated_at = ?12
            WHERE id = ?13
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.api_key)
        .bind(&draft.api_secret)
        .bind(draft.is_testnet)
        .bind(draft.is_active)
        .bind(draft.is_default)
        .bind(draft.leverage)
        .bind(draft.order_amount_usdt)
        .bind(draft.target_percent)
        .bind(draft.stoploss_percent)
        .bind(draft.order_timeout_seconds)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound("account"));
        }

        if draft.is_default {
            sqlx::query("UPDATE binance_accounts SET is_default = 0 WHERE id != ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.get_account(id)
            .await?
            .ok_or(StoreError::NotFound("account"))
    }

    pub async fn get_account(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM binance_accounts WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM binance_accounts ORDER BY is_default DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    pub async fn list_active_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM binance_accounts WHERE is_active = 1 ORDER BY is_default DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    pub async fn get_default_account(&self) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM binance_accounts WHERE is_default = 1 AND is_active = 1 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    /// Idempotent; clears the flag elsewhere in the same transaction.
    pub async fn set_default_account(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE binance_accounts SET is_default = 1, updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound("account"));
        }

        sqlx::query("UPDATE binance_accounts SET is_default = 0 WHERE id != ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Fails with [`StoreError::AccountInUse`] while the account holds an
    /// open position.
    pub async fn delete_account(&self, id: i64) -> Result<(), StoreError> {
        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM positions WHERE account_id = ?1 AND status = 'open'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        if open > 0 {
            return Err(StoreError::AccountInUse);
        }

        let deleted = sqlx::query("DELETE FROM binance_accounts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::NotFound("account"));
        }
        Ok(())
    }

    // ---- signals ----

    pub async fn create_signal(
        &self,
        message_id: i64,
        channel_id: i64,
        symbol: &str,
        raw_message: &str,
    ) -> Result<Signal, StoreError> {
        let signal = sqlx::query_as::<_, Signal>(
            r#"
            INSERT INTO signals (message_id, channel_id, symbol, raw_message, parsed_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(channel_id)
        .bind(symbol)
        .bind(raw_message)
        .bind(Utc::now())
        .bind(SIGNAL_PENDING)
        .fetch_one(&self.pool)
        .await?;
        Ok(signal)
    }

    pub async fn recent_signals(&self, limit: i64) -> Result<Vec<Signal>, StoreError> {
        let signals = sqlx::query_as::<_, Signal>(
            "SELECT * FROM signals ORDER BY parsed_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(signals)
    }

    pub async fn update_signal_status(
        &self,
        id: i64,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE signals SET status = ?1, processed_at = ?2, error = ?3 WHERE id = ?4",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- positions ----

    pub async fn create_position(&self, new: NewPosition) -> Result<Position, StoreError> {
        let position = sqlx::query_as::<_, Position>(
            r#"
            INSERT INTO positions
                (signal_id, account_id, symbol, side, entry_price, quantity,
                 leverage, take_profit_price, stop_loss_price, status, opened_at)
            VALUES (?1, ?2, ?3, 'LONG', ?4, ?5, ?6, ?7, ?8, 'open', ?9)
            RETURNING *
            "#,
        )
        .bind(new.signal_id)
        .bind(new.account_id)
        .bind(&new.symbol)
        .bind(new.entry_price)
        .bind(new.quantity)
        .bind(new.leverage)
        .bind(new.take_profit_price)
        .bind(new.stop_loss_price)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(position)
    }

    /// Close a position, computing PnL from the exit price.
    pub async fn close_position(
        &self,
        id: i64,
        exit_price: f64,
    ) -> Result<Position, StoreError> {
        let mut tx = self.pool.begin().await?;

        let position = sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("position"))?;

        let (pnl, pnl_percent) = position.realized(exit_price);

        let closed = sqlx::query_as::<_, Position>(
            r#"
            UPDATE positions
            SET status = 'closed', exit_price = ?1, closed_at = ?2, pnl = ?3, pnl_percent = ?4
            WHERE id = ?5
            RETURNING *
            "#,
        )
        .bind(exit_price)
        .bind(Utc::now())
        .bind(pnl)
        .bind(pnl_percent)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(closed)
    }

    pub async fn get_position(&self, id: i64) -> Result<Option<Position>, StoreError> {
        let position = sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(position)
    }

    pub async fn open_positions(&self) -> Result<Vec<Position>, StoreError> {
        let positions = sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE status = 'open' ORDER BY opened_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(positions)
    }

    pub async fn all_positions(&self, limit: i64) -> Result<Vec<Position>, StoreError> {
        let positions = sqlx::query_as::<_, Position>(
            "SELECT * FROM positions ORDER BY opened_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(positions)
    }

    // ---- orders ----

    pub async fn insert_order(&self, order: NewOrder) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO orders
                (position_id, exchange_order_id, symbol, side, type, orig_qty,
                 executed_qty, price, stop_price, status, time_in_force,
                 created_at, updated_at, purpose)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, ?13)
            "#,
        )
        .bind(order.position_id)
        .bind(order.exchange_order_id)
        .bind(&order.symbol)
        .bind(&order.side)
        .bind(&order.order_type)
        .bind(order.orig_qty)
        .bind(order.executed_qty)
        .bind(order.price)
        .bind(order.stop_price)
        .bind(&order.status)
        .bind(&order.time_in_force)
        .bind(now)
        .bind(&order.purpose)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_order_status(
        &self,
        exchange_order_id: i64,
        status: &str,
        executed_qty: f64,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let filled_at = (status == "FILLED").then_some(now);
        let canceled_at = (status == "CANCELED" || status == "EXPIRED").then_some(now);

        sqlx::query(
            r#"
            UPDATE orders
            SET status = ?1, executed_qty = ?2, updated_at = ?3,
                filled_at = COALESCE(?4, filled_at),
                canceled_at = COALESCE(?5, canceled_at)
            WHERE exchange_order_id = ?6
            "#,
        )
        .bind(status)
        .bind(executed_qty)
        .bind(now)
        .bind(filled_at)
        .bind(canceled_at)
        .bind(exchange_order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn orders_by_position(&self, position_id: i64) -> Result<Vec<OrderRecord>, StoreError> {
        let orders = sqlx::query_as::<_, OrderRecord>(
            "SELECT * FROM orders WHERE position_id = ?1 ORDER BY created_at ASC",
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    // ---- channels ----

    pub async fn upsert_channel(
        &self,
        channel_id: i64,
        username: Option<&str>,
        title: &str,
    ) -> Result<Channel, StoreError> {
        let now = Utc::now();
        let channel = sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (channel_id, username, title, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            ON CONFLICT(channel_id) DO UPDATE SET
                username = excluded.username,
                title = excluded.title,
                is_active = 1,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(channel_id)
        .bind(username)
        .bind(title)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(channel)
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let channels = sqlx::query_as::<_, Channel>(
            "SELECT * FROM channels WHERE is_active = 1 ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    pub async fn deactivate_channel(&self, channel_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE channels SET is_active = 0, updated_at = ?1 WHERE channel_id = ?2")
            .bind(Utc::now())
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- messages ----

    /// Archive an inbound message; duplicates are ignored.
    pub async fn archive_message(&self, msg: NewMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO messages
                (message_id, channel_id, channel_name, sender_id, sender_name,
                 text, media_type, is_forwarded, timestamp, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(msg.message_id)
        .bind(msg.channel_id)
        .bind(&msg.channel_name)
        .bind(msg.sender_id)
        .bind(&msg.sender_name)
        .bind(&msg.text)
        .bind(&msg.media_type)
        .bind(msg.is_forwarded)
        .bind(msg.timestamp)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- settings ----

    pub async fn upsert_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    pub async fn all_settings(&self) -> Result<HashMap<String, String>, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
            .collect())
    }

    // ---- stats ----

    pub async fn trading_stats(&self) -> Result<TradingStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(pnl > 0), 0) AS wins,
                COALESCE(SUM(pnl <= 0), 0) AS losses,
                COALESCE(SUM(pnl), 0.0) AS total_pnl,
                COALESCE(AVG(CASE WHEN pnl > 0 THEN pnl END), 0.0) AS average_win,
                COALESCE(AVG(CASE WHEN pnl <= 0 THEN pnl END), 0.0) AS average_loss,
                COALESCE(MAX(pnl), 0.0) AS largest_win,
                COALESCE(MIN(pnl), 0.0) AS largest_loss
            FROM positions
            WHERE status = 'closed'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let open_positions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM positions WHERE status = 'open'")
                .fetch_one(&self.pool)
                .await?;

        let total_trades: i64 = row.get("total");
        let winning_trades: i64 = row.get("wins");
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        Ok(TradingStats {
            total_trades,
            winning_trades,
            losing_trades: row.get("losses"),
            total_pnl: row.get("total_pnl"),
            win_rate,
            average_win: row.get("average_win"),
            average_loss: row.get("average_loss"),
            largest_win: row.get("largest_win"),
            largest_loss: row.get("largest_loss"),
            open_positions,
        })
    }
}
