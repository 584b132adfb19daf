//! Order executor.
//!
//! Turns one (signal, account) pair into a bracket of three coordinated
//! orders: market entry, take-profit and stop-loss, dispatched concurrently.
//! A rejected entry rolls back whatever protection the exchange accepted; a
//! rejected protective order leaves the entry standing. The position row is
//! written only after the entry is accepted, and order rows go through the
//! async writer so dispatch never blocks on persistence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::application::events::{Event, EventBus, PositionFrame, SignalErrorNotice, SignalNotice};
use crate::application::settings::TradingSettings;
use crate::application::tracker::{OrderTracker, PendingOrder};
use crate::domain::entities::exchange::MarginType;
use crate::domain::entities::order::{OrderAck, OrderDraft, OrderPurpose, OrderType};
use crate::domain::errors::TradeError;
use crate::domain::repositories::gateway::FuturesGateway;
use crate::domain::services::sizing::{size_bracket, BracketParams, SizingRules};
use crate::persistence::models::{Account, NewOrder, NewPosition, Signal};
use crate::persistence::repository::Repository;
use crate::persistence::writer::{WriteCommand, WriterHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Executed { position_id: i64 },
    /// Suppressed by the dedup gate; not an error.
    Deduplicated,
    /// Dry-run mode: sized and logged, nothing dispatched or written.
    DryRun,
}

pub struct OrderExecutor {
    tracker: Arc<OrderTracker>,
    repo: Repository,
    writer: WriterHandle,
    bus: EventBus,
}

impl OrderExecutor {
    pub fn new(
        tracker: Arc<OrderTracker>,
        repo: Repository,
        writer: WriterHandle,
        bus: EventBus,
    ) -> Self {
        Self {
            tracker,
            repo,
            writer,
            bus,
        }
    }

    pub async fn execute(
        &self,
        signal: &Signal,
        account: &Account,
        gateway: Arc<dyn FuturesGateway>,
        settings: &TradingSettings,
    ) -> Result<ExecutionOutcome, TradeError> {
        let symbol = signal.symbol.as_str();

        if self.tracker.recently_executed(symbol) {
            info!(symbol, "symbol executed within dedup window, skipping");
            return Ok(ExecutionOutcome::Deduplicated);
        }

        let params = validate_account(account)?;

        let entry_price =
            gateway
                .symbol_price(symbol)
                .await
                .map_err(|e| TradeError::PriceUnavailable {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                })?;

        let info = gateway.exchange_info().await?;
        let symbol_info = info
            .symbol(symbol)
            .ok_or_else(|| TradeError::SymbolUnknown(symbol.to_string()))?;
        let rules = SizingRules::from_symbol(symbol_info);
        let bracket = size_bracket(entry_price, &params, &rules);

        info!(
            symbol,
            entry_price,
            quantity = bracket.quantity,
            take_profit = bracket.take_profit_price,
            stop_loss = bracket.stop_loss_price,
            leverage = params.leverage,
            "executing trading signal"
        );

        if settings.dry_run {
            warn!(symbol, "dry run enabled, not dispatching orders");
            return Ok(ExecutionOutcome::DryRun);
        }

        gateway.set_leverage(symbol, params.leverage).await?;
        gateway.set_margin_type(symbol, MarginType::Crossed).await?;

        let entry_draft = OrderDraft::market_buy(symbol, bracket.quantity);
        let tp_draft = OrderDraft::protective(
            symbol,
            OrderType::TakeProfitMarket,
            bracket.take_profit_price,
            bracket.quantity,
        );
        let sl_draft = OrderDraft::protective(
            symbol,
            OrderType::StopMarket,
            bracket.stop_loss_price,
            bracket.quantity,
        );

        let (entry_res, tp_res, sl_res) = tokio::join!(
            gateway.place_order(&entry_draft),
            gateway.place_order(&tp_draft),
            gateway.place_order(&sl_draft),
        );

        let entry_ack = match entry_res {
            Ok(ack) => ack,
            Err(e) => {
                error!(symbol, "entry order rejected, cancelling protective orders");
                for ack in [tp_res.as_ref().ok(), sl_res.as_ref().ok()].into_iter().flatten() {
                    if let Err(cancel_err) = gateway.cancel_order(symbol, ack.order_id).await {
                        error!(
                            symbol,
                            order_id = ack.order_id,
                            "rollback cancel failed: {cancel_err}"
                        );
                        self.bus.publish(Event::SignalError(SignalErrorNotice {
                            symbol: symbol.to_string(),
                            error: format!("rollback cancel failed: {cancel_err}"),
                        }));
                    }
                }
                return Err(TradeError::EntryFailed {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        // Entry accepted: the position exists on the exchange from here on.
        let position = self
            .repo
            .create_position(NewPosition {
                signal_id: Some(signal.id),
                account_id: account.id,
                symbol: symbol.to_string(),
                entry_price,
                quantity: bracket.quantity,
                leverage: account.leverage,
                take_profit_price: bracket.take_profit_price,
                stop_loss_price: bracket.stop_loss_price,
            })
            .await
            .map_err(|e| TradeError::Store(e.to_string()))?;

        self.writer.enqueue(WriteCommand::Order(order_row(
            position.id,
            &entry_ack,
            OrderPurpose::Entry,
        )));

        let timeout = Duration::from_secs(account.order_timeout_seconds.max(0) as u64);
        for (purpose, result) in [
            (OrderPurpose::TakeProfit, tp_res),
            (OrderPurpose::StopLoss, sl_res),
        ] {
            match result {
                Ok(ack) => {
                    self.writer
                        .enqueue(WriteCommand::Order(order_row(position.id, &ack, purpose)));
                    self.tracker.register(
                        ack.order_id,
                        PendingOrder {
                            symbol: symbol.to_string(),
                            purpose,
                            quantity: bracket.quantity,
                            position_id: position.id,
                            created_at: Instant::now(),
                            timeout,
                            gateway: gateway.clone(),
                        },
                    );
                }
                Err(e) => {
                    let err = TradeError::ProtectiveOrderFailed {
                        symbol: symbol.to_string(),
                        purpose,
                        reason: e.to_string(),
                    };
                    error!("{err}; position continues with reduced protection");
                    self.bus.publish(Event::SignalError(SignalErrorNotice {
                        symbol: symbol.to_string(),
                        error: err.to_string(),
                    }));
                }
            }
        }

        self.tracker.mark_executed(symbol);
        self.bus
            .publish(Event::PositionUpdate(PositionFrame::Row(position.clone())));
        self.bus.publish(Event::SignalExecuted(SignalNotice {
            symbol: symbol.to_string(),
            position_id: position.id,
        }));

        info!(
            position_id = position.id,
            symbol,
            entry_status = %entry_ack.status,
            "signal executed"
        );

        Ok(ExecutionOutcome::Executed {
            position_id: position.id,
        })
    }
}

fn validate_account(account: &Account) -> Result<BracketParams, TradeError> {
    let misconfigured = |reason: &str| TradeError::AccountMisconfigured {
        id: account.id,
        reason: reason.to_string(),
    };

    if !(1..=125).contains(&account.leverage) {
        return Err(misconfigured("leverage must be between 1 and 125"));
    }
    if account.order_amount_usdt <= 0.0 {
        return Err(misconfigured("order amount must be greater than 0"));
    }
    if account.target_percent <= 0.0 {
        return Err(misconfigured("target percent must be greater than 0"));
    }
    if account.stoploss_percent <= 0.0 {
        return Err(misconfigured("stoploss percent must be greater than 0"));
    }

    Ok(BracketParams {
        leverage: account.leverage as u32,
        order_amount: account.order_amount_usdt,
        target_percent: account.target_percent,
        stoploss_percent: account.stoploss_percent,
    })
}

fn order_row(position_id: i64, ack: &OrderAck, purpose: OrderPurpose) -> NewOrder {
    NewOrder {
        position_id,
        exchange_order_id: ack.order_id,
        symbol: ack.symbol.clone(),
        side: ack.side.to_string(),
        order_type: ack.order_type.clone(),
        orig_qty: ack.orig_qty,
        executed_qty: ack.executed_qty,
        price: ack.price,
        stop_price: ack.stop_price,
        status: ack.status.to_string(),
        time_in_force: if ack.time_in_force.is_empty() {
            "GTC".to_string()
        } else {
            ack.time_in_force.clone()
        },
        purpose: purpose.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account_with(leverage: i64, order_amount: f64) -> Account {
        Account {
            id: 1,
            name: "main".into(),
            api_key: "k".into(),
            api_secret: "s".into(),
            is_testnet: false,
            is_active: true,
            is_default: true,
            leverage,
            order_amount_usdt: order_amount,
            target_percent: 0.02,
            stoploss_percent: 0.01,
            order_timeout_seconds: 600,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn leverage_bounds() {
        assert!(validate_account(&account_with(1, 100.0)).is_ok());
        assert!(validate_account(&account_with(125, 100.0)).is_ok());
        assert!(validate_account(&account_with(0, 100.0)).is_err());
        assert!(validate_account(&account_with(126, 100.0)).is_err());
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(validate_account(&account_with(10, 0.0)).is_err());
        assert!(validate_account(&account_with(10, -5.0)).is_err());

        let mut account = account_with(10, 100.0);
        account.target_percent = 0.0;
        assert!(validate_account(&account).is_err());

        let mut account = account_with(10, 100.0);
        account.stoploss_percent = -0.01;
        assert!(validate_account(&account).is_err());
    }
}
