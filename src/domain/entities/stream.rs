//! Events delivered by the exchange user-data stream.

use serde::Serialize;

use crate::domain::entities::order::OrderStatus;

/// A parsed user-data frame. Frames that are neither order nor account
/// updates are dropped at the wire boundary.
#[derive(Debug, Clone, Serialize)]
pub enum StreamEvent {
    Order(OrderUpdateEvent),
    Account(AccountUpdateEvent),
}

/// `ORDER_TRADE_UPDATE`
#[derive(Debug, Clone, Serialize)]
pub struct OrderUpdateEvent {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub side: String,
    pub order_type: String,
    pub execution_type: String,
    pub status: OrderStatus,
    pub last_filled_qty: f64,
    pub filled_qty: f64,
    pub avg_price: f64,
    pub realized_profit: f64,
}

/// `ACCOUNT_UPDATE`
#[derive(Debug, Clone, Serialize)]
pub struct AccountUpdateEvent {
    pub reason: String,
    pub balances: Vec<BalanceUpdate>,
    pub positions: Vec<PositionStateUpdate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceUpdate {
    pub asset: String,
    pub wallet_balance: f64,
    pub cross_wallet_balance: f64,
    pub balance_change: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionStateUpdate {
    pub symbol: String,
    pub position_amount: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
    pub margin_type: String,
    pub position_side: String,
}
