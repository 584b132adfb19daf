//! Futures gateway trait.
//!
//! A common interface over the derivatives exchange so the executor and the
//! tracker stay independent of the concrete REST client, and so tests can
//! drive the full pipeline against a mock.

use async_trait::async_trait;

use crate::domain::entities::exchange::{ExchangeInfo, MarginType};
use crate::domain::entities::order::{OrderAck, OrderDraft};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// A structured `{code, msg}` rejection from the exchange.
    #[error("exchange rejected request [{code}]: {msg}")]
    Api { code: i64, msg: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode exchange response: {0}")]
    Decode(String),
}

/// Signed access to a USDT-margined futures account.
///
/// Every method suspends on a REST round trip carrying a 30-second deadline;
/// transient failures propagate to the caller.
#[async_trait]
pub trait FuturesGateway: Send + Sync {
    /// Latest traded price for a symbol.
    async fn symbol_price(&self, symbol: &str) -> GatewayResult<f64>;

    /// Exchange trading rules and per-symbol filters.
    async fn exchange_info(&self) -> GatewayResult<ExchangeInfo>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> GatewayResult<()>;

    /// "No need to change margin type" rejections are normalized to success
    /// by implementations.
    async fn set_margin_type(&self, symbol: &str, margin: MarginType) -> GatewayResult<()>;

    async fn place_order(&self, draft: &OrderDraft) -> GatewayResult<OrderAck>;

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> GatewayResult<OrderAck>;

    async fn query_order(&self, symbol: &str, order_id: i64) -> GatewayResult<OrderAck>;
}
