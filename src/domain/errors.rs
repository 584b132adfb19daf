//! Error kinds surfaced by the trading pipeline.
//!
//! Every execution path returns one of these to its caller; the top of the
//! signal intake logs and broadcasts but never panics.

use thiserror::Error;

use crate::domain::entities::order::OrderPurpose;
use crate::domain::repositories::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum TradeError {
    /// Fatal at startup only.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("account {id} is misconfigured: {reason}")]
    AccountMisconfigured { id: i64, reason: String },

    #[error("no default trading account configured")]
    NoDefaultAccount,

    #[error("symbol {0} is not listed on the exchange")]
    SymbolUnknown(String),

    #[error("price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },

    /// Entry order rejected; any accepted protective orders were cancelled.
    #[error("entry order failed for {symbol}: {reason}")]
    EntryFailed { symbol: String, reason: String },

    /// A TP or SL was rejected while the entry stands. The position keeps
    /// whatever protection succeeded.
    #[error("{purpose} order failed for {symbol}: {reason}")]
    ProtectiveOrderFailed {
        symbol: String,
        purpose: OrderPurpose,
        reason: String,
    },

    #[error("failed to cancel order {order_id} on {symbol}: {reason}")]
    CancelFailed {
        symbol: String,
        order_id: i64,
        reason: String,
    },

    #[error("failed to force-close {symbol}: {reason}")]
    CloseFailed { symbol: String, reason: String },

    #[error("exchange api error {code}: {msg}")]
    ExchangeApi { code: i64, msg: String },

    #[error("store error: {0}")]
    Store(String),
}

impl From<GatewayError> for TradeError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Api { code, msg } => TradeError::ExchangeApi { code, msg },
            other => TradeError::ExchangeApi {
                code: -1,
                msg: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_api_error_keeps_code() {
        let err: TradeError = GatewayError::Api {
            code: -2019,
            msg: "Margin is insufficient.".into(),
        }
        .into();
        match err {
            TradeError::ExchangeApi { code, msg } => {
                assert_eq!(code, -2019);
                assert!(msg.contains("Margin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_includes_symbol() {
        let err = TradeError::EntryFailed {
            symbol: "BTCUSDT".into(),
            reason: "rejected".into(),
        };
        assert!(err.to_string().contains("BTCUSDT"));
    }
}
