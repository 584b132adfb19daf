//! Order vocabulary shared by the executor, the tracker and the gateway.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// The three order types a bracket is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    TakeProfitMarket,
    StopMarket,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::TakeProfitMarket => write!(f, "TAKE_PROFIT_MARKET"),
            OrderType::StopMarket => write!(f, "STOP_MARKET"),
        }
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
    Unknown,
}

impl OrderStatus {
    /// Terminal statuses drop a protective order from timeout tracking.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Expired
                | OrderStatus::Rejected
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "EXPIRED" => OrderStatus::Expired,
            "REJECTED" => OrderStatus::Rejected,
            _ => OrderStatus::Unknown,
        })
    }
}

/// Why an order exists within a bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPurpose {
    Entry,
    TakeProfit,
    StopLoss,
}

impl std::fmt::Display for OrderPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderPurpose::Entry => write!(f, "entry"),
            OrderPurpose::TakeProfit => write!(f, "take_profit"),
            OrderPurpose::StopLoss => write!(f, "stop_loss"),
        }
    }
}

/// A new-order request handed to the gateway.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub reduce_only: bool,
    pub client_order_id: Option<String>,
}

impl OrderDraft {
    pub fn market_buy(symbol: &str, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            reduce_only: false,
            client_order_id: None,
        }
    }

    /// Reduce-only market sell used by the timeout sweeper to flatten.
    pub fn market_close(symbol: &str, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            reduce_only: true,
            client_order_id: None,
        }
    }

    pub fn protective(symbol: &str, order_type: OrderType, stop_price: f64, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            order_type,
            quantity,
            price: None,
            stop_price: Some(stop_price),
            reduce_only: true,
            client_order_id: None,
        }
    }
}

/// The exchange's acknowledgement of a placed, cancelled or queried order.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: i64,
    pub client_order_id: String,
    pub symbol: String,
    pub status: OrderStatus,
    pub side: OrderSide,
    pub order_type: String,
    pub price: f64,
    pub avg_price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub stop_price: Option<f64>,
    pub time_in_force: String,
    pub reduce_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_canonical_strings() {
        for s in ["NEW", "PARTIALLY_FILLED", "FILLED", "CANCELED", "EXPIRED"] {
            let parsed: OrderStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn unrecognized_status_maps_to_unknown() {
        let parsed: OrderStatus = "NEW_INSURANCE".parse().unwrap();
        assert_eq!(parsed, OrderStatus::Unknown);
        assert!(!parsed.is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn protective_draft_is_reduce_only_sell() {
        let draft = OrderDraft::protective("BTCUSDT", OrderType::StopMarket, 49950.0, 0.002);
        assert_eq!(draft.side, OrderSide::Sell);
        assert!(draft.reduce_only);
        assert_eq!(draft.stop_price, Some(49950.0));
        assert!(draft.price.is_none());
    }
}
