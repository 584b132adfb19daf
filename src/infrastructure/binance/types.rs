//! Binance futures wire types and their conversions into domain types.
//!
//! REST payloads are camelCase with numbers serialized as strings; user-data
//! frames use the exchange's one-character field schema. Numeric strings are
//! parsed leniently at this boundary, matching what the exchange sends for
//! optional fields ("" and "0" both mean absent).

use serde::Deserialize;

use crate::domain::entities::exchange::{ExchangeInfo, SymbolFilter, SymbolInfo};
use crate::domain::entities::order::{OrderAck, OrderSide, OrderStatus};
use crate::domain::entities::stream::{
    AccountUpdateEvent, BalanceUpdate, OrderUpdateEvent, PositionStateUpdate, StreamEvent,
};

pub(crate) fn parse_f64(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorWire {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Deserialize)]
pub struct PriceTickerWire {
    pub symbol: String,
    pub price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKeyWire {
    pub listen_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfoWire {
    pub symbols: Vec<SymbolInfoWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfoWire {
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub price_precision: u32,
    #[serde(default)]
    pub quantity_precision: u32,
    #[serde(default)]
    pub filters: Vec<FilterWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterWire {
    pub filter_type: String,
    #[serde(default)]
    pub step_size: Option<String>,
    #[serde(default)]
    pub min_qty: Option<String>,
    #[serde(default)]
    pub max_qty: Option<String>,
    #[serde(default)]
    pub tick_size: Option<String>,
    #[serde(default)]
    pub min_price: Option<String>,
    #[serde(default)]
    pub max_price: Option<String>,
    #[serde(default, alias = "minNotional")]
    pub notional: Option<String>,
}

impl From<ExchangeInfoWire> for ExchangeInfo {
    fn from(wire: ExchangeInfoWire) -> Self {
        ExchangeInfo {
            symbols: wire.symbols.into_iter().map(SymbolInfo::from).collect(),
        }
    }
}

impl From<SymbolInfoWire> for SymbolInfo {
    fn from(wire: SymbolInfoWire) -> Self {
        let filters = wire.filters.iter().filter_map(convert_filter).collect();
        SymbolInfo {
            symbol: wire.symbol,
            status: wire.status,
            price_precision: wire.price_precision,
            quantity_precision: wire.quantity_precision,
            filters,
        }
    }
}

fn convert_filter(wire: &FilterWire) -> Option<SymbolFilter> {
    let f = |opt: &Option<String>| opt.as_deref().map(parse_f64).unwrap_or(0.0);
    match wire.filter_type.as_str() {
        "LOT_SIZE" => Some(SymbolFilter::LotSize {
            step_size: f(&wire.step_size),
            min_qty: f(&wire.min_qty),
            max_qty: f(&wire.max_qty),
        }),
        "MARKET_LOT_SIZE" => Some(SymbolFilter::MarketLotSize {
            step_size: f(&wire.step_size),
            min_qty: f(&wire.min_qty),
            max_qty: f(&wire.max_qty),
        }),
        "PRICE_FILTER" => Some(SymbolFilter::Price {
            tick_size: f(&wire.tick_size),
            min_price: f(&wire.min_price),
            max_price: f(&wire.max_price),
        }),
        "MIN_NOTIONAL" => Some(SymbolFilter::MinNotional {
            notional: f(&wire.notional),
        }),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponseWire {
    pub order_id: i64,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub client_order_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub avg_price: String,
    #[serde(default)]
    pub orig_qty: String,
    #[serde(default)]
    pub executed_qty: String,
    #[serde(default)]
    pub time_in_force: String,
    #[serde(rename = "type", default)]
    pub order_type: String,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub stop_price: String,
    #[serde(default)]
    pub update_time: i64,
}

impl From<OrderResponseWire> for OrderAck {
    fn from(wire: OrderResponseWire) -> Self {
        let stop_price = match parse_f64(&wire.stop_price) {
            p if p > 0.0 => Some(p),
            _ => None,
        };
        OrderAck {
            order_id: wire.order_id,
            client_order_id: wire.client_order_id,
            symbol: wire.symbol,
            status: wire.status.parse().unwrap_or(OrderStatus::Unknown),
            side: if wire.side == "SELL" {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            },
            order_type: wire.order_type,
            price: parse_f64(&wire.price),
            avg_price: parse_f64(&wire.avg_price),
            orig_qty: parse_f64(&wire.orig_qty),
            executed_qty: parse_f64(&wire.executed_qty),
            stop_price,
            time_in_force: wire.time_in_force,
            reduce_only: wire.reduce_only,
        }
    }
}

// ---- user-data stream frames ----

#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "e")]
    pub event_type: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderTradeUpdateWire {
    #[serde(rename = "o")]
    pub order: OrderUpdateWire,
}

#[derive(Debug, Deserialize)]
pub struct OrderUpdateWire {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c", default)]
    pub client_order_id: String,
    #[serde(rename = "S", default)]
    pub side: String,
    #[serde(rename = "o", default)]
    pub order_type: String,
    #[serde(rename = "x", default)]
    pub execution_type: String,
    #[serde(rename = "X", default)]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "l", default)]
    pub last_filled_qty: String,
    #[serde(rename = "z", default)]
    pub filled_qty: String,
    #[serde(rename = "ap", default)]
    pub avg_price: String,
    #[serde(rename = "rp", default)]
    pub realized_profit: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountUpdateWire {
    #[serde(rename = "a")]
    pub data: AccountUpdateDataWire,
}

#[derive(Debug, Deserialize)]
pub struct AccountUpdateDataWire {
    #[serde(rename = "m", default)]
    pub reason: String,
    #[serde(rename = "B", default)]
    pub balances: Vec<BalanceWire>,
    #[serde(rename = "P", default)]
    pub positions: Vec<PositionWire>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceWire {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb", default)]
    pub wallet_balance: String,
    #[serde(rename = "cw", default)]
    pub cross_wallet_balance: String,
    #[serde(rename = "bc", default)]
    pub balance_change: String,
}

#[derive(Debug, Deserialize)]
pub struct PositionWire {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa", default)]
    pub position_amount: String,
    #[serde(rename = "ep", default)]
    pub entry_price: String,
    #[serde(rename = "up", default)]
    pub unrealized_pnl: String,
    #[serde(rename = "mt", default)]
    pub margin_type: String,
    #[serde(rename = "ps", default)]
    pub position_side: String,
}

impl From<OrderTradeUpdateWire> for OrderUpdateEvent {
    fn from(wire: OrderTradeUpdateWire) -> Self {
        let o = wire.order;
        OrderUpdateEvent {
            symbol: o.symbol,
            order_id: o.order_id,
            client_order_id: o.client_order_id,
            side: o.side,
            order_type: o.order_type,
            execution_type: o.execution_type,
            status: o.status.parse().unwrap_or(OrderStatus::Unknown),
            last_filled_qty: parse_f64(&o.last_filled_qty),
            filled_qty: parse_f64(&o.filled_qty),
            avg_price: parse_f64(&o.avg_price),
            realized_profit: parse_f64(&o.realized_profit),
        }
    }
}

impl From<AccountUpdateWire> for AccountUpdateEvent {
    fn from(wire: AccountUpdateWire) -> Self {
        AccountUpdateEvent {
            reason: wire.data.reason,
            balances: wire
                .data
                .balances
                .into_iter()
                .map(|b| BalanceUpdate {
                    asset: b.asset,
                    wallet_balance: parse_f64(&b.wallet_balance),
                    cross_wallet_balance: parse_f64(&b.cross_wallet_balance),
                    balance_change: parse_f64(&b.balance_change),
                })
                .collect(),
            positions: wire
                .data
                .positions
                .into_iter()
                .map(|p| PositionStateUpdate {
                    symbol: p.symbol,
                    position_amount: parse_f64(&p.position_amount),
                    entry_price: parse_f64(&p.entry_price),
                    unrealized_pnl: parse_f64(&p.unrealized_pnl),
                    margin_type: p.margin_type,
                    position_side: p.position_side,
                })
                .collect(),
        }
    }
}

/// Parse one user-data frame. Frames that are not order or account updates,
/// and frames that fail to decode, yield `None` (likely heartbeats or event
/// kinds this bridge does not consume).
pub fn parse_stream_event(raw: &str) -> Option<StreamEvent> {
    let envelope: EventEnvelope = serde_json::from_str(raw).ok()?;
    match envelope.event_type.as_str() {
        "ORDER_TRADE_UPDATE" => {
            let wire: OrderTradeUpdateWire = serde_json::from_str(raw).ok()?;
            Some(StreamEvent::Order(wire.into()))
        }
        "ACCOUNT_UPDATE" => {
            let wire: AccountUpdateWire = serde_json::from_str(raw).ok()?;
            Some(StreamEvent::Account(wire.into()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_order_trade_update_frame() {
        let raw = r#"{
            "e": "ORDER_TRADE_UPDATE",
            "E": 1699999999999,
            "o": {
                "s": "BTCUSDT", "c": "abc", "S": "SELL", "o": "TAKE_PROFIT_MARKET",
                "f": "GTC", "q": "0.002", "p": "0", "ap": "50100.00", "sp": "50100.00",
                "x": "TRADE", "X": "FILLED", "i": 987654, "l": "0.002", "z": "0.002",
                "T": 1699999999999, "t": 1, "rp": "2.00", "R": true
            }
        }"#;
        match parse_stream_event(raw) {
            Some(StreamEvent::Order(ev)) => {
                assert_eq!(ev.symbol, "BTCUSDT");
                assert_eq!(ev.order_id, 987654);
                assert_eq!(ev.status, OrderStatus::Filled);
                assert!((ev.avg_price - 50_100.0).abs() < 1e-9);
                assert!((ev.filled_qty - 0.002).abs() < 1e-9);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn parses_account_update_frame() {
        let raw = r#"{
            "e": "ACCOUNT_UPDATE",
            "E": 1699999999999,
            "a": {
                "m": "ORDER",
                "B": [{"a": "USDT", "wb": "1000.0", "cw": "1000.0", "bc": "0"}],
                "P": [{"s": "BTCUSDT", "pa": "0.002", "ep": "50000.0", "up": "0.2", "mt": "cross", "ps": "BOTH"}]
            }
        }"#;
        match parse_stream_event(raw) {
            Some(StreamEvent::Account(ev)) => {
                assert_eq!(ev.balances.len(), 1);
                assert_eq!(ev.positions.len(), 1);
                assert!((ev.positions[0].position_amount - 0.002).abs() < 1e-9);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn unknown_and_malformed_frames_are_dropped_silently() {
        assert!(parse_stream_event(r#"{"e": "listenKeyExpired"}"#).is_none());
        assert!(parse_stream_event("not json").is_none());
        assert!(parse_stream_event(r#"{"ping": 1}"#).is_none());
    }

    #[test]
    fn converts_order_response() {
        let raw = r#"{
            "orderId": 123, "symbol": "BTCUSDT", "status": "NEW",
            "clientOrderId": "x", "price": "0", "avgPrice": "0.00000",
            "origQty": "0.002", "executedQty": "0", "timeInForce": "GTC",
            "type": "STOP_MARKET", "reduceOnly": true, "side": "SELL",
            "stopPrice": "49950.00", "updateTime": 1699999999999
        }"#;
        let wire: OrderResponseWire = serde_json::from_str(raw).unwrap();
        let ack: OrderAck = wire.into();
        assert_eq!(ack.order_id, 123);
        assert_eq!(ack.status, OrderStatus::New);
        assert_eq!(ack.side, OrderSide::Sell);
        assert_eq!(ack.stop_price, Some(49_950.0));
        assert!(ack.reduce_only);
    }

    #[test]
    fn converts_exchange_info_filters() {
        let raw = r#"{
            "symbols": [{
                "symbol": "BTCUSDT", "status": "TRADING",
                "pricePrecision": 2, "quantityPrecision": 3,
                "filters": [
                    {"filterType": "PRICE_FILTER", "tickSize": "0.10", "minPrice": "556.80", "maxPrice": "4529764"},
                    {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001", "maxQty": "1000"},
                    {"filterType": "MIN_NOTIONAL", "notional": "5"},
                    {"filterType": "PERCENT_PRICE", "multiplierUp": "1.05"}
                ]
            }]
        }"#;
        let wire: ExchangeInfoWire = serde_json::from_str(raw).unwrap();
        let info: ExchangeInfo = wire.into();
        let sym = info.symbol("BTCUSDT").unwrap();
        // the unknown PERCENT_PRICE filter is dropped
        assert_eq!(sym.filters.len(), 3);
        assert_eq!(sym.price_precision, 2);
    }
}
