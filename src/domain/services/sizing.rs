//! Price/quantity computation under exchange filter constraints.
//!
//! `target_percent` and `stoploss_percent` are expressed in account-return
//! terms: at 10x leverage a 0.02 target needs a 0.2% price move, so the
//! percentages are divided by leverage to obtain the price delta.

use crate::domain::entities::exchange::{SymbolFilter, SymbolInfo};

#[derive(Debug, Clone, Copy)]
pub struct LotRule {
    pub step_size: f64,
    pub min_qty: f64,
    pub max_qty: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceRule {
    pub tick_size: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// The subset of a symbol's filters the executor needs, with precision
/// fallbacks for symbols missing a filter.
#[derive(Debug, Clone)]
pub struct SizingRules {
    pub lot: Option<LotRule>,
    pub price: Option<PriceRule>,
    pub min_notional: Option<f64>,
    pub price_precision: u32,
    pub quantity_precision: u32,
}

impl SizingRules {
    /// Select the filters used for rounding. `MARKET_LOT_SIZE` wins over
    /// `LOT_SIZE` when both are present.
    pub fn from_symbol(info: &SymbolInfo) -> Self {
        let mut lot = None;
        let mut market_lot = None;
        let mut price = None;
        let mut min_notional = None;

        for filter in &info.filters {
            match *filter {
                SymbolFilter::LotSize {
                    step_size,
                    min_qty,
                    max_qty,
                } => {
                    lot = Some(LotRule {
                        step_size,
                        min_qty,
                        max_qty,
                    })
                }
                SymbolFilter::MarketLotSize {
                    step_size,
                    min_qty,
                    max_qty,
                } => {
                    market_lot = Some(LotRule {
                        step_size,
                        min_qty,
                        max_qty,
                    })
                }
                SymbolFilter::Price {
                    tick_size,
                    min_price,
                    max_price,
                } => {
                    price = Some(PriceRule {
                        tick_size,
                        min_price,
                        max_price,
                    })
                }
                SymbolFilter::MinNotional { notional } => min_notional = Some(notional),
            }
        }

        Self {
            lot: market_lot.or(lot),
            price,
            min_notional,
            price_precision: info.price_precision,
            quantity_precision: info.quantity_precision,
        }
    }
}

/// The sized bracket handed to order dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub quantity: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
}

/// Account-level sizing inputs.
#[derive(Debug, Clone, Copy)]
pub struct BracketParams {
    pub leverage: u32,
    pub order_amount: f64,
    pub target_percent: f64,
    pub stoploss_percent: f64,
}

/// Round to the nearest multiple of `step`, clamped to `[min, max]` where
/// the bound is positive.
pub fn round_to_step(value: f64, step: f64, min: f64, max: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    let mut rounded = (value / step + 0.5).floor() * step;
    if min > 0.0 && rounded < min {
        rounded = min;
    }
    if max > 0.0 && rounded > max {
        rounded = max;
    }
    rounded
}

/// Decimal truncation used when a symbol carries no usable filter.
pub fn truncate_to_precision(value: f64, precision: u32) -> f64 {
    let multiplier = 10f64.powi(precision as i32);
    (value * multiplier).trunc() / multiplier
}

/// Compute the bracket for a LONG entry at `entry` price.
pub fn size_bracket(entry: f64, params: &BracketParams, rules: &SizingRules) -> Bracket {
    let leverage = params.leverage as f64;
    let take_profit = entry * (1.0 + params.target_percent / leverage);
    let stop_loss = entry * (1.0 - params.stoploss_percent / leverage);

    let mut quantity = params.order_amount / entry;
    quantity = round_quantity(quantity, rules);

    let (take_profit, stop_loss) = match rules.price {
        Some(rule) => (
            round_to_step(take_profit, rule.tick_size, rule.min_price, rule.max_price),
            round_to_step(stop_loss, rule.tick_size, rule.min_price, rule.max_price),
        ),
        None => (
            truncate_to_precision(take_profit, rules.price_precision),
            truncate_to_precision(stop_loss, rules.price_precision),
        ),
    };

    // Bump up to the notional floor, then conform to the lot step again.
    if let Some(min_notional) = rules.min_notional {
        if quantity * entry < min_notional {
            quantity = round_quantity(min_notional / entry, rules);
        }
    }

    Bracket {
        quantity,
        take_profit_price: take_profit,
        stop_loss_price: stop_loss,
    }
}

fn round_quantity(quantity: f64, rules: &SizingRules) -> f64 {
    match rules.lot {
        Some(rule) => round_to_step(quantity, rule.step_size, rule.min_qty, rule.max_qty),
        None => truncate_to_precision(quantity, rules.quantity_precision),
    }
}
