//! Exchange metadata consumed by the sizing logic.
//!
//! These are the already-parsed counterparts of the exchange-info payload;
//! the gateway implementation converts the wire representation into them.

/// Margin type applied to a symbol before dispatch. Only cross margin is
/// used by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginType {
    Crossed,
    Isolated,
}

impl std::fmt::Display for MarginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarginType::Crossed => write!(f, "CROSSED"),
            MarginType::Isolated => write!(f, "ISOLATED"),
        }
    }
}

/// Exchange trading rules for all listed symbols.
#[derive(Debug, Clone, Default)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

impl ExchangeInfo {
    pub fn symbol(&self, symbol: &str) -> Option<&SymbolInfo> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

/// Per-symbol trading rules.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub filters: Vec<SymbolFilter>,
}

/// Per-symbol exchange constraints. Unparseable filter kinds are dropped at
/// the wire boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolFilter {
    /// LOT_SIZE
    LotSize {
        step_size: f64,
        min_qty: f64,
        max_qty: f64,
    },
    /// MARKET_LOT_SIZE, preferred over LOT_SIZE for market orders
    MarketLotSize {
        step_size: f64,
        min_qty: f64,
        max_qty: f64,
    },
    /// PRICE_FILTER
    Price {
        tick_size: f64,
        min_price: f64,
        max_price: f64,
    },
    /// MIN_NOTIONAL
    MinNotional { notional: f64 },
}
