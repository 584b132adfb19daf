//! Signal extraction from free-text chat messages.

use std::sync::RwLock;

use regex::Regex;
use tracing::debug;

use crate::domain::errors::TradeError;
use crate::domain::value_objects::symbol::Symbol;

/// Applies the configured signal pattern to message text and yields one
/// normalized symbol per matching message.
///
/// The pattern is live-tunable from the dashboard; [`set_pattern`] swaps the
/// compiled regex atomically so in-flight parses keep the old one.
///
/// [`set_pattern`]: SignalExtractor::set_pattern
#[derive(Debug)]
pub struct SignalExtractor {
    pattern: RwLock<Regex>,
}

impl SignalExtractor {
    /// An invalid pattern at construction is a fatal configuration error.
    pub fn new(pattern: &str) -> Result<Self, TradeError> {
        let regex = Regex::new(pattern)
            .map_err(|e| TradeError::ConfigInvalid(format!("invalid signal pattern: {e}")))?;
        Ok(Self {
            pattern: RwLock::new(regex),
        })
    }

    /// Rebuild the regex; on error the previous pattern stays in place.
    pub fn set_pattern(&self, pattern: &str) -> Result<(), TradeError> {
        let regex = Regex::new(pattern)
            .map_err(|e| TradeError::ConfigInvalid(format!("invalid signal pattern: {e}")))?;
        *self.pattern.write().expect("pattern lock poisoned") = regex;
        Ok(())
    }

    pub fn pattern(&self) -> String {
        self.pattern
            .read()
            .expect("pattern lock poisoned")
            .as_str()
            .to_string()
    }

    /// Extract a symbol from message text.
    ///
    /// A non-matching message is not an error; it yields `None`. The first
    /// capture group is the raw symbol; `ignored` entries (bare or
    /// USDT-suffixed) are matched against the normalized symbol.
    pub fn parse(&self, text: &str, ignored: &[String]) -> Option<Symbol> {
        if text.is_empty() {
            return None;
        }

        let captured = {
            let pattern = self.pattern.read().expect("pattern lock poisoned");
            let caps = pattern.captures(text)?;
            caps.get(1)?.as_str().to_string()
        };

        let symbol = Symbol::normalize(&captured);
        if ignored
            .iter()
            .any(|entry| Symbol::normalize(entry) == symbol)
        {
            debug!(symbol = %symbol, "symbol is on the ignore list, dropping signal");
            return None;
        }

        Some(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = r"(?i)\$([A-Z]{2,10})\b";

    fn extractor() -> SignalExtractor {
        SignalExtractor::new(PATTERN).unwrap()
    }

    #[test]
    fn extracts_and_normalizes_symbol() {
        let symbol = extractor().parse("Long $BTC now, target 52k", &[]).unwrap();
        assert_eq!(symbol.as_str(), "BTCUSDT");
    }

    #[test]
    fn lowercase_ticker_matches_case_insensitive_pattern() {
        let symbol = extractor().parse("ape into $doge", &[]).unwrap();
        assert_eq!(symbol.as_str(), "DOGEUSDT");
    }

    #[test]
    fn non_matching_message_yields_nothing() {
        assert!(extractor().parse("gm, market looks quiet", &[]).is_none());
        assert!(extractor().parse("", &[]).is_none());
    }

    #[test]
    fn invalid_pattern_is_fatal() {
        let err = SignalExtractor::new("([unclosed").unwrap_err();
        assert!(matches!(err, TradeError::ConfigInvalid(_)));
    }

    #[test]
    fn ignore_list_filters_bare_and_suffixed_entries() {
        let ex = extractor();
        assert!(ex.parse("$BTC", &["BTC".to_string()]).is_none());
        assert!(ex.parse("$BTC", &["BTCUSDT".to_string()]).is_none());
        assert!(ex.parse("$ETH", &["BTC".to_string()]).is_some());
    }

    #[test]
    fn pattern_swap_applies_to_subsequent_parses() {
        let ex = extractor();
        assert!(ex.parse("buy #SOL", &[]).is_none());
        ex.set_pattern(r"(?i)#([A-Z]{2,10})\b").unwrap();
        assert_eq!(ex.parse("buy #SOL", &[]).unwrap().as_str(), "SOLUSDT");
    }

    #[test]
    fn pattern_swap_rejects_invalid_and_keeps_old() {
        let ex = extractor();
        assert!(ex.set_pattern("([bad").is_err());
        assert_eq!(ex.parse("$BTC", &[]).unwrap().as_str(), "BTCUSDT");
    }

    #[test]
    fn pattern_without_capture_group_yields_nothing() {
        let ex = SignalExtractor::new(r"(?i)\$[A-Z]{2,10}\b").unwrap();
        assert!(ex.parse("$BTC", &[]).is_none());
    }
}
