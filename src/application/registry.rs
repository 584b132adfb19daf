//! Per-account gateway registry.
//!
//! Built lazily from account rows and invalidated by the dashboard's account
//! CRUD so credential changes take effect without a restart. User-data
//! streams for accounts added at runtime start on the next process restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::BinanceConfig;
use crate::domain::errors::TradeError;
use crate::infrastructure::binance::{
    BinanceClient, DEFAULT_BASE_URL, DEFAULT_WS_BASE_URL, TESTNET_BASE_URL, TESTNET_WS_BASE_URL,
};
use crate::persistence::models::Account;

pub struct GatewayRegistry {
    base_url: Option<String>,
    ws_base_url: Option<String>,
    clients: RwLock<HashMap<i64, Arc<BinanceClient>>>,
}

impl GatewayRegistry {
    pub fn new(cfg: &BinanceConfig) -> Arc<Self> {
        // empty strings in the config mean "use the per-account default"
        Arc::new(Self {
            base_url: cfg.base_url.clone().filter(|url| !url.is_empty()),
            ws_base_url: cfg.ws_base_url.clone().filter(|url| !url.is_empty()),
            clients: RwLock::new(HashMap::new()),
        })
    }

    /// Fetch or build the client for an account.
    pub fn gateway_for(&self, account: &Account) -> Result<Arc<BinanceClient>, TradeError> {
        if let Some(client) = self
            .clients
            .read()
            .expect("registry lock poisoned")
            .get(&account.id)
        {
            return Ok(client.clone());
        }

        let client = Arc::new(self.build(account)?);
        self.clients
            .write()
            .expect("registry lock poisoned")
            .insert(account.id, client.clone());
        Ok(client)
    }

    fn build(&self, account: &Account) -> Result<BinanceClient, TradeError> {
        let (default_base, default_ws) = if account.is_testnet {
            (TESTNET_BASE_URL, TESTNET_WS_BASE_URL)
        } else {
            (DEFAULT_BASE_URL, DEFAULT_WS_BASE_URL)
        };
        let base = self.base_url.as_deref().unwrap_or(default_base);
        let ws = self.ws_base_url.as_deref().unwrap_or(default_ws);

        BinanceClient::with_urls(&account.api_key, &account.api_secret, base, ws)
            .map_err(|e| TradeError::ConfigInvalid(format!("cannot build exchange client: {e}")))
    }

    /// Drop the cached client after a credential change or deletion.
    pub fn invalidate(&self, account_id: i64) {
        self.clients
            .write()
            .expect("registry lock poisoned")
            .remove(&account_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(id: i64, testnet: bool) -> Account {
        Account {
            id,
            name: "main".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            is_testnet: testnet,
            is_active: true,
            is_default: true,
            leverage: 10,
            order_amount_usdt: 100.0,
            target_percent: 0.02,
            stoploss_percent: 0.01,
            order_timeout_seconds: 600,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn caches_clients_per_account() {
        let registry = GatewayRegistry::new(&BinanceConfig::default());
        let first = registry.gateway_for(&account(1, false)).unwrap();
        let second = registry.gateway_for(&account(1, false)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let registry = GatewayRegistry::new(&BinanceConfig::default());
        let first = registry.gateway_for(&account(1, false)).unwrap();
        registry.invalidate(1);
        let second = registry.gateway_for(&account(1, false)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn testnet_account_uses_testnet_ws() {
        let registry = GatewayRegistry::new(&BinanceConfig::default());
        let client = registry.gateway_for(&account(2, true)).unwrap();
        assert_eq!(client.ws_base_url(), TESTNET_WS_BASE_URL);
    }
}
