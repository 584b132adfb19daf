//! Binance USDT-M futures client.
//!
//! Signed REST access plus the long-lived user-data stream. Authenticated
//! requests carry a millisecond timestamp and an HMAC-SHA256 signature of
//! the url-encoded parameter string, hex-encoded, with the API key sent as
//! the `X-MBX-APIKEY` header.

pub mod types;
pub mod user_stream;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::Sha256;
use tracing::{debug, info};

use crate::domain::entities::exchange::{ExchangeInfo, MarginType};
use crate::domain::entities::order::{OrderAck, OrderDraft};
use crate::domain::repositories::gateway::{FuturesGateway, GatewayError, GatewayResult};
use crate::secrets::ApiCredentials;

use types::{ApiErrorWire, ExchangeInfoWire, ListenKeyWire, OrderResponseWire, PriceTickerWire};

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";
pub const TESTNET_BASE_URL: &str = "https://testnet.binancefuture.com";
pub const DEFAULT_WS_BASE_URL: &str = "wss://fstream.binance.com";
pub const TESTNET_WS_BASE_URL: &str = "wss://stream.binancefuture.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum BinanceError {
    #[error("binance api error [{code}]: {msg}")]
    Api { code: i64, msg: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl From<BinanceError> for GatewayError {
    fn from(err: BinanceError) -> Self {
        match err {
            BinanceError::Api { code, msg } => GatewayError::Api { code, msg },
            BinanceError::Decode(e) => GatewayError::Decode(e.to_string()),
            other => GatewayError::Network(other.to_string()),
        }
    }
}

/// Margin-type rejections that mean the symbol is already configured.
fn is_margin_noop(err: &BinanceError) -> bool {
    matches!(err, BinanceError::Api { msg, .. } if msg.contains("No need to change margin type"))
}

pub struct BinanceClient {
    credentials: ApiCredentials,
    base_url: String,
    ws_base_url: String,
    http: reqwest::Client,
}

impl BinanceClient {
    pub fn new(api_key: &str, api_secret: &str, is_testnet: bool) -> Result<Self, BinanceError> {
        let (base, ws_base) = if is_testnet {
            (TESTNET_BASE_URL, TESTNET_WS_BASE_URL)
        } else {
            (DEFAULT_BASE_URL, DEFAULT_WS_BASE_URL)
        };
        Self::with_urls(api_key, api_secret, base, ws_base)
    }

    pub fn with_urls(
        api_key: &str,
        api_secret: &str,
        base_url: &str,
        ws_base_url: &str,
    ) -> Result<Self, BinanceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            credentials: ApiCredentials::new(api_key, api_secret),
            base_url: base_url.trim_end_matches('/').to_string(),
            ws_base_url: ws_base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn ws_base_url(&self) -> &str {
        &self.ws_base_url
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn encode_params(params: &[(&str, String)]) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
        signed: bool,
    ) -> Result<Vec<u8>, BinanceError> {
        if signed {
            params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
        }
        let mut query = Self::encode_params(&params);
        if signed {
            let signature = self.sign(&query);
            if query.is_empty() {
                query = format!("signature={signature}");
            } else {
                query = format!("{query}&signature={signature}");
            }
        }

        let url = format!("{}{}", self.base_url, path);
        let builder = if method == Method::GET || method == Method::DELETE {
            let url = if query.is_empty() {
                url
            } else {
                format!("{url}?{query}")
            };
            self.http.request(method, url)
        } else {
            self.http
                .request(method, url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(query)
        };

        let response = builder
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            if let Ok(api_err) = serde_json::from_slice::<ApiErrorWire>(&body) {
                return Err(BinanceError::Api {
                    code: api_err.code,
                    msg: api_err.msg,
                });
            }
            return Err(BinanceError::UnexpectedResponse {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body.to_vec())
    }

    pub async fn get_symbol_price(&self, symbol: &str) -> Result<f64, BinanceError> {
        let body = self
            .request(
                Method::GET,
                "/fapi/v1/ticker/price",
                vec![("symbol", symbol.to_string())],
                false,
            )
            .await?;
        let ticker: PriceTickerWire = serde_json::from_slice(&body)?;
        ticker.price.parse().map_err(|_| BinanceError::UnexpectedResponse {
            status: 200,
            body: format!("unparseable price for {}: {}", ticker.symbol, ticker.price),
        })
    }

    pub async fn get_exchange_info(&self) -> Result<ExchangeInfo, BinanceError> {
        let body = self
            .request(Method::GET, "/fapi/v1/exchangeInfo", Vec::new(), false)
            .await?;
        let wire: ExchangeInfoWire = serde_json::from_slice(&body)?;
        Ok(wire.into())
    }

    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), BinanceError> {
        self.request(
            Method::POST,
            "/fapi/v1/leverage",
            vec![
                ("symbol", symbol.to_string()),
                ("leverage", leverage.to_string()),
            ],
            true,
        )
        .await?;
        debug!(symbol, leverage, "leverage set");
        Ok(())
    }

    pub async fn set_margin_type(
        &self,
        symbol: &str,
        margin: MarginType,
    ) -> Result<(), BinanceError> {
        let result = self
            .request(
                Method::POST,
                "/fapi/v1/marginType",
                vec![
                    ("symbol", symbol.to_string()),
                    ("marginType", margin.to_string()),
                ],
                true,
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_margin_noop(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn place_order(&self, draft: &OrderDraft) -> Result<OrderAck, BinanceError> {
        let mut params = vec![
            ("symbol", draft.symbol.clone()),
            ("side", draft.side.to_string()),
            ("type", draft.order_type.to_string()),
        ];
        if draft.quantity > 0.0 {
            params.push(("quantity", format!("{:.8}", draft.quantity)));
        }
        if let Some(price) = draft.price {
            params.push(("price", format!("{price:.8}")));
        }
        if let Some(stop_price) = draft.stop_price {
            params.push(("stopPrice", format!("{stop_price:.8}")));
        }
        if draft.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        if let Some(client_order_id) = &draft.client_order_id {
            params.push(("newClientOrderId", client_order_id.clone()));
        }

        let body = self
            .request(Method::POST, "/fapi/v1/order", params, true)
            .await?;
        let wire: OrderResponseWire = serde_json::from_slice(&body)?;
        let ack: OrderAck = wire.into();
        info!(
            symbol = %ack.symbol,
            order_id = ack.order_id,
            side = %draft.side,
            order_type = %draft.order_type,
            status = %ack.status,
            "order placed"
        );
        Ok(ack)
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<OrderAck, BinanceError> {
        let body = self
            .request(
                Method::DELETE,
                "/fapi/v1/order",
                vec![
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
                true,
            )
            .await?;
        let wire: OrderResponseWire = serde_json::from_slice(&body)?;
        info!(symbol, order_id, "order cancelled");
        Ok(wire.into())
    }

    pub async fn query_order(&self, symbol: &str, order_id: i64) -> Result<OrderAck, BinanceError> {
        let body = self
            .request(
                Method::GET,
                "/fapi/v1/order",
                vec![
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
                true,
            )
            .await?;
        let wire: OrderResponseWire = serde_json::from_slice(&body)?;
        Ok(wire.into())
    }

    pub async fn start_user_stream(&self) -> Result<String, BinanceError> {
        let body = self
            .request(Method::POST, "/fapi/v1/listenKey", Vec::new(), true)
            .await?;
        let wire: ListenKeyWire = serde_json::from_slice(&body)?;
        info!("user data stream started");
        Ok(wire.listen_key)
    }

    pub async fn keepalive_user_stream(&self, listen_key: &str) -> Result<(), BinanceError> {
        self.request(
            Method::PUT,
            "/fapi/v1/listenKey",
            vec![("listenKey", listen_key.to_string())],
            true,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FuturesGateway for BinanceClient {
    async fn symbol_price(&self, symbol: &str) -> GatewayResult<f64> {
        Ok(self.get_symbol_price(symbol).await?)
    }

    async fn exchange_info(&self) -> GatewayResult<ExchangeInfo> {
        Ok(self.get_exchange_info().await?)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> GatewayResult<()> {
        Ok(BinanceClient::set_leverage(self, symbol, leverage).await?)
    }

    async fn set_margin_type(&self, symbol: &str, margin: MarginType) -> GatewayResult<()> {
        Ok(BinanceClient::set_margin_type(self, symbol, margin).await?)
    }

    async fn place_order(&self, draft: &OrderDraft) -> GatewayResult<OrderAck> {
        Ok(BinanceClient::place_order(self, draft).await?)
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> GatewayResult<OrderAck> {
        Ok(BinanceClient::cancel_order(self, symbol, order_id).await?)
    }

    async fn query_order(&self, symbol: &str, order_id: i64) -> GatewayResult<OrderAck> {
        Ok(BinanceClient::query_order(self, symbol, order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_secret(secret: &str) -> BinanceClient {
        BinanceClient::with_urls("api-key", secret, DEFAULT_BASE_URL, DEFAULT_WS_BASE_URL)
            .unwrap()
    }

    #[test]
    fn signs_canonical_example() {
        // Signature example from the exchange API documentation.
        let client = client_with_secret(
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
        );
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client.sign(query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn encodes_params_in_order() {
        let encoded = BinanceClient::encode_params(&[
            ("symbol", "BTCUSDT".to_string()),
            ("side", "BUY".to_string()),
            ("type", "MARKET".to_string()),
        ]);
        assert_eq!(encoded, "symbol=BTCUSDT&side=BUY&type=MARKET");
    }

    #[test]
    fn margin_noop_rejection_is_success() {
        let noop = BinanceError::Api {
            code: -4046,
            msg: "No need to change margin type.".into(),
        };
        assert!(is_margin_noop(&noop));

        let real = BinanceError::Api {
            code: -2019,
            msg: "Margin is insufficient.".into(),
        };
        assert!(!is_margin_noop(&real));
    }

    #[test]
    fn testnet_selects_testnet_urls() {
        let client = BinanceClient::new("k", "s", true).unwrap();
        assert_eq!(client.base_url, TESTNET_BASE_URL);
        assert_eq!(client.ws_base_url(), TESTNET_WS_BASE_URL);
    }
}
