//! Dashboard HTTP surface.
//!
//! Read-only views of stats, positions and orders, CRUD on accounts and
//! channels, live trading settings, and the WebSocket push feed. The web
//! layer talks to the pipeline only through the store, the settings service
//! and the event bus.

pub mod handlers;
pub mod ws;

use std::future::Future;

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::WebApiConfig;
use crate::rate_limit::{api_rate_limiter, enforce};

pub use handlers::AppState;

pub fn router(state: AppState, cfg: &WebApiConfig) -> Router {
    let api = Router::new()
        .route("/stats", get(handlers::get_stats))
        .route("/positions", get(handlers::get_positions))
        .route("/positions/open", get(handlers::get_open_positions))
        .route("/positions/{id}", get(handlers::get_position))
        .route("/orders/position/{id}", get(handlers::get_orders_by_position))
        .route(
            "/channels",
            get(handlers::get_channels).post(handlers::subscribe_channel),
        )
        .route("/channels/{id}", delete(handlers::unsubscribe_channel))
        .route(
            "/accounts",
            get(handlers::get_accounts).post(handlers::create_account),
        )
        .route(
            "/accounts/{id}",
            get(handlers::get_account)
                .put(handlers::update_account)
                .delete(handlers::delete_account),
        )
        .route("/accounts/{id}/set-default", post(handlers::set_default_account))
        .route(
            "/config",
            get(handlers::get_config).put(handlers::update_config),
        )
        .route("/ws", get(ws::ws_handler));

    let limiter = api_rate_limiter();

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn(move |request, next| {
            enforce(limiter.clone(), request, next)
        }))
        .layer(cors_layer(&cfg.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind and serve until the shutdown future resolves.
pub async fn serve(
    state: AppState,
    cfg: WebApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state, &cfg);
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "web api listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}
