//! REST handlers for the dashboard.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::application::channels::ChannelControl;
use crate::application::events::EventBus;
use crate::application::registry::GatewayRegistry;
use crate::application::settings::{RuntimeSettings, SettingsUpdate};
use crate::domain::services::extractor::SignalExtractor;
use crate::persistence::models::{Account, AccountDraft, Channel, OrderRecord, Position, TradingStats};
use crate::persistence::repository::Repository;
use crate::persistence::StoreError;
use crate::secrets::mask_secret;

#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub settings: Arc<RuntimeSettings>,
    pub extractor: Arc<SignalExtractor>,
    pub registry: Arc<GatewayRegistry>,
    pub channels: Arc<dyn ChannelControl>,
    pub bus: EventBus,
}

/// JSON error body with an HTTP status, per the dashboard contract.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::AccountInUse => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<TradingStats>, ApiError> {
    Ok(Json(state.repo.trading_stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn get_positions(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Position>>, ApiError> {
    let limit = query.limit.unwrap_or(100).max(1);
    Ok(Json(state.repo.all_positions(limit).await?))
}

pub async fn get_open_positions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Position>>, ApiError> {
    Ok(Json(state.repo.open_positions().await?))
}

pub async fn get_position(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Position>, ApiError> {
    state
        .repo
        .get_position(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("position not found"))
}

pub async fn get_orders_by_position(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<OrderRecord>>, ApiError> {
    Ok(Json(state.repo.orders_by_position(id).await?))
}

// ---- channels ----

#[derive(Debug, Deserialize)]
pub struct ChannelRequest {
    pub identifier: String,
}

pub async fn get_channels(State(state): State<AppState>) -> Result<Json<Vec<Channel>>, ApiError> {
    Ok(Json(state.channels.list().await?))
}

pub async fn subscribe_channel(
    State(state): State<AppState>,
    Json(req): Json<ChannelRequest>,
) -> Result<Json<Channel>, ApiError> {
    if req.identifier.trim().is_empty() {
        return Err(ApiError::bad_request("identifier is required"));
    }
    Ok(Json(state.channels.subscribe(req.identifier.trim()).await?))
}

pub async fn unsubscribe_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.channels.unsubscribe(id).await?;
    Ok(Json(json!({ "status": "unsubscribed" })))
}

// ---- accounts ----

fn masked(mut account: Account) -> Account {
    account.api_secret = mask_secret(&account.api_secret);
    account
}

pub async fn get_accounts(State(state): State<AppState>) -> Result<Json<Vec<Account>>, ApiError> {
    let accounts = state.repo.list_accounts().await?;
    Ok(Json(accounts.into_iter().map(masked).collect()))
}

fn validate_draft(draft: &AccountDraft) -> Result<(), ApiError> {
    if draft.name.trim().is_empty() || draft.api_key.is_empty() || draft.api_secret.is_empty() {
        return Err(ApiError::bad_request(
            "name, api_key and api_secret are required",
        ));
    }
    // zero means "apply the default"; explicit values must be sane
    if draft.order_timeout_seconds != 0 && draft.order_timeout_seconds < 60 {
        return Err(ApiError::bad_request(
            "order_timeout_seconds must be at least 60",
        ));
    }
    Ok(())
}

pub async fn create_account(
    State(state): State<AppState>,
    Json(draft): Json<AccountDraft>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    validate_draft(&draft)?;
    let account = state.repo.create_account(draft).await?;
    Ok((StatusCode::CREATED, Json(masked(account))))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Account>, ApiError> {
    state
        .repo
        .get_account(id)
        .await?
        .map(|account| Json(masked(account)))
        .ok_or_else(|| ApiError::not_found("account not found"))
}

pub async fn update_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(draft): Json<AccountDraft>,
) -> Result<Json<Account>, ApiError> {
    validate_draft(&draft)?;
    let account = state.repo.update_account(id, draft).await?;
    state.registry.invalidate(id);
    Ok(Json(masked(account)))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.repo.delete_account(id).await?;
    state.registry.invalidate(id);
    Ok(Json(json!({ "status": "deleted" })))
}

pub async fn set_default_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.repo.set_default_account(id).await?;
    Ok(Json(json!({ "status": "default account updated" })))
}

// ---- live configuration ----

#[derive(Debug, Deserialize)]
pub struct ConfigUpdateBody {
    pub trading: Option<SettingsUpdate>,
}

pub async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "trading": state.settings.snapshot() }))
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(body): Json<ConfigUpdateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(update) = body.trading else {
        return Ok(Json(json!({ "status": "unchanged" })));
    };

    // Validate the pattern before anything is persisted so a bad regex
    // cannot take down signal extraction.
    if let Some(pattern) = &update.signal_pattern {
        Regex::new(pattern)
            .map_err(|e| ApiError::bad_request(format!("invalid signal pattern: {e}")))?;
    }

    let pattern_update = update.signal_pattern.clone();
    state.settings.apply(update).await?;

    if let Some(pattern) = pattern_update {
        state
            .extractor
            .set_pattern(&pattern)
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
    }

    tracing::info!("trading configuration updated from dashboard");
    Ok(Json(json!({ "status": "updated" })))
}
