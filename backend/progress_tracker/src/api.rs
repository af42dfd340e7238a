//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{NativeAmount, Percent, UsdAmount};
use crate::errors::TrackerError;
use crate::oracle::PriceOracle;
use crate::progress::{normalize_campaign_id, ProgressStore};
use crate::rpc::ChainReader;
use crate::storage::KeyValueStore;
use crate::types::TokenSymbol;

pub struct ApiState<S, O, R> {
    pub store: Arc<ProgressStore<S, O>>,
    /// Used for state recovery on `init`.
    pub chain: R,
}

pub fn router<S, O, R>(state: Arc<ApiState<S, O, R>>) -> Router
where
    S: KeyValueStore + 'static,
    O: PriceOracle + 'static,
    R: ChainReader + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route(
            "/campaigns",
            get(list_campaigns::<S, O, R>).delete(clear_all::<S, O, R>),
        )
        .route("/campaigns/:id/progress", get(get_progress::<S, O, R>))
        .route("/campaigns/:id/init", post(initialize::<S, O, R>))
        .route("/campaigns/:id/donations", post(record_donation::<S, O, R>))
        .route("/campaigns/:id/sync", post(sync::<S, O, R>))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub goal: String,
    pub active: bool,
    /// Read the raised balance from the chain and seed it.
    #[serde(default)]
    pub recover: bool,
}

#[derive(Debug, Deserialize)]
pub struct DonationRequest {
    pub amount: String,
    pub token: TokenSymbol,
    pub proof: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub goal: String,
    pub raised: String,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressView {
    pub campaign_id: String,
    pub tracked: bool,
    pub goal_usd: UsdAmount,
    pub goal_native: NativeAmount,
    pub total_raised_usd: UsdAmount,
    pub total_raised_native: NativeAmount,
    pub progress_percent: Percent,
    pub donation_count: usize,
    pub is_locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct CampaignsResponse {
    pub count: usize,
    pub campaigns: Vec<String>,
}

#[derive(Serialize)]
pub struct ClearedResponse {
    pub removed: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(e: TrackerError) -> Response {
    let status = match e {
        TrackerError::InvalidAmount(_) | TrackerError::InvalidCampaignId(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

fn ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /campaigns`
pub async fn list_campaigns<S, O, R>(State(state): State<Arc<ApiState<S, O, R>>>) -> Response
where
    S: KeyValueStore,
    O: PriceOracle,
{
    match state.store.tracked_campaigns().await {
        Ok(campaigns) => ok(CampaignsResponse {
            count: campaigns.len(),
            campaigns,
        }),
        Err(e) => error_response(e),
    }
}

/// `DELETE /campaigns`
pub async fn clear_all<S, O, R>(State(state): State<Arc<ApiState<S, O, R>>>) -> Response
where
    S: KeyValueStore,
    O: PriceOracle,
{
    match state.store.clear_all().await {
        Ok(removed) => ok(ClearedResponse { removed }),
        Err(e) => error_response(e),
    }
}

/// `GET /campaigns/:id/progress`
///
/// Untracked campaigns report zeros rather than 404 so a progress bar can
/// always render.
pub async fn get_progress<S, O, R>(
    State(state): State<Arc<ApiState<S, O, R>>>,
    Path(campaign_id): Path<String>,
) -> Response
where
    S: KeyValueStore,
    O: PriceOracle,
{
    let campaign_id = match normalize_campaign_id(&campaign_id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };
    let view = match state.store.record(&campaign_id).await {
        Some(record) => ProgressView {
            tracked: true,
            goal_usd: record.goal_usd,
            goal_native: record.goal_native,
            total_raised_usd: record.total_raised_usd,
            total_raised_native: record.total_raised_native(),
            progress_percent: record.progress_percent,
            donation_count: record.donations.len(),
            is_locked: record.is_locked,
            locked_at: record.locked_at,
            campaign_id,
        },
        None => ProgressView {
            campaign_id,
            tracked: false,
            goal_usd: UsdAmount::ZERO,
            goal_native: NativeAmount::ZERO,
            total_raised_usd: UsdAmount::ZERO,
            total_raised_native: NativeAmount::ZERO,
            progress_percent: Percent::ZERO,
            donation_count: 0,
            is_locked: false,
            locked_at: None,
        },
    };
    ok(view)
}

/// `POST /campaigns/:id/init`
pub async fn initialize<S, O, R>(
    State(state): State<Arc<ApiState<S, O, R>>>,
    Path(campaign_id): Path<String>,
    Json(req): Json<InitRequest>,
) -> Response
where
    S: KeyValueStore,
    O: PriceOracle,
    R: ChainReader,
{
    let goal: NativeAmount = match req.goal.parse() {
        Ok(goal) => goal,
        Err(e) => return error_response(e),
    };
    let result = if req.recover {
        state
            .store
            .initialize_with_recovery(&campaign_id, goal, req.active, &state.chain)
            .await
    } else {
        state.store.initialize(&campaign_id, goal, req.active).await
    };
    match result {
        Ok(outcome) => ok(outcome),
        Err(e) => error_response(e),
    }
}

/// `POST /campaigns/:id/donations`
pub async fn record_donation<S, O, R>(
    State(state): State<Arc<ApiState<S, O, R>>>,
    Path(campaign_id): Path<String>,
    Json(req): Json<DonationRequest>,
) -> Response
where
    S: KeyValueStore,
    O: PriceOracle,
{
    let amount: NativeAmount = match req.amount.parse() {
        Ok(amount) => amount,
        Err(e) => return error_response(e),
    };
    match state
        .store
        .record_donation(&campaign_id, amount, req.token, req.proof.as_deref())
        .await
    {
        Ok(outcome) => ok(outcome),
        Err(e) => error_response(e),
    }
}

/// `POST /campaigns/:id/sync`
pub async fn sync<S, O, R>(
    State(state): State<Arc<ApiState<S, O, R>>>,
    Path(campaign_id): Path<String>,
    Json(req): Json<SyncRequest>,
) -> Response
where
    S: KeyValueStore,
    O: PriceOracle,
{
    let parsed = req
        .goal
        .parse::<NativeAmount>()
        .and_then(|goal| Ok((goal, req.raised.parse::<NativeAmount>()?)));
    let (goal, raised) = match parsed {
        Ok(amounts) => amounts,
        Err(e) => return error_response(e),
    };
    match state
        .store
        .sync(&campaign_id, goal, raised, req.active)
        .await
    {
        Ok(report) => ok(report),
        Err(e) => error_response(e),
    }
}
