use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::achievements::AchievementBoard;
use crate::error::JournalError;
use crate::indexer::Poller;
use crate::journal::{JournalStats, ManualTrade};
use crate::models::{CooldownState, EscalatingCooldown, PendingTrade, TrackedWallet, Trade, WalletHolding};
use crate::state::Journal;

#[derive(Clone)]
pub struct ApiState {
    pub journal: Arc<Journal>,
    pub poller: Arc<Poller>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("export failed: {0}")]
    Export(#[from] csv::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) | ApiError::Journal(JournalError::NothingPending) => StatusCode::NOT_FOUND,
            ApiError::Journal(JournalError::CooldownActive(_) | JournalError::DeadlinePassed(_)) => {
                StatusCode::CONFLICT
            }
            ApiError::Journal(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct PendingView {
    pub pending: Option<PendingTrade>,
    pub seconds_left: Option<i64>,
    pub queue_length: usize,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub emotion: String,
    #[serde(default)]
    pub passed_checklist: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct WalletView {
    pub wallet: Option<TrackedWallet>,
    pub is_tracking: bool,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub holdings: Vec<WalletHolding>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Trade Journal API running" }))
        .route("/pending", get(get_pending))
        .route("/pending/complete", post(complete_pending))
        .route("/cooldown", get(get_cooldown))
        .route("/escalation", get(get_escalation))
        .route("/trades", get(get_trades).post(add_trade))
        .route("/trades.csv", get(export_trades))
        .route("/stats", get(get_stats))
        .route("/achievements", get(get_achievements))
        .route("/wallet", get(get_wallet).post(track_wallet).delete(untrack_wallet))
        .route("/wallet/refresh", post(refresh_wallet))
        .route("/data", axum::routing::delete(clear_data))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(port: u16, state: ApiState) -> eyre::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// ---------- pending queue ----------

async fn get_pending(State(state): State<ApiState>) -> Json<PendingView> {
    let now = Utc::now();
    let pending = state.journal.current_prompt(now);
    Json(PendingView {
        seconds_left: pending.as_ref().map(|p| p.seconds_left(now)),
        pending,
        queue_length: state.journal.pending_len(),
    })
}

async fn complete_pending(
    State(state): State<ApiState>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<Trade>, ApiError> {
    let trade = state
        .journal
        .complete_log(&req.emotion, req.passed_checklist, &req.notes, Utc::now())?;
    Ok(Json(trade))
}

async fn get_cooldown(State(state): State<ApiState>) -> Json<CooldownState> {
    Json(state.journal.cooldown(Utc::now()))
}

async fn get_escalation(State(state): State<ApiState>) -> Json<EscalatingCooldown> {
    Json(state.journal.escalation())
}

// ---------- journal ----------

async fn get_trades(State(state): State<ApiState>) -> Json<Vec<Trade>> {
    Json(state.journal.trades())
}

async fn add_trade(
    State(state): State<ApiState>,
    Json(input): Json<ManualTrade>,
) -> Result<(StatusCode, Json<Trade>), ApiError> {
    let trade = state.journal.add_manual_trade(input, Utc::now())?;
    Ok((StatusCode::CREATED, Json(trade)))
}

async fn get_stats(State(state): State<ApiState>) -> Json<JournalStats> {
    Json(state.journal.stats())
}

async fn export_trades(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.journal.export_csv()?;
    let filename = format!("attachment; filename=\"trades_{}.csv\"", Utc::now().format("%Y-%m-%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        body,
    ))
}

async fn get_achievements(State(state): State<ApiState>) -> Json<AchievementBoard> {
    Json(state.journal.achievements(Utc::now()))
}

async fn clear_data(State(state): State<ApiState>) -> StatusCode {
    state.journal.clear_data();
    StatusCode::NO_CONTENT
}

// ---------- wallet ----------

fn wallet_view(state: &ApiState) -> WalletView {
    let snapshot = state.journal.snapshot();
    WalletView {
        wallet: snapshot.tracked_wallet,
        is_tracking: state.poller.is_running(),
        last_polled_at: snapshot.last_polled_at,
        holdings: snapshot.holdings,
    }
}

async fn get_wallet(State(state): State<ApiState>) -> Json<WalletView> {
    Json(wallet_view(&state))
}

async fn track_wallet(
    State(state): State<ApiState>,
    Json(req): Json<TrackRequest>,
) -> Result<Json<WalletView>, ApiError> {
    state.journal.start_tracking(&req.address, Utc::now())?;
    state.poller.start();
    Ok(Json(wallet_view(&state)))
}

async fn untrack_wallet(State(state): State<ApiState>) -> StatusCode {
    state.poller.stop();
    state.journal.stop_tracking();
    StatusCode::NO_CONTENT
}

async fn refresh_wallet(State(state): State<ApiState>) -> Result<Json<WalletView>, ApiError> {
    if state.journal.tracked_address().is_none() {
        return Err(ApiError::NotFound("no wallet is being tracked"));
    }
    if !state.poller.refresh_holdings().await {
        warn!("Manual holdings refresh failed, serving last known holdings");
    }
    Ok(Json(wallet_view(&state)))
}
