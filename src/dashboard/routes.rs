//! Dashboard route handlers.
//!
//! Read-only JSON views over the store: ledger listing, P&L summary, and
//! the current pending picks. The core operations themselves are not
//! exposed here.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::ledger;
use crate::store::Store;
use crate::types::{BetStatus, LedgerSummary, Recommendation};

/// Shared dashboard state.
pub struct DashboardState {
    pub store: Store,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(store: Store) -> Self {
        Self { store, started_at: Utc::now() }
    }
}

pub type AppState = Arc<DashboardState>;

fn internal_error(e: anyhow::Error) -> StatusCode {
    error!(error = %e, "Dashboard query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "started_at": state.started_at,
        "uptime_secs": uptime_secs,
    }))
}

pub async fn get_summary(
    State(state): State<AppState>,
) -> Result<Json<LedgerSummary>, StatusCode> {
    let summary = ledger::ledger_summary(&state.store)
        .await
        .map_err(internal_error)?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct LedgerParams {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

pub async fn get_ledger(
    State(state): State<AppState>,
    Query(params): Query<LedgerParams>,
) -> Result<Json<Vec<Recommendation>>, StatusCode> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(raw.parse::<BetStatus>().map_err(|_| StatusCode::BAD_REQUEST)?),
        None => None,
    };
    let limit = params.limit.unwrap_or(100).clamp(1, 1_000);

    let entries = state
        .store
        .ledger(limit, status)
        .await
        .map_err(internal_error)?;
    Ok(Json(entries))
}

pub async fn get_picks(
    State(state): State<AppState>,
) -> Result<Json<Vec<Recommendation>>, StatusCode> {
    let picks = state
        .store
        .pending_recommendations()
        .await
        .map_err(internal_error)?;
    Ok(Json(picks))
}
