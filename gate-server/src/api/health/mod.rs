//! Health API 模块

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::core::ServerState;
use crate::utils::AppResult;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub zones: usize,
    pub visitors: u64,
    pub visit_records: u64,
    pub open_visits: u64,
}

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/v1/health", get(health))
}

/// GET /api/v1/health - 存活检查与存储指标
async fn health(State(state): State<ServerState>) -> AppResult<Json<HealthStatus>> {
    let stats = state.tracker.storage().get_stats()?;
    let visitors = state.directory.len()?;

    Ok(Json(HealthStatus {
        status: "ok",
        zones: state.registry.len(),
        visitors,
        visit_records: stats.visit_count,
        open_visits: stats.open_visit_count,
    }))
}
