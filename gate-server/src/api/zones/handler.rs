//! Zone catalog API Handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::core::ServerState;
use crate::utils::{AppError, AppResult};
use shared::models::Zone;

/// GET /api/v1/zones - 获取所有区域
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<Zone>>> {
    Ok(Json(state.registry.all().to_vec()))
}

/// GET /api/v1/zones/:id - 获取单个区域
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Zone>> {
    let zone = state
        .registry
        .get(id)
        .cloned()
        .ok_or_else(|| AppError::unknown_zone(format!("Zone {} not found", id)))?;
    Ok(Json(zone))
}
