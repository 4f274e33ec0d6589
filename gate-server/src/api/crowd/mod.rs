//! Crowd detection status API (降级桩)
//!
//! 视觉人群检测引擎是独立的可选组件；本服务只提供其离线降级响应，
//! 前端据此回落到数据库密度指标。

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::core::ServerState;

#[derive(Debug, Serialize)]
pub struct CrowdStatus {
    pub camera_active: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CrowdZones {
    pub total: u32,
    pub zones: Vec<serde_json::Value>,
}

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/v1/crowd/status", get(status))
        .route("/api/v1/crowd/zones", get(zones))
}

/// GET /api/v1/crowd/status - 检测引擎状态
async fn status() -> Json<CrowdStatus> {
    Json(CrowdStatus {
        camera_active: false,
        message: "AI Detection Engine Offline. Using database metrics.".to_string(),
    })
}

/// GET /api/v1/crowd/zones - 检测引擎区域数据 (离线时为空)
async fn zones() -> Json<CrowdZones> {
    Json(CrowdZones {
        total: 0,
        zones: vec![],
    })
}
