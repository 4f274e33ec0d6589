//! Zone tracking API 模块
//!
//! 扫码、密度快照与行程查询，挂载在 `/api/v1/zone` 下。

mod handler;

use axum::{routing::get, routing::post, Router};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/v1/zone", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/scan", post(handler::scan))
        .route("/density", get(handler::density))
        .route(
            "/history",
            get(handler::own_history).post(handler::lookup_history),
        )
}
