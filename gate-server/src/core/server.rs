//! Server Implementation
//!
//! HTTP 服务器启动和路由装配

use crate::auth::require_auth;
use crate::core::ServerState;
use axum::{middleware, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

/// HTTP 请求日志中间件
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let status = response.status();

    tracing::info!(target: "http_access", "{} {} {}", method, uri, status);

    response
}

/// Build the Axum router (without state)
pub fn build_app() -> Router<ServerState> {
    Router::<ServerState>::new()
        // Core APIs
        .merge(crate::api::auth::router())
        .merge(crate::api::health::router())
        // Tracking APIs
        .merge(crate::api::zone::router())
        .merge(crate::api::zones::router())
        .merge(crate::api::crowd::router())
}

/// Build the full service with middleware and state applied
pub fn build_router(state: ServerState) -> Router {
    build_app()
        // JWT 认证中间件 - require_auth 内部会跳过公共路由
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
        // Tower HTTP 中间件
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        // HTTP 请求日志中间件
        .layer(middleware::from_fn(log_request))
}

/// HTTP Server
pub struct Server {
    state: ServerState,
}

impl Server {
    pub fn with_state(state: ServerState) -> Self {
        Self { state }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let state = self.state.clone();

        // Start background tasks
        let tasks = state.start_background_tasks();

        let app = build_router(state);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        tracing::info!("🛕 Gate server listening on {}", addr);
        tracing::info!(
            zones = self.state.registry.len(),
            timezone = %self.state.config.timezone,
            "Zone tracking active"
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down...");
            })
            .await?;

        // Stop the reconciliation worker after the listener drains
        tasks.shutdown().await;

        Ok(())
    }
}
