//! 认证模块
//!
//! - [`jwt`] - JWT 令牌服务和访客上下文
//! - [`middleware`] - Axum 认证中间件

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, CurrentUser, JwtConfig, JwtError, JwtService};
pub use middleware::require_auth;
