//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查和存储指标
//! - [`auth`] - 注册/登录/本人档案
//! - [`zone`] - 扫码、密度快照、行程查询
//! - [`zones`] - 区域目录
//! - [`crowd`] - 视觉人群检测状态（降级桩）

pub mod auth;
pub mod crowd;
pub mod health;
pub mod zone;
pub mod zones;

// Re-export common types for handlers
pub use crate::utils::{AppResponse, AppResult};
