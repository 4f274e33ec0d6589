//! 工具模块
//!
//! - [`error`] - 统一错误类型和 API 响应结构
//! - [`result`] - Result 类型别名
//! - [`logger`] - tracing 日志初始化
//! - [`time`] - 业务时区时间格式化
//! - [`validation`] - 输入校验辅助函数

pub mod error;
pub mod logger;
pub mod result;
pub mod time;
pub mod validation;

pub use error::{AppError, AppResponse, ok, ok_with_message};
pub use result::AppResult;
