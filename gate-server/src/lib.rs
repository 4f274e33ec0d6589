//! Gate Server - 朝圣区域人流追踪边缘节点
//!
//! # 架构概述
//!
//! 本模块是 Gate Server 的主入口，提供以下核心功能：
//!
//! - **追踪引擎** (`tracking`): 扫码状态机、占用账本、密度聚合、行程重建
//! - **区域目录** (`registry`): 静态区域注册表
//! - **身份目录** (`identity`): 访客档案与编码解析
//! - **认证** (`auth`): JWT + Argon2 认证体系
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! gate-server/src/
//! ├── core/          # 配置、状态、服务器、后台任务
//! ├── auth/          # JWT 认证
//! ├── api/           # HTTP 路由和处理器
//! ├── registry/      # 区域静态目录
//! ├── identity/      # 访客身份目录
//! ├── tracking/      # 占用账本与扫码处理
//! └── utils/         # 工具函数
//! ```

pub mod api;
pub mod auth;
pub mod core;
pub mod identity;
pub mod registry;
pub mod tracking;
pub mod utils;

// Re-export 公共类型
pub use auth::{CurrentUser, JwtService};
pub use self::core::{build_router, Config, Server, ServerState};
pub use identity::VisitorDirectory;
pub use registry::ZoneRegistry;
pub use tracking::{DensityAggregator, HistoryReconstructor, LedgerStorage, TrackerManager};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境 (dotenv + 日志)
pub fn setup_environment() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    init_logger_with_file(log_level.as_deref(), log_dir.as_deref());

    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
   ______      __
  / ____/___ _/ /____
 / / __/ __ `/ __/ _ \
/ /_/ / /_/ / /_/  __/
\____/\__,_/\__/\___/
   _____
  / ___/___  ______   _____  _____
  \__ \/ _ \/ ___/ | / / _ \/ ___/
 ___/ /  __/ /   | |/ /  __/ /
/____/\___/_/    |___/\___/_/
    "#
    );
}
