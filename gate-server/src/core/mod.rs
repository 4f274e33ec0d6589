//! 核心模块：配置、状态、服务器与后台任务

pub mod config;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use server::{build_app, build_router, Server};
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
