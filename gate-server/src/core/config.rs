//! 服务器配置
//!
//! 所有配置项从环境变量加载，缺省值面向单节点开发环境。

use crate::auth::JwtConfig;
use crate::utils::time::parse_timezone;
use chrono_tz::Tz;
use std::path::PathBuf;

/// Gate server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录 (数据库、日志)
    pub work_dir: String,
    pub http_port: u16,
    pub jwt: JwtConfig,
    pub environment: String,

    /// 业务时区 (历史行程时间戳按此时区渲染)
    pub timezone: Tz,
    /// 计数对账周期 (秒)
    pub reconcile_interval_secs: u64,
    /// 单访客扫码锁获取超时 (毫秒)；超时即拒绝，保持闸机响应
    pub scan_lock_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/gate-server".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            jwt: JwtConfig::default(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            timezone: parse_timezone(
                &std::env::var("BUSINESS_TIMEZONE").unwrap_or_else(|_| "Asia/Kolkata".into()),
            ),
            reconcile_interval_secs: std::env::var("RECONCILE_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300),
            scan_lock_timeout_ms: std::env::var("SCAN_LOCK_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(500),
        }
    }

    /// Create a config with custom overrides
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// 数据库目录 (work_dir/database)
    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    /// 日志目录 (work_dir/logs)
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
