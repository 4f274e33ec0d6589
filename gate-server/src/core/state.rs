//! 服务器状态

use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwtService;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::Config;
use crate::identity::VisitorDirectory;
use crate::registry::ZoneRegistry;
use crate::tracking::{
    reconcile::run_reconciliation_loop, DensityAggregator, HistoryReconstructor, LedgerStorage,
    TrackerManager,
};

/// 服务器状态 - 持有所有服务的单例引用
///
/// ServerState 是闸机节点的核心数据结构，持有所有服务的共享引用。
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | registry | Arc<ZoneRegistry> | 区域静态目录 |
/// | tracker | Arc<TrackerManager> | 扫码处理器 |
/// | density | Arc<DensityAggregator> | 占用快照聚合 |
/// | history | Arc<HistoryReconstructor> | 行程重建 |
/// | directory | Arc<VisitorDirectory> | 访客身份目录 |
/// | jwt_service | Arc<JwtService> | JWT 认证服务 |
#[derive(Clone, Debug)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 区域静态目录
    pub registry: Arc<ZoneRegistry>,
    /// 扫码处理器 (账本写入口)
    pub tracker: Arc<TrackerManager>,
    /// 占用快照聚合
    pub density: Arc<DensityAggregator>,
    /// 行程重建
    pub history: Arc<HistoryReconstructor>,
    /// 访客身份目录
    pub directory: Arc<VisitorDirectory>,
    /// JWT 认证服务
    pub jwt_service: Arc<JwtService>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录结构 (确保目录存在)
    /// 2. 账本数据库 (work_dir/database/tracker.redb)
    /// 3. 区域目录播种
    /// 4. 各服务 (Tracker, Density, History, Directory, JWT)
    ///
    /// # Panics
    ///
    /// 数据库初始化失败时 panic
    pub async fn initialize(config: &Config) -> Self {
        // 0. Ensure work_dir structure exists
        config
            .ensure_work_dir_structure()
            .expect("Failed to create work directory structure");

        // 1. Initialize ledger storage
        let db_path = config.database_dir().join("tracker.redb");
        let storage = LedgerStorage::open(&db_path).expect("Failed to initialize ledger database");

        // 2. Seed the zone registry
        let registry = Arc::new(ZoneRegistry::with_default_catalog());

        Self::with_storage(config.clone(), storage, registry)
    }

    /// 从已有存储构造状态 (测试与嵌入式场景)
    pub fn with_storage(
        config: Config,
        storage: LedgerStorage,
        registry: Arc<ZoneRegistry>,
    ) -> Self {
        let directory = Arc::new(
            VisitorDirectory::new(storage.database()).expect("Failed to initialize directory"),
        );
        let tracker = Arc::new(TrackerManager::new(
            storage.clone(),
            registry.clone(),
            Duration::from_millis(config.scan_lock_timeout_ms),
        ));
        let density = Arc::new(DensityAggregator::new(storage.clone(), registry.clone()));
        let history = Arc::new(HistoryReconstructor::new(
            storage,
            registry.clone(),
            config.timezone,
        ));
        let jwt_service = Arc::new(JwtService::with_config(config.jwt.clone()));

        Self {
            config,
            registry,
            tracker,
            density,
            history,
            directory,
            jwt_service,
        }
    }

    /// 启动后台任务
    ///
    /// 必须在 `Server::run()` 的服务循环前调用。
    ///
    /// 启动的任务：
    /// - 计数对账 (Periodic)
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let aggregator = (*self.density).clone();
        let interval = Duration::from_secs(self.config.reconcile_interval_secs);
        let token = tasks.shutdown_token();
        tasks.spawn("count_reconciliation", TaskKind::Periodic, async move {
            run_reconciliation_loop(aggregator, interval, token).await;
        });

        tasks
    }

    /// 获取 JWT 服务
    pub fn jwt_service(&self) -> Arc<JwtService> {
        self.jwt_service.clone()
    }
}
