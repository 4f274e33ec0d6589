//! 区域占用与移动追踪引擎
//!
//! # 组件
//!
//! - [`storage`] - redb 账本（事实来源）+ 物化计数
//! - [`processor`] - 扫码判定（ENTER/EXIT/MOVE 状态机）
//! - [`density`] - 占用快照聚合
//! - [`history`] - 行程重建
//! - [`reconcile`] - 周期性计数对账

pub mod density;
pub mod history;
pub mod processor;
pub mod reconcile;
pub mod storage;

pub use density::DensityAggregator;
pub use history::HistoryReconstructor;
pub use processor::{ScanOutcome, TrackerError, TrackerManager, TrackerResult};
pub use storage::{CountCorrection, LedgerStorage, StorageError, StorageResult, StorageStats};
