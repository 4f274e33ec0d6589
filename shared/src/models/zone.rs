//! Zone Model

use serde::{Deserialize, Serialize};

/// Zone entity (区域：寺庙、河坛、桥闸等)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    pub name: String,
    /// 位置信息（经纬度或地址文本）
    pub location_info: Option<String>,
    /// 容量上限（无上限时为 None）
    pub capacity: Option<u32>,
}

/// Create zone payload (seeding)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneCreate {
    pub name: String,
    pub location_info: Option<String>,
    pub capacity: Option<u32>,
}
