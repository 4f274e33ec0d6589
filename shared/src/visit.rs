//! Zone visit records and wire structures
//!
//! The ledger stores [`VisitRecord`]s; everything else here is the
//! shape those records take on the HTTP surface (scan responses,
//! density snapshots, reconstructed itineraries).

use serde::{Deserialize, Serialize};

/// One stay of one visitor inside one zone.
///
/// `left_at == None` marks an open record: the visitor is currently
/// considered inside `zone_id`. At most one open record may exist per
/// visitor at any time — the ledger enforces this as a hard invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    /// Ledger-assigned record id, strictly increasing per database
    pub id: u64,
    pub visitor_id: String,
    pub zone_id: i64,
    /// 上一个区域（首次入园时为 None）
    pub previous_zone_id: Option<i64>,
    /// 入区时间 (Unix millis)
    pub entered_at: i64,
    /// 离区时间 (Unix millis)，在区内时为 None
    pub left_at: Option<i64>,
}

impl VisitRecord {
    pub fn is_open(&self) -> bool {
        self.left_at.is_none()
    }

    /// 停留时长（秒），记录未关闭时为 None
    pub fn duration_secs(&self) -> Option<i64> {
        self.left_at.map(|left| (left - self.entered_at) / 1000)
    }
}

/// What a scan did (扫码动作)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanAction {
    /// No open record → opened one at the scanned zone
    Enter,
    /// Open record at the scanned zone → closed it ("scan again to leave")
    Exit,
    /// Open record at a different zone → closed it and opened a new one
    Move,
}

impl std::fmt::Display for ScanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanAction::Enter => write!(f, "ENTER"),
            ScanAction::Exit => write!(f, "EXIT"),
            ScanAction::Move => write!(f, "MOVE"),
        }
    }
}

/// Scan response body: `POST /api/v1/zone/scan`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub message: String,
    pub action: ScanAction,
    /// 本次动作落在的区域名（幂等的重复退出响应中为 null）
    pub zone: Option<String>,
}

/// Density snapshot entry: `GET /api/v1/zone/density`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneDensity {
    pub zone_id: i64,
    pub zone_name: String,
    pub density: u64,
}

/// One reconstructed itinerary leg: `GET/POST /api/v1/zone/history`
///
/// Field names match the consuming UI exactly; `enter_time`/`leave_time`
/// are RFC-3339 strings in the business timezone, `duration_spent` is
/// whole seconds and null while the visitor is still inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItineraryLeg {
    pub last_zone: Option<String>,
    pub current_zone: String,
    pub enter_time: String,
    pub leave_time: Option<String>,
    pub duration_spent: Option<i64>,
}

/// Full history response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitHistory {
    pub client_id: String,
    pub history: Vec<ItineraryLeg>,
}
