//! Zone tracking API Handlers

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::tracking::ScanOutcome;
use crate::utils::validation::{validate_required_text, MAX_CODE_LEN};
use crate::utils::{AppError, AppResult};
use shared::models::VisitorProfile;
use shared::visit::{ScanResponse, VisitHistory, ZoneDensity};

/// Scan request body
///
/// `zone_id` accepts a numeric id or the zone's display name (QR plaques
/// at smaller ghats encode the name, readers at gates send the id).
/// Omitted or empty = "exit current zone". `timestamp` defaults to
/// processing time; readers with buffered offline scans backfill it.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub unique_code: String,
    #[serde(default)]
    pub zone_id: Option<ZoneParam>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Zone reference: numeric id or display name
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ZoneParam {
    Id(i64),
    Name(String),
}

impl ZoneParam {
    /// 空字符串视为未携带区域（= 离区请求）
    fn is_empty(&self) -> bool {
        matches!(self, ZoneParam::Name(s) if s.trim().is_empty())
    }

    fn resolve(&self, state: &ServerState) -> AppResult<i64> {
        match self {
            ZoneParam::Id(id) => Ok(*id),
            ZoneParam::Name(text) => {
                if let Ok(id) = text.trim().parse::<i64>() {
                    return Ok(id);
                }
                state
                    .registry
                    .find_by_name(text.trim())
                    .map(|z| z.id)
                    .ok_or_else(|| AppError::unknown_zone(format!("Zone '{}' not found", text)))
            }
        }
    }
}

/// POST /api/v1/zone/scan - 闸机/二维码扫码
pub async fn scan(
    State(state): State<ServerState>,
    Json(req): Json<ScanRequest>,
) -> AppResult<Json<ScanResponse>> {
    validate_required_text(&req.unique_code, "unique_code", MAX_CODE_LEN)?;

    let visitor = state
        .directory
        .resolve_code(req.unique_code.trim())?
        .ok_or_else(|| {
            AppError::unknown_visitor(format!("No visitor registered for code {}", req.unique_code))
        })?;

    let zone_id = match &req.zone_id {
        Some(param) if !param.is_empty() => Some(param.resolve(&state)?),
        _ => None,
    };

    let outcome = match zone_id {
        Some(zone_id) => state
            .tracker
            .process_scan(&visitor.client_id, zone_id, req.timestamp)?,
        // 未携带区域 = 离开当前区域
        None => state.tracker.process_exit(&visitor.client_id, req.timestamp)?,
    };

    Ok(Json(scan_response(&state, outcome)))
}

fn scan_response(state: &ServerState, outcome: ScanOutcome) -> ScanResponse {
    let action = outcome.action();
    match outcome {
        ScanOutcome::Entered { record } => {
            let zone = state.registry.zone_name(record.zone_id);
            ScanResponse {
                message: format!("Entry recorded at {}", zone),
                action,
                zone: Some(zone),
            }
        }
        ScanOutcome::Exited { record } => {
            let zone = state.registry.zone_name(record.zone_id);
            ScanResponse {
                message: format!("Exit recorded from {}", zone),
                action,
                zone: Some(zone),
            }
        }
        ScanOutcome::Moved { closed, record } => {
            let from = state.registry.zone_name(closed.zone_id);
            let zone = state.registry.zone_name(record.zone_id);
            ScanResponse {
                message: format!("Moved from {} to {}", from, zone),
                action,
                zone: Some(zone),
            }
        }
        ScanOutcome::AlreadyOutside => ScanResponse {
            message: "Not currently in any zone".to_string(),
            action,
            zone: None,
        },
    }
}

/// GET /api/v1/zone/density - 全区域占用快照
pub async fn density(State(state): State<ServerState>) -> AppResult<Json<Vec<ZoneDensity>>> {
    let snapshot = state.density.snapshot()?;
    Ok(Json(snapshot))
}

/// GET /api/v1/zone/history - 查询本人行程 (需登录)
pub async fn own_history(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<VisitHistory>> {
    let visitor = state
        .directory
        .find_by_client_id(&current_user.client_id)?
        .ok_or_else(|| {
            AppError::unknown_visitor(format!("Visitor {} not found", current_user.client_id))
        })?;

    build_history(&state, &visitor)
}

/// History lookup request body (失联香客查询)
#[derive(Debug, Deserialize)]
pub struct HistoryLookupRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// POST /api/v1/zone/history - 按邮箱/手机号查询他人行程
pub async fn lookup_history(
    State(state): State<ServerState>,
    Json(req): Json<HistoryLookupRequest>,
) -> AppResult<Json<VisitHistory>> {
    let visitor = match (&req.phone, &req.email) {
        (Some(phone), _) if !phone.trim().is_empty() => {
            state.directory.find_by_phone(phone.trim())?
        }
        (_, Some(email)) if !email.trim().is_empty() => {
            state.directory.find_by_email(email.trim())?
        }
        _ => {
            return Err(AppError::validation(
                "Provide an email or phone number to look up",
            ));
        }
    };

    let visitor =
        visitor.ok_or_else(|| AppError::unknown_visitor("No visitor matches that contact"))?;

    build_history(&state, &visitor)
}

fn build_history(state: &ServerState, visitor: &VisitorProfile) -> AppResult<Json<VisitHistory>> {
    let history = state.history.itinerary_for(&visitor.client_id)?;
    Ok(Json(VisitHistory {
        client_id: visitor.client_id.clone(),
        history,
    }))
}
