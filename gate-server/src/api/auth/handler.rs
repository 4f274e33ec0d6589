//! Auth API Handlers

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::ValidateEmail;

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::identity::{verify_password, RegisterVisitor};
use crate::utils::validation::{
    validate_optional_text, validate_required_text, MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_PASSWORD_LEN,
    MAX_PHONE_LEN,
};
use crate::utils::{AppError, AppResult};
use shared::models::{UserType, VisitorProfile, VisitorView};

/// 固定延迟，拉平用户存在/不存在时的响应时间
const AUTH_FIXED_DELAY_MS: u64 = 80;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    #[serde(default, rename = "userType")]
    pub user_type: UserType,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: VisitorView,
}

/// POST /api/v1/auth/register - 登记访客并发放腕带编码
pub async fn register(
    State(state): State<ServerState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    validate_required_text(&req.name, "name", MAX_NAME_LEN)?;
    validate_required_text(&req.phone, "phone", MAX_PHONE_LEN)?;
    validate_required_text(&req.password, "password", MAX_PASSWORD_LEN)?;
    validate_optional_text(&req.email, "email", MAX_EMAIL_LEN)?;
    if let Some(email) = &req.email
        && !email.validate_email()
    {
        return Err(AppError::validation(format!("Invalid email: {}", email)));
    }

    let profile = state.directory.register(RegisterVisitor {
        name: req.name.trim().to_string(),
        phone: req.phone.trim().to_string(),
        email: req.email.map(|e| e.trim().to_string()),
        password: req.password,
        user_type: req.user_type,
    })?;

    respond_with_token(&state, &profile, "User registered successfully")
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

/// POST /api/v1/auth/login - 手机号或邮箱登录
pub async fn login(
    State(state): State<ServerState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let profile = match (&req.phone, &req.email) {
        (Some(phone), _) if !phone.trim().is_empty() => {
            state.directory.find_by_phone(phone.trim())?
        }
        (_, Some(email)) if !email.trim().is_empty() => {
            state.directory.find_by_email(email.trim())?
        }
        _ => return Err(AppError::validation("Provide a phone number or email")),
    };

    // Fixed delay to prevent timing attacks (before checking result)
    tokio::time::sleep(Duration::from_millis(AUTH_FIXED_DELAY_MS)).await;

    // Unified error message to prevent phone/email enumeration
    let profile = profile.ok_or_else(AppError::invalid_credentials)?;

    let password_valid = verify_password(&req.password, &profile.password_hash)
        .map_err(|e| AppError::internal(format!("Password verification failed: {}", e)))?;
    if !password_valid {
        tracing::warn!(client_id = %profile.client_id, "Login failed - invalid credentials");
        return Err(AppError::invalid_credentials());
    }

    respond_with_token(&state, &profile, "Login successful")
}

/// GET /api/v1/auth/profile - 当前访客档案
pub async fn profile(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<VisitorView>> {
    let profile = state
        .directory
        .find_by_client_id(&current_user.client_id)?
        .ok_or_else(|| {
            AppError::unknown_visitor(format!("Visitor {} not found", current_user.client_id))
        })?;
    Ok(Json(VisitorView::from(&profile)))
}

fn respond_with_token(
    state: &ServerState,
    profile: &VisitorProfile,
    message: &str,
) -> AppResult<Json<AuthResponse>> {
    let token = state
        .jwt_service
        .generate_token(profile)
        .map_err(|e| AppError::internal(format!("Token generation failed: {}", e)))?;

    Ok(Json(AuthResponse {
        message: message.to_string(),
        token,
        user: VisitorView::from(profile),
    }))
}
