//! Visitor Model

use serde::{Deserialize, Serialize};

/// Visitor category (香客类别)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UserType {
    #[default]
    Civilian,
    #[serde(rename = "VIP")]
    Vip,
    Sadhu,
    Aged,
    Admin,
}

/// Visitor profile (referenced by the ledger, owned by the identity directory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorProfile {
    pub client_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub user_type: UserType,
    /// QR/RFID 腕带编码，格式 `RFID-<uuid>`
    pub unique_code: String,
    /// Argon2 哈希后的密码；对外只暴露 [`VisitorView`]，档案本体不出站
    pub password_hash: String,
    pub created_at: i64,
}

/// Public view of a visitor (login/register/profile responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorView {
    pub client_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    #[serde(rename = "userType")]
    pub user_type: UserType,
    pub unique_code: String,
}

impl From<&VisitorProfile> for VisitorView {
    fn from(p: &VisitorProfile) -> Self {
        Self {
            client_id: p.client_id.clone(),
            name: p.name.clone(),
            phone: p.phone.clone(),
            email: p.email.clone(),
            user_type: p.user_type,
            unique_code: p.unique_code.clone(),
        }
    }
}
