//! Input validation helpers
//!
//! Centralized text length constants and validation functions for the
//! registration and lookup payloads.

use crate::utils::AppError;

// ── Text length limits ──────────────────────────────────────────────

/// Visitor and zone names
pub const MAX_NAME_LEN: usize = 200;

/// Phone numbers
pub const MAX_PHONE_LEN: usize = 20;

/// Email addresses (RFC 5321)
pub const MAX_EMAIL_LEN: usize = 254;

/// Passwords (before hashing)
pub const MAX_PASSWORD_LEN: usize = 128;

/// Unique codes (`RFID-<uuid>` is 41 chars; leave headroom for other band formats)
pub const MAX_CODE_LEN: usize = 64;

// ── Validation helpers ──────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    if value.len() > max_len {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        )));
    }
    Ok(())
}

/// Validate that an optional string, if present, is within the length limit.
pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> Result<(), AppError> {
    if let Some(v) = value
        && v.len() > max_len
    {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            v.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text_rejects_empty_and_oversized() {
        assert!(validate_required_text("Ram Ghat", "name", MAX_NAME_LEN).is_ok());
        assert!(validate_required_text("   ", "name", MAX_NAME_LEN).is_err());
        assert!(validate_required_text(&"x".repeat(MAX_NAME_LEN + 1), "name", MAX_NAME_LEN).is_err());
    }

    #[test]
    fn test_optional_text_passes_none() {
        assert!(validate_optional_text(&None, "email", MAX_EMAIL_LEN).is_ok());
        assert!(
            validate_optional_text(&Some("x".repeat(MAX_EMAIL_LEN + 1)), "email", MAX_EMAIL_LEN)
                .is_err()
        );
    }
}
