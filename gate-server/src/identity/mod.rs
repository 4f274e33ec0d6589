//! 身份目录与解析
//!
//! 访客档案的存储与解析：扫码编码 → 访客、邮箱/手机号 → 访客、
//! JWT Claims → 访客。账本只引用 `client_id`，档案归这里所有。

pub mod directory;

pub use directory::{DirectoryError, DirectoryResult, RegisterVisitor, VisitorDirectory};

/// Hash a password using argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(password_hash.to_string())
}

/// Verify a password against its argon2 hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHash, PasswordVerifier},
    };

    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("har-har-mahadev").unwrap();
        assert!(verify_password("har-har-mahadev", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
