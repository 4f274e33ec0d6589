//! Visitor directory backed by redb
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `visitors` | `client_id` | JSON `VisitorProfile` | Profile store |
//! | `visitor_codes` | unique_code | `client_id` | QR/RFID band index |
//! | `visitor_phones` | phone | `client_id` | Login / lookup index |
//! | `visitor_emails` | email | `client_id` | Login / lookup index |
//!
//! Shares the ledger's embedded database: one store per gate node, the
//! directory is just its own table group.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::models::{UserType, VisitorProfile};
use shared::util::{now_millis, snowflake_id, unique_code};
use std::sync::Arc;
use thiserror::Error;

const VISITORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("visitors");
const CODE_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("visitor_codes");
const PHONE_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("visitor_phones");
const EMAIL_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("visitor_emails");

/// Directory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Phone already registered")]
    DuplicatePhone,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Registration input
#[derive(Debug, Clone)]
pub struct RegisterVisitor {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub password: String,
    pub user_type: UserType,
}

/// Visitor profile store + identity resolver
#[derive(Clone)]
pub struct VisitorDirectory {
    db: Arc<Database>,
}

impl VisitorDirectory {
    pub fn new(db: Arc<Database>) -> DirectoryResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(VISITORS_TABLE)?;
            let _ = write_txn.open_table(CODE_INDEX_TABLE)?;
            let _ = write_txn.open_table(PHONE_INDEX_TABLE)?;
            let _ = write_txn.open_table(EMAIL_INDEX_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Register a new visitor: assigns `client_id` and an `RFID-<uuid>`
    /// band code, hashes the password, writes profile + indexes in one
    /// transaction.
    pub fn register(&self, input: RegisterVisitor) -> DirectoryResult<VisitorProfile> {
        let password_hash = super::hash_password(&input.password)
            .map_err(|e| DirectoryError::Hashing(e.to_string()))?;

        let profile = VisitorProfile {
            client_id: snowflake_id().to_string(),
            name: input.name,
            phone: input.phone,
            email: input.email,
            user_type: input.user_type,
            unique_code: unique_code(),
            password_hash,
            created_at: now_millis(),
        };

        let txn = self.db.begin_write()?;
        {
            // Uniqueness checks inside the registration transaction
            let phones = txn.open_table(PHONE_INDEX_TABLE)?;
            if phones.get(profile.phone.as_str())?.is_some() {
                return Err(DirectoryError::DuplicatePhone);
            }
            drop(phones);

            if let Some(email) = &profile.email {
                let emails = txn.open_table(EMAIL_INDEX_TABLE)?;
                if emails.get(email.as_str())?.is_some() {
                    return Err(DirectoryError::DuplicateEmail);
                }
            }

            let value = serde_json::to_vec(&profile)?;
            let mut visitors = txn.open_table(VISITORS_TABLE)?;
            visitors.insert(profile.client_id.as_str(), value.as_slice())?;
            drop(visitors);

            let mut codes = txn.open_table(CODE_INDEX_TABLE)?;
            codes.insert(profile.unique_code.as_str(), profile.client_id.as_str())?;
            drop(codes);

            let mut phones = txn.open_table(PHONE_INDEX_TABLE)?;
            phones.insert(profile.phone.as_str(), profile.client_id.as_str())?;
            drop(phones);

            if let Some(email) = &profile.email {
                let mut emails = txn.open_table(EMAIL_INDEX_TABLE)?;
                emails.insert(email.as_str(), profile.client_id.as_str())?;
            }
        }
        txn.commit()?;

        tracing::info!(client_id = %profile.client_id, "Visitor registered");
        Ok(profile)
    }

    /// Resolve a scanned QR/RFID code to a visitor profile
    pub fn resolve_code(&self, code: &str) -> DirectoryResult<Option<VisitorProfile>> {
        let read_txn = self.db.begin_read()?;
        let codes = read_txn.open_table(CODE_INDEX_TABLE)?;
        let client_id = match codes.get(code)? {
            Some(guard) => guard.value().to_string(),
            None => return Ok(None),
        };
        drop(codes);

        self.load_profile(&read_txn, &client_id)
    }

    pub fn find_by_client_id(&self, client_id: &str) -> DirectoryResult<Option<VisitorProfile>> {
        let read_txn = self.db.begin_read()?;
        self.load_profile(&read_txn, client_id)
    }

    pub fn find_by_phone(&self, phone: &str) -> DirectoryResult<Option<VisitorProfile>> {
        self.find_via_index(PHONE_INDEX_TABLE, phone)
    }

    pub fn find_by_email(&self, email: &str) -> DirectoryResult<Option<VisitorProfile>> {
        self.find_via_index(EMAIL_INDEX_TABLE, email)
    }

    fn find_via_index(
        &self,
        index: TableDefinition<&str, &str>,
        key: &str,
    ) -> DirectoryResult<Option<VisitorProfile>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(index)?;
        let client_id = match table.get(key)? {
            Some(guard) => guard.value().to_string(),
            None => return Ok(None),
        };
        drop(table);

        self.load_profile(&read_txn, &client_id)
    }

    fn load_profile(
        &self,
        read_txn: &redb::ReadTransaction,
        client_id: &str,
    ) -> DirectoryResult<Option<VisitorProfile>> {
        let visitors = read_txn.open_table(VISITORS_TABLE)?;
        match visitors.get(client_id)? {
            Some(value) => {
                let profile: VisitorProfile = serde_json::from_slice(value.value())?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    /// Number of registered visitors
    pub fn len(&self) -> DirectoryResult<u64> {
        use redb::ReadableTableMetadata;
        let read_txn = self.db.begin_read()?;
        let visitors = read_txn.open_table(VISITORS_TABLE)?;
        Ok(visitors.len()?)
    }
}

impl std::fmt::Debug for VisitorDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitorDirectory").finish_non_exhaustive()
    }
}
