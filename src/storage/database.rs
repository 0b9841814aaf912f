// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `identities`: identity_id → serialized Identity (sessions included)
//! - `email_index`: normalized email → identity_id
//! - `one_time_tokens`: token digest → serialized OneTimeToken
//!
//! Every mutation is a single write transaction. redb runs write
//! transactions one at a time, so a read-modify-write of an identity
//! document is atomic with respect to every other mutation.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::repository::identities::Identity;
use super::repository::tokens::{OneTimeToken, TokenPurpose};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: identity_id → serialized Identity (JSON bytes).
const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");

/// Unique index: normalized email → identity_id.
const EMAIL_INDEX: TableDefinition<&str, &str> = TableDefinition::new("email_index");

/// One-time tokens: HMAC digest → serialized OneTimeToken.
const ONE_TIME_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("one_time_tokens");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// AuthDatabase
// =============================================================================

/// Embedded ACID identity database.
pub struct AuthDatabase {
    db: Database,
}

impl AuthDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(IDENTITIES)?;
            let _ = write_txn.open_table(EMAIL_INDEX)?;
            let _ = write_txn.open_table(ONE_TIME_TOKENS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Verify that a read transaction can be opened.
    pub fn health_check(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(IDENTITIES)?;
        Ok(())
    }

    // =========================================================================
    // Identity CRUD
    // =========================================================================

    /// Insert a new identity, enforcing email uniqueness.
    pub fn insert_identity(&self, identity: &Identity) -> StoreResult<()> {
        let json = serde_json::to_vec(identity)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut email_table = write_txn.open_table(EMAIL_INDEX)?;
            if email_table.get(identity.email.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "identity with email {}",
                    identity.email
                )));
            }
            let mut table = write_txn.open_table(IDENTITIES)?;
            if table.get(identity.id.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("identity {}", identity.id)));
            }
            table.insert(identity.id.as_str(), json.as_slice())?;
            email_table.insert(identity.email.as_str(), identity.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a single identity by ID.
    pub fn get_identity(&self, identity_id: &str) -> StoreResult<Option<Identity>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(IDENTITIES)?;
        match table.get(identity_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a normalized email to an identity ID.
    pub fn identity_id_by_email(&self, email: &str) -> StoreResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EMAIL_INDEX)?;
        Ok(table.get(email)?.map(|v| v.value().to_string()))
    }

    /// Read-modify-write one identity inside a single write transaction.
    ///
    /// Returns `None` when the identity does not exist (nothing is written).
    /// The closure sees the committed state and its changes are committed
    /// atomically; the email index is not touched.
    pub fn update_identity<T, F>(&self, identity_id: &str, f: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&mut Identity) -> T,
    {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(IDENTITIES)?;
            let current: Option<Identity> = match table.get(identity_id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            match current {
                Some(mut identity) => {
                    let result = f(&mut identity);
                    let json = serde_json::to_vec(&identity)?;
                    table.insert(identity_id, json.as_slice())?;
                    Some(result)
                }
                None => None,
            }
        };
        if result.is_some() {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(result)
    }

    /// Apply `f` to every identity, persisting the ones it reports as changed.
    ///
    /// Returns the number of identities rewritten.
    pub fn update_all_identities<F>(&self, mut f: F) -> StoreResult<usize>
    where
        F: FnMut(&mut Identity) -> bool,
    {
        let write_txn = self.db.begin_write()?;
        let changed = {
            let mut table = write_txn.open_table(IDENTITIES)?;
            let mut changed = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                let mut identity: Identity = serde_json::from_slice(value.value())?;
                if f(&mut identity) {
                    changed.push(identity);
                }
            }
            for identity in &changed {
                let json = serde_json::to_vec(identity)?;
                table.insert(identity.id.as_str(), json.as_slice())?;
            }
            changed.len()
        };
        write_txn.commit()?;
        Ok(changed)
    }

    // =========================================================================
    // One-time tokens
    // =========================================================================

    /// Store a one-time token under its digest.
    pub fn put_one_time_token(&self, digest: &str, token: &OneTimeToken) -> StoreResult<()> {
        let json = serde_json::to_vec(token)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ONE_TIME_TOKENS)?;
            table.insert(digest, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Consume a one-time token and update its identity in one transaction.
    ///
    /// The token is removed whenever it is found, even if it turns out to be
    /// expired or issued for another purpose. Returns `None` when the token
    /// is unusable or its identity is gone; in that case the identity is
    /// left untouched.
    pub fn redeem_one_time_token<T, F>(
        &self,
        digest: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
        f: F,
    ) -> StoreResult<Option<T>>
    where
        F: FnOnce(&mut Identity) -> T,
    {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut tokens = write_txn.open_table(ONE_TIME_TOKENS)?;
            let stored: Option<OneTimeToken> = match tokens.remove(digest)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            match stored.filter(|t| t.purpose == purpose && t.expires_at > now) {
                Some(token) => {
                    let mut table = write_txn.open_table(IDENTITIES)?;
                    let current: Option<Identity> = match table.get(token.identity_id.as_str())? {
                        Some(value) => Some(serde_json::from_slice(value.value())?),
                        None => None,
                    };
                    match current {
                        Some(mut identity) => {
                            let result = f(&mut identity);
                            let json = serde_json::to_vec(&identity)?;
                            table.insert(identity.id.as_str(), json.as_slice())?;
                            Some(result)
                        }
                        None => None,
                    }
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    /// Remove expired one-time tokens. Returns the number removed.
    pub fn purge_expired_one_time_tokens(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(ONE_TIME_TOKENS)?;
            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let token: OneTimeToken = serde_json::from_slice(value.value())?;
                if token.expires_at <= now {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                table.remove(key.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open() -> (TempDir, AuthDatabase) {
        let dir = TempDir::new().unwrap();
        let db = AuthDatabase::open(&dir.path().join("auth.redb")).unwrap();
        (dir, db)
    }

    fn identity(email: &str) -> Identity {
        Identity::new(email, "Test", "$argon2id$placeholder", Role::User)
    }

    #[test]
    fn insert_and_get_identity() {
        let (_dir, db) = open();
        let alice = identity("alice@example.com");
        db.insert_identity(&alice).unwrap();

        let loaded = db.get_identity(&alice.id).unwrap().unwrap();
        assert_eq!(loaded.email, "alice@example.com");
        assert_eq!(
            db.identity_id_by_email("alice@example.com").unwrap(),
            Some(alice.id.clone())
        );
        assert!(db.get_identity("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let (_dir, db) = open();
        db.insert_identity(&identity("dup@example.com")).unwrap();
        let result = db.insert_identity(&identity("dup@example.com"));
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn update_identity_persists_changes() {
        let (_dir, db) = open();
        let bob = identity("bob@example.com");
        db.insert_identity(&bob).unwrap();

        let result = db
            .update_identity(&bob.id, |i| {
                i.verified = true;
                42
            })
            .unwrap();
        assert_eq!(result, Some(42));
        assert!(db.get_identity(&bob.id).unwrap().unwrap().verified);

        assert_eq!(db.update_identity("missing", |_| ()).unwrap(), None);
    }

    #[test]
    fn one_time_tokens_are_single_use() {
        let (_dir, db) = open();
        let carol = identity("carol@example.com");
        db.insert_identity(&carol).unwrap();

        let now = Utc::now();
        let token = OneTimeToken {
            identity_id: carol.id.clone(),
            purpose: TokenPurpose::EmailVerification,
            expires_at: now + Duration::hours(1),
        };
        db.put_one_time_token("digest", &token).unwrap();

        // Wrong purpose consumes the token without touching the identity
        let wrong = db
            .redeem_one_time_token("digest", TokenPurpose::PasswordReset, now, |_| ())
            .unwrap();
        assert!(wrong.is_none());

        db.put_one_time_token("digest", &token).unwrap();
        let ok = db
            .redeem_one_time_token("digest", TokenPurpose::EmailVerification, now, |i| {
                i.verified = true;
            })
            .unwrap();
        assert!(ok.is_some());
        assert!(db.get_identity(&carol.id).unwrap().unwrap().verified);

        let again = db
            .redeem_one_time_token("digest", TokenPurpose::EmailVerification, now, |_| ())
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn expired_one_time_tokens_are_purged() {
        let (_dir, db) = open();
        let now = Utc::now();
        let stale = OneTimeToken {
            identity_id: "x".to_string(),
            purpose: TokenPurpose::PasswordReset,
            expires_at: now - Duration::minutes(1),
        };
        let fresh = OneTimeToken {
            expires_at: now + Duration::minutes(10),
            ..stale.clone()
        };
        db.put_one_time_token("stale", &stale).unwrap();
        db.put_one_time_token("fresh", &fresh).unwrap();

        assert_eq!(db.purge_expired_one_time_tokens(now).unwrap(), 1);
        assert!(db
            .redeem_one_time_token("stale", TokenPurpose::PasswordReset, now, |_| ())
            .unwrap()
            .is_none());
    }
}
