// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity repository.
//!
//! An identity document carries the principal's credentials together with
//! its two session vectors (storefront and console). Keeping the sessions
//! inside the document is what makes the tenant partition structural.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::super::database::{AuthDatabase, StoreResult};
use super::sessions::SessionRecord;
use crate::auth::{Role, Tenant};

/// Identity stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Unique identity identifier (UUID)
    pub id: String,
    /// Normalized email address (unique)
    pub email: String,
    /// Display name
    pub name: String,
    /// Argon2 PHC hash
    pub password_hash: String,
    /// Role
    pub role: Role,
    /// Whether the email address has been confirmed
    #[serde(default)]
    pub verified: bool,
    /// Last password change; access tokens issued before it are rejected
    #[serde(default)]
    pub password_changed_at: Option<DateTime<Utc>>,
    /// When the identity was created
    pub created_at: DateTime<Utc>,
    /// Live storefront sessions
    #[serde(default)]
    pub user_sessions: Vec<SessionRecord>,
    /// Live console sessions
    #[serde(default)]
    pub admin_sessions: Vec<SessionRecord>,
}

impl Identity {
    /// Create a new identity with no sessions.
    pub fn new(email: &str, name: &str, password_hash: &str, role: Role) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: normalize_email(email),
            name: name.trim().to_string(),
            password_hash: password_hash.to_string(),
            role,
            verified: false,
            password_changed_at: None,
            created_at: Utc::now(),
            user_sessions: Vec::new(),
            admin_sessions: Vec::new(),
        }
    }

    /// Sessions of one tenant.
    pub fn sessions(&self, tenant: Tenant) -> &Vec<SessionRecord> {
        match tenant {
            Tenant::User => &self.user_sessions,
            Tenant::Admin => &self.admin_sessions,
        }
    }

    /// Mutable sessions of one tenant.
    pub fn sessions_mut(&mut self, tenant: Tenant) -> &mut Vec<SessionRecord> {
        match tenant {
            Tenant::User => &mut self.user_sessions,
            Tenant::Admin => &mut self.admin_sessions,
        }
    }
}

/// Canonical form of an email address: NFKC, trimmed, lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfkc().collect::<String>().to_lowercase()
}

/// Minimal shape check for an email address.
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && email.len() <= 254
}

/// Repository for identity operations.
pub struct IdentityRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> IdentityRepository<'a> {
    /// Create a new IdentityRepository.
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Create a new identity. Fails with `AlreadyExists` on a duplicate email.
    pub fn create(&self, identity: &Identity) -> StoreResult<()> {
        self.db.insert_identity(identity)
    }

    /// Get an identity by ID.
    pub fn get(&self, identity_id: &str) -> StoreResult<Option<Identity>> {
        self.db.get_identity(identity_id)
    }

    /// Get an identity by email (normalized before lookup).
    pub fn get_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        match self.db.identity_id_by_email(&normalize_email(email))? {
            Some(id) => self.db.get_identity(&id),
            None => Ok(None),
        }
    }

    /// Replace the password hash, stamp `password_changed_at` and drop every
    /// storefront session, all in one transaction.
    ///
    /// Returns the number of sessions removed, or `None` if the identity is gone.
    pub fn set_password(
        &self,
        identity_id: &str,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> StoreResult<Option<usize>> {
        self.db.update_identity(identity_id, |identity| {
            apply_password_change(identity, password_hash, changed_at)
        })
    }

    /// Mark an identity's email as verified.
    pub fn mark_verified(&self, identity_id: &str) -> StoreResult<bool> {
        Ok(self
            .db
            .update_identity(identity_id, |identity| identity.verified = true)?
            .is_some())
    }

    /// Promote an identity to a role.
    pub fn set_role(&self, identity_id: &str, role: Role) -> StoreResult<bool> {
        Ok(self
            .db
            .update_identity(identity_id, |identity| identity.role = role)?
            .is_some())
    }
}

/// Password-change mutation shared by change-password and reset-password.
pub(crate) fn apply_password_change(
    identity: &mut Identity,
    password_hash: &str,
    changed_at: DateTime<Utc>,
) -> usize {
    identity.password_hash = password_hash.to_string();
    identity.password_changed_at = Some(changed_at);
    let removed = identity.user_sessions.len();
    identity.user_sessions.clear();
    removed
}
