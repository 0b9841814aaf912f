// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session store.
//!
//! Sessions live inside the identity document, one vector per tenant. Each
//! operation below is a single write transaction on that document, which
//! gives the rotation protocol its atomic "remove if present, then append"
//! primitive without any in-process lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{AuthDatabase, StoreResult};
use super::identities::Identity;
use crate::auth::Tenant;

/// One logged-in device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SessionRecord {
    /// Refresh token currently valid for this device
    pub token: String,
    /// Client IP at issuance
    pub issued_from_ip: String,
    /// Client user agent at issuance
    pub user_agent: String,
    /// When this record was created (login or last rotation)
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a record stamped with the current time.
    pub fn new(token: &str, ip: &str, user_agent: &str) -> Self {
        Self {
            token: token.to_string(),
            issued_from_ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Result of an atomic rotation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The presented token was live; it has been replaced by the new record.
    Rotated,
    /// The presented token was not live. Every session of the tenant has
    /// been revoked in the same transaction.
    ReuseDetected { revoked: usize },
    /// The identity does not exist.
    IdentityMissing,
}

/// Repository for session operations.
pub struct SessionRepository<'a> {
    db: &'a AuthDatabase,
    max_sessions: usize,
}

impl<'a> SessionRepository<'a> {
    /// Create a new SessionRepository keeping at most `max_sessions` records
    /// per identity and tenant.
    pub fn new(db: &'a AuthDatabase, max_sessions: usize) -> Self {
        Self {
            db,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Append a session record, evicting the oldest beyond the cap.
    ///
    /// Returns `false` if the identity does not exist.
    pub fn append(&self, tenant: Tenant, identity_id: &str, record: SessionRecord) -> StoreResult<bool> {
        let cap = self.max_sessions;
        Ok(self
            .db
            .update_identity(identity_id, |identity| {
                push_capped(identity, tenant, record, cap);
            })?
            .is_some())
    }

    /// Find a session by its exact token.
    pub fn find_by_token(
        &self,
        tenant: Tenant,
        identity_id: &str,
        token: &str,
    ) -> StoreResult<Option<SessionRecord>> {
        Ok(self.db.get_identity(identity_id)?.and_then(|identity| {
            identity
                .sessions(tenant)
                .iter()
                .find(|s| s.token == token)
                .cloned()
        }))
    }

    /// Remove the session matching the exact token. Returns whether one was removed.
    pub fn remove_by_token(&self, tenant: Tenant, identity_id: &str, token: &str) -> StoreResult<bool> {
        Ok(self
            .db
            .update_identity(identity_id, |identity| {
                let sessions = identity.sessions_mut(tenant);
                let before = sessions.len();
                sessions.retain(|s| s.token != token);
                before != sessions.len()
            })?
            .unwrap_or(false))
    }

    /// Remove every session of the tenant. Returns the number removed.
    pub fn remove_all(&self, tenant: Tenant, identity_id: &str) -> StoreResult<usize> {
        Ok(self
            .db
            .update_identity(identity_id, |identity| {
                let sessions = identity.sessions_mut(tenant);
                let removed = sessions.len();
                sessions.clear();
                removed
            })?
            .unwrap_or(0))
    }

    /// Keep only the session matching `token`, dropping all others.
    ///
    /// Returns the number removed, or `None` if `token` is not a live
    /// session (nothing is removed in that case).
    pub fn retain_only(&self, tenant: Tenant, identity_id: &str, token: &str) -> StoreResult<Option<usize>> {
        Ok(self
            .db
            .update_identity(identity_id, |identity| {
                let sessions = identity.sessions_mut(tenant);
                if !sessions.iter().any(|s| s.token == token) {
                    return None;
                }
                let before = sessions.len();
                sessions.retain(|s| s.token == token);
                Some(before - sessions.len())
            })?
            .flatten())
    }

    /// Atomically replace `old_token` with `new_record`.
    ///
    /// If `old_token` is not live, the whole tenant partition of the identity
    /// is cleared instead and `ReuseDetected` is returned.
    pub fn rotate(
        &self,
        tenant: Tenant,
        identity_id: &str,
        old_token: &str,
        new_record: SessionRecord,
    ) -> StoreResult<RotateOutcome> {
        let cap = self.max_sessions;
        let outcome = self.db.update_identity(identity_id, |identity| {
            let sessions = identity.sessions_mut(tenant);
            match sessions.iter().position(|s| s.token == old_token) {
                Some(index) => {
                    sessions.remove(index);
                    push_capped(identity, tenant, new_record, cap);
                    RotateOutcome::Rotated
                }
                None => {
                    let revoked = sessions.len();
                    sessions.clear();
                    RotateOutcome::ReuseDetected { revoked }
                }
            }
        })?;
        Ok(outcome.unwrap_or(RotateOutcome::IdentityMissing))
    }

    /// List the live sessions of the tenant, oldest first.
    pub fn list(&self, tenant: Tenant, identity_id: &str) -> StoreResult<Vec<SessionRecord>> {
        Ok(self
            .db
            .get_identity(identity_id)?
            .map(|identity| identity.sessions(tenant).clone())
            .unwrap_or_default())
    }

    /// Drop sessions created before `cutoff` across all identities and tenants.
    ///
    /// Returns the number of identities touched.
    pub fn prune_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        self.db.update_all_identities(|identity| {
            let before = identity.user_sessions.len() + identity.admin_sessions.len();
            identity.user_sessions.retain(|s| s.created_at >= cutoff);
            identity.admin_sessions.retain(|s| s.created_at >= cutoff);
            before != identity.user_sessions.len() + identity.admin_sessions.len()
        })
    }
}

fn push_capped(identity: &mut Identity, tenant: Tenant, record: SessionRecord, cap: usize) {
    let sessions = identity.sessions_mut(tenant);
    sessions.push(record);
    sessions.sort_by_key(|s| s.created_at);
    if sessions.len() > cap {
        let excess = sessions.len() - cap;
        sessions.drain(..excess);
    }
}
