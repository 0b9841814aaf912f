// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Rotation Protocol
//!
//! Issuance, rotation and revocation of refresh sessions.
//!
//! ```text
//! login ──► ISSUED ──refresh──► SUPERSEDED (removed, replaced by a new ISSUED)
//!              │
//!              └──logout / logout-others / password change / reuse──► REVOKED
//! ```
//!
//! A refresh token is valid only while it is present in the session store
//! of the tenant that minted it. Presenting a signature-valid token that is
//! no longer stored is treated as replay of a stolen token: every session
//! of that identity in that tenant is revoked in the same transaction.

use std::sync::OnceLock;

use chrono::DateTime;

use super::claims::TokenClass;
use super::password::{hash_password, verify_password};
use super::token::IssuedToken;
use super::{csrf, AuthError, AuthenticatedUser, Role, Tenant};
use crate::state::AppState;
use crate::storage::audit::{kind, names};
use crate::storage::repository::{
    Identity, IdentityRepository, RotateOutcome, SessionRecord, SessionRepository,
};
use crate::storage::AuditEvent;

/// Request metadata recorded on sessions and audit events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

impl Default for ClientMeta {
    fn default() -> Self {
        Self {
            ip: "unknown".to_string(),
            user_agent: String::new(),
        }
    }
}

/// Credentials handed to the client after login or refresh.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: AuthenticatedUser,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
    pub csrf_token: String,
}

/// Hash compared against when the email is unknown, so both failure paths
/// cost one Argon2 verification.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("mealbox-dummy-password").unwrap_or_default())
}

/// Session lifecycle operations over the application state.
pub struct SessionService<'a> {
    state: &'a AppState,
}

impl<'a> SessionService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn identities(&self) -> IdentityRepository<'a> {
        IdentityRepository::new(&self.state.db)
    }

    fn store(&self) -> SessionRepository<'a> {
        SessionRepository::new(&self.state.db, self.state.config.max_sessions_per_tenant)
    }

    /// Mint an access/refresh pair and a fresh CSRF token.
    fn mint(&self, tenant: Tenant, identity: &Identity) -> Result<IssuedSession, AuthError> {
        let access = self.state.tokens.issue_access(&identity.id, tenant)?;
        let refresh = self.state.tokens.issue_refresh(&identity.id, tenant)?;
        Ok(IssuedSession {
            user: AuthenticatedUser {
                user_id: identity.id.clone(),
                email: identity.email.clone(),
                name: identity.name.clone(),
                role: identity.role,
                tenant,
                verified: identity.verified,
                issued_at: access.claims.iat,
                expires_at: access.claims.exp,
            },
            access,
            refresh,
            csrf_token: csrf::generate_token(),
        })
    }

    /// Tenant admission rules shared by login and refresh.
    fn admit(&self, tenant: Tenant, identity: &Identity) -> Result<(), AuthError> {
        if tenant == Tenant::Admin && identity.role != Role::Admin {
            return Err(AuthError::AdminRequired);
        }
        if !identity.verified && !self.state.config.dev_mode {
            return Err(AuthError::Unverified);
        }
        Ok(())
    }

    fn login_failed(&self, tenant: Tenant, user_id: Option<&str>, client: &ClientMeta, reason: &str) {
        let mut event = AuditEvent::for_tenant(tenant, kind::LOGIN_FAILED)
            .with_client(&client.ip, &client.user_agent)
            .with_details(serde_json::json!({ "reason": reason }))
            .failed();
        if let Some(id) = user_id {
            event = event.with_user(id);
        }
        self.state.audit.emit(event);
    }

    /// Verify credentials and open a new session in `tenant`.
    pub fn login(
        &self,
        tenant: Tenant,
        email: &str,
        password: &str,
        client: &ClientMeta,
    ) -> Result<IssuedSession, AuthError> {
        let Some(identity) = self.identities().get_by_email(email)? else {
            verify_password(password, dummy_hash());
            self.login_failed(tenant, None, client, "unknown_email");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &identity.password_hash) {
            self.login_failed(tenant, Some(&identity.id), client, "wrong_password");
            return Err(AuthError::InvalidCredentials);
        }
        if let Err(e) = self.admit(tenant, &identity) {
            self.login_failed(tenant, Some(&identity.id), client, e.error_code());
            return Err(e);
        }

        let session = self.mint(tenant, &identity)?;
        let record = SessionRecord::new(&session.refresh.token, &client.ip, &client.user_agent);
        if !self.store().append(tenant, &identity.id, record)? {
            return Err(AuthError::UserNotFound);
        }

        tracing::info!(user_id = %identity.id, tenant = %tenant, "Session opened");
        self.state.audit.emit(
            AuditEvent::for_tenant(tenant, kind::LOGIN)
                .with_user(&identity.id)
                .with_client(&client.ip, &client.user_agent),
        );
        Ok(session)
    }

    /// Exchange a live refresh token for a new pair.
    ///
    /// The stored token is replaced atomically. A token that verifies but is
    /// not stored revokes the whole tenant partition and fails with
    /// `ReuseDetected`.
    pub fn refresh(
        &self,
        tenant: Tenant,
        presented: Option<&str>,
        client: &ClientMeta,
    ) -> Result<IssuedSession, AuthError> {
        let presented = presented
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NoToken)?;
        let claims = self.state.tokens.verify(presented, TokenClass::Refresh)?;
        claims.check_tenant(tenant)?;

        let identity = self
            .identities()
            .get(&claims.sub)?
            .ok_or(AuthError::UserNotFound)?;
        self.admit(tenant, &identity)?;

        let session = self.mint(tenant, &identity)?;
        let record = SessionRecord::new(&session.refresh.token, &client.ip, &client.user_agent);

        match self.store().rotate(tenant, &identity.id, presented, record)? {
            RotateOutcome::Rotated => {
                tracing::debug!(user_id = %identity.id, tenant = %tenant, "Session rotated");
                self.state.audit.emit(
                    AuditEvent::for_tenant(tenant, kind::SESSION_ROTATED)
                        .with_user(&identity.id)
                        .with_client(&client.ip, &client.user_agent),
                );
                Ok(session)
            }
            RotateOutcome::ReuseDetected { revoked } => {
                tracing::warn!(
                    user_id = %identity.id,
                    tenant = %tenant,
                    revoked,
                    ip = %client.ip,
                    "Refresh token reuse detected, all sessions revoked"
                );
                self.state.audit.emit(
                    AuditEvent::for_tenant(tenant, kind::REUSE_DETECTED)
                        .with_user(&identity.id)
                        .with_client(&client.ip, &client.user_agent)
                        .with_details(serde_json::json!({
                            "revoked_sessions": revoked,
                            "token_issued_at": DateTime::from_timestamp(claims.iat, 0),
                        }))
                        .failed(),
                );
                Err(AuthError::ReuseDetected)
            }
            RotateOutcome::IdentityMissing => Err(AuthError::UserNotFound),
        }
    }

    /// End the session holding `presented`. Never fails.
    ///
    /// The token is decoded without an expiry check only to find its owner;
    /// a garbled or foreign token just yields an anonymous logout.
    pub fn logout(&self, tenant: Tenant, presented: Option<&str>, client: &ClientMeta) -> Option<String> {
        let token = presented.filter(|t| !t.is_empty());
        let owner = token
            .and_then(|t| self.state.tokens.decode_refresh_lenient(t))
            .filter(|claims| claims.check_tenant(tenant).is_ok())
            .map(|claims| claims.sub);

        let mut removed = false;
        if let (Some(token), Some(owner)) = (token, owner.as_deref()) {
            match self.store().remove_by_token(tenant, owner, token) {
                Ok(r) => removed = r,
                Err(e) => {
                    tracing::warn!(user_id = %owner, tenant = %tenant, error = %e, "Failed to remove session on logout")
                }
            }
        }

        let mut event = AuditEvent::for_tenant(tenant, kind::LOGOUT)
            .with_client(&client.ip, &client.user_agent)
            .with_details(serde_json::json!({ "session_removed": removed }));
        if let Some(owner) = &owner {
            event = event.with_user(owner);
        }
        self.state.audit.emit(event);
        owner
    }

    /// Keep only the caller's current session in `tenant`.
    ///
    /// Returns the number of sessions removed.
    pub fn logout_others(
        &self,
        user: &AuthenticatedUser,
        presented: Option<&str>,
        client: &ClientMeta,
    ) -> Result<usize, AuthError> {
        let tenant = user.tenant;
        let presented = presented
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NoToken)?;
        let claims = self.state.tokens.verify(presented, TokenClass::Refresh)?;
        claims.check_tenant(tenant)?;
        if claims.sub != user.user_id {
            return Err(AuthError::Forbidden);
        }

        let removed = self
            .store()
            .retain_only(tenant, &user.user_id, presented)?
            .ok_or(AuthError::Forbidden)?;

        tracing::info!(user_id = %user.user_id, tenant = %tenant, removed, "Other sessions ended");
        self.state.audit.emit(
            AuditEvent::for_tenant(tenant, kind::LOGOUT_OTHERS)
                .with_user(&user.user_id)
                .with_client(&client.ip, &client.user_agent)
                .with_details(serde_json::json!({ "removed_sessions": removed })),
        );
        Ok(removed)
    }

    /// Administrative revocation of every storefront session of `target_id`.
    ///
    /// Console sessions of the target are left alone. Returns `None` when
    /// the target does not exist.
    pub fn force_logout(
        &self,
        actor: &AuthenticatedUser,
        target_id: &str,
        client: &ClientMeta,
    ) -> Result<Option<usize>, AuthError> {
        if self.identities().get(target_id)?.is_none() {
            return Ok(None);
        }
        let removed = self.store().remove_all(Tenant::User, target_id)?;
        self.state.identity_cache.invalidate(target_id);

        tracing::info!(
            actor_id = %actor.user_id,
            user_id = %target_id,
            removed,
            "Forced logout"
        );
        self.state.audit.emit(
            AuditEvent::new(names::USER_FORCE_LOGOUT)
                .with_user(target_id)
                .with_actor(&actor.user_id)
                .with_client(&client.ip, &client.user_agent)
                .with_details(serde_json::json!({ "removed_sessions": removed })),
        );
        Ok(Some(removed))
    }

    /// Live sessions of the caller in its tenant.
    pub fn list(&self, user: &AuthenticatedUser) -> Result<Vec<SessionRecord>, AuthError> {
        Ok(self.store().list(user.tenant, &user.user_id)?)
    }
}
