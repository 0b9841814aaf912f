// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and authenticated user representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::{Role, Tenant};
use super::AuthError;

/// Class of a bearer token. Each class is signed with its own secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

/// Claims carried by both access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity ID
    pub sub: String,
    /// Present on console tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Token class, checked in addition to the per-class secret
    pub typ: TokenClass,
    /// Unique token ID; keeps two tokens minted in the same second distinct
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

impl TokenClaims {
    /// Sanity-check the role claim against the tenant the token was presented to.
    ///
    /// This is never the authority for tenant membership (the session store
    /// partition and the identity role are), it only rejects obviously
    /// misplaced tokens before any state is touched.
    pub fn check_tenant(&self, tenant: Tenant) -> Result<(), AuthError> {
        if self.role == tenant.role_claim() {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Authenticated identity resolved by the authorization gate.
///
/// This is the primary type handlers receive to represent the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Identity ID
    pub user_id: String,
    /// Email address
    pub email: String,
    /// Display name
    pub name: String,
    /// Role stored on the identity
    pub role: Role,
    /// Tenant whose cookie authenticated this request
    pub tenant: Tenant,
    /// Whether the email address is confirmed
    pub verified: bool,
    /// Access token issued-at (Unix seconds)
    #[serde(skip)]
    pub issued_at: i64,
    /// Access token expiration (Unix seconds)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Check if this user is an admin.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Access token expiration as a timestamp.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }
}
