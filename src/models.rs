// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! This module defines the request and response data structures used by
//! the REST API. All types derive `Serialize`, `Deserialize`, and `ToSchema`
//! for automatic JSON handling and OpenAPI documentation.
//!
//! Tokens never appear in response bodies. They travel in cookies only, and
//! session listings expose device metadata without the stored token.
//!
//! ## Model Categories
//!
//! - **Credentials**: registration, login, password change and reset
//! - **Sessions**: live device listing and revocation results
//! - **Profiles**: the caller as seen by either tenant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{AuthenticatedUser, Role, Tenant};
use crate::storage::repository::{Identity, SessionRecord};

// =============================================================================
// Credential Models
// =============================================================================

/// Request to create a storefront account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Email address (unique, case-insensitive).
    pub email: String,
    /// Display name.
    pub name: String,
    /// Password, 8 to 128 characters.
    pub password: String,
}

/// Login request for either tenant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// New password submitted with a reset link.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub password: String,
}

// =============================================================================
// Profile Models
// =============================================================================

/// Public view of an identity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Whether the email address has been confirmed.
    pub verified: bool,
}

impl From<&AuthenticatedUser> for UserProfile {
    fn from(user: &AuthenticatedUser) -> Self {
        Self {
            id: user.user_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            verified: user.verified,
        }
    }
}

impl From<&Identity> for UserProfile {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role,
            verified: identity.verified,
        }
    }
}

/// Returned by login and refresh; the credentials themselves are in cookies.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user: UserProfile,
    /// Tenant the session belongs to.
    pub tenant: Tenant,
    /// When the access token expires and the client should refresh.
    pub access_expires_at: DateTime<Utc>,
}

// =============================================================================
// Session Models
// =============================================================================

/// One live session (device) of the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SessionView {
    pub issued_from_ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    /// True for the session whose refresh cookie came with this request.
    pub current: bool,
}

impl SessionView {
    pub fn new(record: &SessionRecord, current_token: Option<&str>) -> Self {
        Self {
            issued_from_ip: record.issued_from_ip.clone(),
            user_agent: record.user_agent.clone(),
            created_at: record.created_at,
            current: current_token.is_some_and(|t| t == record.token),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionView>,
}

/// Result of ending sessions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RevokedSessionsResponse {
    /// Number of session records removed.
    pub revoked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForceLogoutResponse {
    pub user_id: String,
    pub revoked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
