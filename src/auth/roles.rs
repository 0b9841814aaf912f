// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity roles and session tenants.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role stored on an identity.
///
/// ## Role Hierarchy
///
/// - `Admin` - Console operator; may also shop as a regular user
/// - `User` - Storefront customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrative console access
    Admin,
    /// Storefront customer
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
        }
    }
}

/// Isolation boundary between storefront sessions and console sessions.
///
/// Each tenant has its own cookies, its own session vector on the identity
/// document and its own audit event names. A credential minted for one
/// tenant is never accepted by the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tenant {
    User,
    Admin,
}

impl Tenant {
    /// Role claim embedded in tokens minted for this tenant.
    ///
    /// Only console tokens carry a role; storefront tokens leave it out.
    pub fn role_claim(&self) -> Option<Role> {
        match self {
            Tenant::User => None,
            Tenant::Admin => Some(Role::Admin),
        }
    }

    /// Cookie holding the access token.
    pub fn access_cookie(&self) -> &'static str {
        match self {
            Tenant::User => "token",
            Tenant::Admin => "admin_token",
        }
    }

    /// Cookie holding the refresh token.
    pub fn refresh_cookie(&self) -> &'static str {
        match self {
            Tenant::User => "refreshToken",
            Tenant::Admin => "admin_refreshToken",
        }
    }

    /// Prefix used for audit event names (`USER_*` / `ADMIN_*`).
    pub fn audit_prefix(&self) -> &'static str {
        match self {
            Tenant::User => "USER",
            Tenant::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tenant::User => write!(f, "user"),
            Tenant::Admin => write!(f, "admin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_use_disjoint_cookies() {
        assert_ne!(Tenant::User.access_cookie(), Tenant::Admin.access_cookie());
        assert_ne!(Tenant::User.refresh_cookie(), Tenant::Admin.refresh_cookie());
        assert_eq!(Tenant::User.role_claim(), None);
        assert_eq!(Tenant::Admin.role_claim(), Some(Role::Admin));
    }
}
