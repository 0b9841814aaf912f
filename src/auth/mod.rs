// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session and credential lifecycle for the storefront (`user` tenant) and
//! the administrative console (`admin` tenant).
//!
//! ## Auth Flow
//!
//! 1. Login verifies the password and mints an access/refresh pair
//! 2. The refresh token is stored as a session record on the identity
//! 3. Every request presents the access token cookie; the gate verifies it
//!    and rejects tokens issued before the last password change
//! 4. Refresh consumes the stored token and stores its successor in one
//!    transaction; an unknown but well-signed token revokes every session
//!    of that tenant
//!
//! ## Security
//!
//! - Access and refresh tokens are signed with distinct secrets
//! - Console cookies are path-scoped to the admin namespace
//! - State-changing requests need a double-submit CSRF token
//! - Clock skew tolerance is 60 seconds

pub mod account;
pub mod claims;
pub mod cookies;
pub mod csrf;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod roles;
pub mod rotation;
pub mod token;

pub use account::AccountService;
pub use claims::{AuthenticatedUser, TokenClaims, TokenClass};
pub use error::AuthError;
pub use extractor::{AdminAuth, AdminOnly, Auth};
pub use roles::{Role, Tenant};
pub use rotation::{ClientMeta, IssuedSession, SessionService};
pub use token::{IssuedToken, TokenCodec};
