// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// Every failure of the session core resolves to one of these variants.
/// None of them surface as a generic 500 except `Internal`, which the
/// refresh endpoint collapses into `Forbidden` anyway.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    /// No credential presented
    NoToken,
    /// Signature mismatch, malformed token or wrong token class
    InvalidToken,
    /// Token has expired
    TokenExpired,
    /// Token subject no longer exists
    UserNotFound,
    /// Token was issued before the last password change
    TokenRevoked,
    /// Refresh token signature was valid but it is not in the session store
    ReuseDetected,
    /// CSRF cookie and header missing or different
    CsrfMismatch,
    /// Generic refusal (tenant mismatch, unknown session, ...)
    Forbidden,
    /// Route requires an administrator
    AdminRequired,
    /// Email or password is wrong
    InvalidCredentials,
    /// Identity has not confirmed its email
    Unverified,
    /// Another identity already uses this email
    EmailTaken,
    /// Request payload rejected
    InvalidInput(String),
    /// Internal error
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    ///
    /// Reuse detection deliberately shares the `forbidden` code.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::NoToken => "no_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::UserNotFound => "user_not_found",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::ReuseDetected | AuthError::Forbidden => "forbidden",
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::AdminRequired => "admin_required",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Unverified => "unverified",
            AuthError::EmailTaken => "email_taken",
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoToken
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::UserNotFound
            | AuthError::TokenRevoked
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::ReuseDetected
            | AuthError::Forbidden
            | AuthError::CsrfMismatch
            | AuthError::AdminRequired
            | AuthError::Unverified => StatusCode::FORBIDDEN,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Collapse everything but a missing credential into `Forbidden`.
    ///
    /// Used by the refresh endpoints: the client only needs to know whether
    /// to show the login screen or to silently clear its state.
    pub fn into_refresh_failure(self) -> AuthError {
        match self {
            AuthError::NoToken => AuthError::NoToken,
            _ => AuthError::Forbidden,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NoToken => write!(f, "Authentication required"),
            AuthError::InvalidToken => write!(f, "Token is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::UserNotFound => write!(f, "User no longer exists"),
            AuthError::TokenRevoked => write!(f, "Token has been revoked"),
            AuthError::ReuseDetected | AuthError::Forbidden => write!(f, "Forbidden"),
            AuthError::CsrfMismatch => write!(f, "CSRF token missing or invalid"),
            AuthError::AdminRequired => write!(f, "Administrator access required"),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::Unverified => write!(f, "Email address has not been verified"),
            AuthError::EmailTaken => write!(f, "An account with this email already exists"),
            AuthError::InvalidInput(msg) => write!(f, "{msg}"),
            AuthError::Internal(_) => write!(f, "Internal authentication error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<crate::storage::StoreError> for AuthError {
    fn from(e: crate::storage::StoreError) -> Self {
        match e {
            crate::storage::StoreError::AlreadyExists(_) => AuthError::EmailTaken,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(ref detail) = self {
            tracing::error!(error = %detail, "Authentication failed internally");
        }
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
