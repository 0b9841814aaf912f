// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Double-submit-cookie CSRF tokens.
//!
//! The token is an opaque random value that is not tied to any identity or
//! session. A request is accepted when the `csrfToken` cookie and the
//! `x-csrf-token` header are both present and equal. A fresh value is
//! issued on every login and refresh.

use axum::http::{HeaderMap, Method};
use axum_extra::extract::CookieJar;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;

use super::AuthError;

/// Cookie carrying the CSRF token (readable by client script).
pub const CSRF_COOKIE: &str = "csrfToken";

/// Header the client echoes the token in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Random bytes per token.
const CSRF_TOKEN_BYTES: usize = 32;

/// Generate a new random CSRF token.
pub fn generate_token() -> String {
    random_token(CSRF_TOKEN_BYTES)
}

/// Generate `len` random bytes encoded as URL-safe base64 without padding.
pub(crate) fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Methods that never change state and therefore skip the check.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Compare the CSRF cookie with the CSRF header.
pub fn verify(jar: &CookieJar, headers: &HeaderMap) -> Result<(), AuthError> {
    let cookie = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::CsrfMismatch)?;
    let header = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::CsrfMismatch)?;

    ring::constant_time::verify_slices_are_equal(cookie.as_bytes(), header.as_bytes())
        .map_err(|_| AuthError::CsrfMismatch)
}
