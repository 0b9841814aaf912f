// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CSRF middleware for Axum.
//!
//! Applied to the protected route group with
//! `axum::middleware::from_fn(csrf_guard)`. It runs before any extractor, so
//! a mismatched request is rejected whether or not it carries a valid
//! session.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use super::csrf;

/// Reject state-changing requests whose CSRF cookie and header differ.
pub async fn csrf_guard(request: Request, next: Next) -> Response {
    if csrf::is_safe_method(request.method()) {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    if let Err(e) = csrf::verify(&jar, request.headers()) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "CSRF check failed"
        );
        return e.into_response();
    }

    next.run(request).await
}
