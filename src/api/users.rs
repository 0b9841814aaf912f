// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storefront identity endpoints.

use axum::{extract::State, Json};
use axum_extra::extract::CookieJar;

use crate::{
    api::auth::refresh_cookie,
    auth::{Auth, AuthenticatedUser},
    error::ApiError,
    models::{SessionView, SessionsResponse, UserProfile},
    state::AppState,
};

/// Live sessions of `user` in its tenant, marking the one presenting `jar`.
pub(super) fn sessions_of(
    state: &AppState,
    user: &AuthenticatedUser,
    jar: &CookieJar,
) -> Result<SessionsResponse, ApiError> {
    let current = refresh_cookie(jar, user.tenant);
    let sessions = state
        .sessions()
        .list(user)?
        .iter()
        .map(|record| SessionView::new(record, current.as_deref()))
        .collect();
    Ok(SessionsResponse { sessions })
}

/// Get the current authenticated user's information.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "User information", body = UserProfile),
        (status = 401, description = "Not authenticated, expired or revoked"),
    )
)]
pub async fn me(Auth(user): Auth) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

/// List the caller's live storefront sessions (one per device).
#[utoipa::path(
    get,
    path = "/auth/sessions",
    tag = "Auth",
    responses(
        (status = 200, description = "Live sessions", body = SessionsResponse),
        (status = 401, description = "Not authenticated"),
    )
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Auth(user): Auth,
    jar: CookieJar,
) -> Result<Json<SessionsResponse>, ApiError> {
    Ok(Json(sessions_of(&state, &user, &jar)?))
}
