// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin console endpoints.
//!
//! Console sessions live in their own tenant: `admin_token` and
//! `admin_refreshToken` cookies scoped to the admin path, a separate
//! session vector on the identity and `ADMIN_*` audit events. These
//! endpoints provide:
//! - Console login, refresh and logout
//! - Forced logout of a storefront user
//! - A live audit event stream

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    Json,
};
use axum_extra::extract::CookieJar;
use futures::{Stream, StreamExt};

use crate::{
    api::auth::{logout_tenant, refresh_cookie, refresh_tenant, session_response},
    api::users::sessions_of,
    auth::{AdminAuth, AdminOnly, ClientMeta, Tenant},
    error::ApiError,
    models::{
        ForceLogoutResponse, LoginRequest, LoginResponse, MessageResponse,
        RevokedSessionsResponse, SessionsResponse, UserProfile,
    },
    state::AppState,
};

/// Console login. Only verified identities with the admin role.
#[utoipa::path(
    post,
    path = "/auth/admin/login",
    tag = "Admin",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, console cookies set", body = LoginResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Not an administrator or not verified"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let session = state
        .sessions()
        .login(Tenant::Admin, &request.email, &request.password, &client)?;
    session_response(&state, Tenant::Admin, session)
}

/// Rotate the console session.
#[utoipa::path(
    post,
    path = "/auth/admin/refresh",
    tag = "Admin",
    responses(
        (status = 200, description = "Session rotated", body = LoginResponse),
        (status = 401, description = "No refresh cookie"),
        (status = 403, description = "Refresh token invalid, expired or already used"),
    )
)]
pub async fn refresh(State(state): State<AppState>, client: ClientMeta, jar: CookieJar) -> Response {
    refresh_tenant(&state, Tenant::Admin, &jar, &client)
}

/// End the current console session.
#[utoipa::path(
    post,
    path = "/auth/admin/logout",
    tag = "Admin",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    client: ClientMeta,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    logout_tenant(&state, Tenant::Admin, &jar, &client)
}

/// Current console operator.
#[utoipa::path(
    get,
    path = "/auth/admin/me",
    tag = "Admin",
    responses(
        (status = 200, description = "Administrator information", body = UserProfile),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator access required"),
    )
)]
pub async fn me(AdminOnly(user): AdminOnly) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

/// Live console sessions of the caller.
#[utoipa::path(
    get,
    path = "/auth/admin/sessions",
    tag = "Admin",
    responses(
        (status = 200, description = "Live console sessions", body = SessionsResponse),
        (status = 401, description = "Not authenticated"),
    )
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    AdminAuth(user): AdminAuth,
    jar: CookieJar,
) -> Result<Json<SessionsResponse>, ApiError> {
    Ok(Json(sessions_of(&state, &user, &jar)?))
}

/// End every other console session of the caller.
#[utoipa::path(
    post,
    path = "/auth/admin/logout-others",
    tag = "Admin",
    params(("x-csrf-token" = String, Header, description = "Must equal the csrfToken cookie")),
    responses(
        (status = 200, description = "Other console sessions ended", body = RevokedSessionsResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "CSRF mismatch or current session unknown"),
    )
)]
pub async fn logout_others(
    State(state): State<AppState>,
    AdminAuth(user): AdminAuth,
    client: ClientMeta,
    jar: CookieJar,
) -> Result<Json<RevokedSessionsResponse>, ApiError> {
    let presented = refresh_cookie(&jar, Tenant::Admin);
    let revoked = state
        .sessions()
        .logout_others(&user, presented.as_deref(), &client)?;
    Ok(Json(RevokedSessionsResponse { revoked }))
}

/// Revoke every storefront session of a user.
///
/// The target's console sessions, if any, are not touched.
#[utoipa::path(
    post,
    path = "/auth/admin/users/{user_id}/force-logout",
    tag = "Admin",
    params(
        ("user_id" = String, Path, description = "Target identity ID"),
        ("x-csrf-token" = String, Header, description = "Must equal the csrfToken cookie")
    ),
    responses(
        (status = 200, description = "Sessions revoked", body = ForceLogoutResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator access required or CSRF mismatch"),
        (status = 404, description = "User not found"),
    )
)]
pub async fn force_logout(
    State(state): State<AppState>,
    AdminOnly(actor): AdminOnly,
    Path(user_id): Path<String>,
    client: ClientMeta,
) -> Result<Json<ForceLogoutResponse>, ApiError> {
    let revoked = state
        .sessions()
        .force_logout(&actor, &user_id, &client)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ForceLogoutResponse { user_id, revoked }))
}

/// Live audit event stream (Server-Sent Events).
///
/// Each event's `event:` field is the audit event name and its data the
/// JSON-encoded event. The connection is deregistered when the client goes
/// away.
#[utoipa::path(
    get,
    path = "/auth/admin/events",
    tag = "Admin",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = crate::storage::AuditEvent),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator access required"),
    )
)]
pub async fn events(
    State(state): State<AppState>,
    AdminOnly(user): AdminOnly,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let subscription = state.events.register(&user)?;
    let stream = subscription
        .into_stream()
        .map(|event| Event::default().event(event.event.clone()).json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
