// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storefront credential endpoints.
//!
//! Session credentials travel only in cookies: `token` and `refreshToken`
//! (HttpOnly, app-wide) and `csrfToken` (script-readable). Response bodies
//! never contain a token.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;

use crate::{
    auth::{
        cookies::{clear_session_cookies, session_cookies, CookieHeaders},
        Auth, AuthError, ClientMeta, IssuedSession, Tenant,
    },
    error::ApiError,
    models::{
        ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse,
        MessageResponse, RegisterRequest, ResetPasswordRequest, RevokedSessionsResponse,
        UserProfile,
    },
    state::AppState,
};

// ============================================================================
// Shared helpers (also used by the console endpoints)
// ============================================================================

/// Value of the tenant's refresh cookie, if any.
pub(super) fn refresh_cookie(jar: &CookieJar, tenant: Tenant) -> Option<String> {
    jar.get(tenant.refresh_cookie())
        .map(|c| c.value().to_string())
}

pub(super) fn clearing_cookies(state: &AppState, tenant: Tenant) -> Result<CookieHeaders, ApiError> {
    clear_session_cookies(tenant, &state.config).map_err(ApiError::internal)
}

/// 200 with the new session's cookies and the caller's profile.
pub(super) fn session_response(
    state: &AppState,
    tenant: Tenant,
    session: IssuedSession,
) -> Result<Response, ApiError> {
    let headers = session_cookies(
        tenant,
        &session.access.token,
        &session.refresh.token,
        &session.csrf_token,
        &state.config,
    )
    .map_err(ApiError::internal)?;
    let access_expires_at = session
        .user
        .expires_at_utc()
        .ok_or_else(|| ApiError::internal("access token expiry out of range"))?;

    let body = LoginResponse {
        user: UserProfile::from(&session.user),
        tenant,
        access_expires_at,
    };
    Ok((AppendHeaders(headers), Json(body)).into_response())
}

/// Refresh for either tenant.
///
/// A missing cookie stays `NoToken` (401); every other failure becomes a
/// bare 403 and clears the tenant's cookies so the client falls back to the
/// login screen. This endpoint never answers 5xx.
pub(super) fn refresh_tenant(
    state: &AppState,
    tenant: Tenant,
    jar: &CookieJar,
    client: &ClientMeta,
) -> Response {
    let presented = refresh_cookie(jar, tenant);
    let result = state
        .sessions()
        .refresh(tenant, presented.as_deref(), client)
        .map_err(AuthError::into_refresh_failure)
        .map_err(ApiError::from)
        .and_then(|session| {
            session_response(state, tenant, session).map_err(|e| {
                tracing::warn!(%tenant, error = %e.message, "Rotated session could not be returned");
                ApiError::from(AuthError::Forbidden)
            })
        });

    match result {
        Ok(response) => response,
        Err(e) if e.status == StatusCode::FORBIDDEN => match clear_session_cookies(tenant, &state.config) {
            Ok(headers) => (AppendHeaders(headers), e).into_response(),
            Err(_) => e.into_response(),
        },
        Err(e) => e.into_response(),
    }
}

/// Logout for either tenant. Always 200.
pub(super) fn logout_tenant(
    state: &AppState,
    tenant: Tenant,
    jar: &CookieJar,
    client: &ClientMeta,
) -> Result<Response, ApiError> {
    let presented = refresh_cookie(jar, tenant);
    state.sessions().logout(tenant, presented.as_deref(), client);
    let headers = clearing_cookies(state, tenant)?;
    Ok((AppendHeaders(headers), Json(MessageResponse::new("Logged out"))).into_response())
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a storefront account.
///
/// A verification link is mailed to the address. Login is refused until it
/// has been opened (unless the server runs in development mode).
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserProfile),
        (status = 400, description = "Invalid email, name or password"),
        (status = 409, description = "Email already registered"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let identity =
        state
            .accounts()
            .register(&request.email, &request.name, &request.password, &client)?;
    Ok((StatusCode::CREATED, Json(UserProfile::from(&identity))))
}

/// Storefront login. Sets `token`, `refreshToken` and `csrfToken`.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, cookies set", body = LoginResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Email not verified"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let session = state
        .sessions()
        .login(Tenant::User, &request.email, &request.password, &client)?;
    session_response(&state, Tenant::User, session)
}

/// Rotate the storefront session.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "Session rotated, cookies replaced", body = LoginResponse),
        (status = 401, description = "No refresh cookie"),
        (status = 403, description = "Refresh token invalid, expired or already used"),
    )
)]
pub async fn refresh(State(state): State<AppState>, client: ClientMeta, jar: CookieJar) -> Response {
    refresh_tenant(&state, Tenant::User, &jar, &client)
}

/// End the current storefront session and clear its cookies.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    client: ClientMeta,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    logout_tenant(&state, Tenant::User, &jar, &client)
}

/// End every other storefront session of the caller.
#[utoipa::path(
    post,
    path = "/auth/logout-others",
    tag = "Auth",
    params(("x-csrf-token" = String, Header, description = "Must equal the csrfToken cookie")),
    responses(
        (status = 200, description = "Other sessions ended", body = RevokedSessionsResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "CSRF mismatch or current session unknown"),
    )
)]
pub async fn logout_others(
    State(state): State<AppState>,
    Auth(user): Auth,
    client: ClientMeta,
    jar: CookieJar,
) -> Result<Json<RevokedSessionsResponse>, ApiError> {
    let presented = refresh_cookie(&jar, Tenant::User);
    let revoked = state
        .sessions()
        .logout_others(&user, presented.as_deref(), &client)?;
    Ok(Json(RevokedSessionsResponse { revoked }))
}

/// Change the caller's password.
///
/// Every storefront session is revoked, including the current one, and
/// access tokens issued before the change stop working.
#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    params(("x-csrf-token" = String, Header, description = "Must equal the csrfToken cookie")),
    responses(
        (status = 200, description = "Password changed, sessions revoked", body = RevokedSessionsResponse),
        (status = 400, description = "New password rejected"),
        (status = 401, description = "Not authenticated or wrong current password"),
        (status = 403, description = "CSRF mismatch"),
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    Auth(user): Auth,
    client: ClientMeta,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    let revoked = state.accounts().change_password(
        &user,
        &request.current_password,
        &request.new_password,
        &client,
    )?;
    let headers = clearing_cookies(&state, Tenant::User)?;
    Ok((AppendHeaders(headers), Json(RevokedSessionsResponse { revoked })).into_response())
}

/// Request a password reset link.
///
/// Answers 200 whether or not the address is registered.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "Auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = MessageResponse),
        (status = 400, description = "Malformed email"),
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .accounts()
        .request_password_reset(&request.email, &client)?;
    Ok(Json(MessageResponse::new(
        "If an account exists for this address, a reset link has been sent",
    )))
}

/// Set a new password with a reset link.
#[utoipa::path(
    post,
    path = "/auth/reset-password/{token}",
    tag = "Auth",
    params(("token" = String, Path, description = "Token from the reset link")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset, sessions revoked", body = RevokedSessionsResponse),
        (status = 400, description = "Link invalid or expired, or password rejected"),
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    client: ClientMeta,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    let revoked = state
        .accounts()
        .reset_password(&token, &request.password, &client)?;
    let headers = clearing_cookies(&state, Tenant::User)?;
    Ok((AppendHeaders(headers), Json(RevokedSessionsResponse { revoked })).into_response())
}

/// Confirm an email address.
#[utoipa::path(
    get,
    path = "/auth/verify-email/{token}",
    tag = "Auth",
    params(("token" = String, Path, description = "Token from the verification link")),
    responses(
        (status = 200, description = "Email confirmed", body = MessageResponse),
        (status = 400, description = "Link invalid or expired"),
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
    client: ClientMeta,
) -> Result<Json<MessageResponse>, ApiError> {
    state.accounts().verify_email(&token, &client)?;
    Ok(Json(MessageResponse::new("Email address confirmed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::api::test_support::{json_body, request, send, set_cookies};
    use crate::auth::TokenClass;
    use crate::state::test_support::test_state;
    use crate::storage::repository::SessionRepository;
    use axum::http::Method;
    use axum::Router;
    use axum_extra::extract::cookie::Cookie;
    use chrono::Utc;
    use serde_json::json;

    const PASSWORD: &str = "correct horse battery";

    /// Register through the API and open the verification link.
    async fn signup(app: &Router, mailer: &crate::mailer::CapturingMailer, email: &str) -> String {
        let response = send(
            app,
            request(
                Method::POST,
                "/auth/register",
                &[],
                None,
                Some(json!({ "email": email, "name": "Sam", "password": PASSWORD })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["id"].as_str().unwrap().to_string();

        let token = mailer.last_token_for(email).unwrap();
        let response = send(
            app,
            request(Method::GET, &format!("/auth/verify-email/{token}"), &[], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        id
    }

    async fn login_cookies(app: &Router, email: &str, password: &str) -> std::collections::HashMap<String, String> {
        let response = send(
            app,
            request(
                Method::POST,
                "/auth/login",
                &[],
                None,
                Some(json!({ "email": email, "password": password })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        set_cookies(&response)
    }

    fn stored_tokens(state: &AppState, id: &str) -> Vec<String> {
        SessionRepository::new(&state.db, 10)
            .list(Tenant::User, id)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[tokio::test]
    async fn register_rejects_duplicates_with_conflict() {
        let (state, _dir, mailer) = test_state();
        let app = router(state);
        signup(&app, &mailer, "dup@example.com").await;

        let response = send(
            &app,
            request(
                Method::POST,
                "/auth/register",
                &[],
                None,
                Some(json!({ "email": "DUP@example.com", "name": "Sam", "password": PASSWORD })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error_code"], "email_taken");
    }

    #[tokio::test]
    async fn unverified_login_is_forbidden() {
        let (state, _dir, _) = test_state();
        let app = router(state);
        send(
            &app,
            request(
                Method::POST,
                "/auth/register",
                &[],
                None,
                Some(json!({ "email": "new@example.com", "name": "New", "password": PASSWORD })),
            ),
        )
        .await;

        let response = send(
            &app,
            request(
                Method::POST,
                "/auth/login",
                &[],
                None,
                Some(json!({ "email": "new@example.com", "password": PASSWORD })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error_code"], "unverified");
    }

    #[tokio::test]
    async fn login_sets_cookies_and_wrong_password_is_401() {
        let (state, _dir, mailer) = test_state();
        let app = router(state);
        signup(&app, &mailer, "ann@example.com").await;

        let cookies = login_cookies(&app, "ann@example.com", PASSWORD).await;
        assert!(!cookies["token"].is_empty());
        assert!(!cookies["refreshToken"].is_empty());
        assert!(!cookies["csrfToken"].is_empty());

        let response = send(
            &app,
            request(
                Method::POST,
                "/auth/login",
                &[],
                None,
                Some(json!({ "email": "ann@example.com", "password": "nope nope nope" })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_rotation_and_reuse_scenario() {
        let (state, _dir, mailer) = test_state();
        let app = router(state.clone());
        let id = signup(&app, &mailer, "rot@example.com").await;

        let cookies = login_cookies(&app, "rot@example.com", PASSWORD).await;
        let r0 = cookies["refreshToken"].clone();
        assert_eq!(stored_tokens(&state, &id), vec![r0.clone()]);

        let response = send(
            &app,
            request(Method::POST, "/auth/refresh", &[("refreshToken", r0.as_str())], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let rotated = set_cookies(&response);
        let r1 = rotated["refreshToken"].clone();
        assert_ne!(r1, r0);
        assert_ne!(rotated["csrfToken"], cookies["csrfToken"]);
        assert_eq!(stored_tokens(&state, &id), vec![r1.clone()]);

        let response = send(
            &app,
            request(Method::POST, "/auth/refresh", &[("refreshToken", r0.as_str())], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(set_cookies(&response)["refreshToken"], "");
        assert_eq!(json_body(response).await["error_code"], "forbidden");
        assert!(stored_tokens(&state, &id).is_empty());

        // The successor died with the rest of the lineage
        let response = send(
            &app,
            request(Method::POST, "/auth/refresh", &[("refreshToken", r1.as_str())], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn refresh_that_cannot_set_cookies_is_403() {
        let (state, _dir, _) = test_state();
        state
            .accounts()
            .ensure_admin("ops@example.com", PASSWORD)
            .unwrap();
        let r0 = state
            .sessions()
            .login(Tenant::Admin, "ops@example.com", PASSWORD, &ClientMeta::default())
            .unwrap()
            .refresh
            .token;

        // A cookie path that is not a valid header value
        let mut config = (*state.config).clone();
        config.admin_cookie_path = "/auth/admin\n".to_string();
        let mut broken = state.clone();
        broken.config = std::sync::Arc::new(config);

        let jar = CookieJar::new().add(Cookie::new(Tenant::Admin.refresh_cookie(), r0));
        let response = refresh_tenant(&broken, Tenant::Admin, &jar, &ClientMeta::default());
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error_code"], "forbidden");
    }

    #[tokio::test]
    async fn refresh_without_cookie_is_401_and_garbage_is_403() {
        let (state, _dir, _) = test_state();
        let app = router(state);

        let response = send(&app, request(Method::POST, "/auth/refresh", &[], None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "no_token");

        let response = send(
            &app,
            request(Method::POST, "/auth/refresh", &[("refreshToken", "garbage")], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn password_change_revokes_older_access_token_scenario() {
        let (state, _dir, mailer) = test_state();
        let app = router(state.clone());
        let id = signup(&app, &mailer, "pw@example.com").await;

        let five_minutes_ago = Utc::now().timestamp() - 300;
        let old_access = state
            .tokens
            .issue_at(TokenClass::Access, &id, Tenant::User, five_minutes_ago)
            .unwrap();
        let response = send(
            &app,
            request(Method::GET, "/auth/me", &[("token", old_access.token.as_str())], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = login_cookies(&app, "pw@example.com", PASSWORD).await;
        let csrf = cookies["csrfToken"].clone();
        let response = send(
            &app,
            request(
                Method::POST,
                "/auth/change-password",
                &[("token", cookies["token"].as_str()), ("csrfToken", csrf.as_str())],
                Some(csrf.as_str()),
                Some(json!({ "current_password": PASSWORD, "new_password": "a new strong password" })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(set_cookies(&response)["token"], "");
        assert_eq!(json_body(response).await["revoked"], 1);
        assert!(stored_tokens(&state, &id).is_empty());

        let response = send(
            &app,
            request(Method::GET, "/auth/me", &[("token", old_access.token.as_str())], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "token_revoked");

        let fresh = login_cookies(&app, "pw@example.com", "a new strong password").await;
        let response = send(
            &app,
            request(Method::GET, "/auth/me", &[("token", fresh["token"].as_str())], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["email"], "pw@example.com");
    }

    #[tokio::test]
    async fn csrf_is_required_even_with_valid_session() {
        let (state, _dir, mailer) = test_state();
        let app = router(state);
        signup(&app, &mailer, "csrf@example.com").await;
        let cookies = login_cookies(&app, "csrf@example.com", PASSWORD).await;
        let token = cookies["token"].clone();
        let refresh = cookies["refreshToken"].clone();
        let csrf = cookies["csrfToken"].clone();

        let attempts = [
            (None, None),
            (Some(csrf.as_str()), None),
            (Some(csrf.as_str()), Some("forged")),
        ];
        for (cookie_csrf, header_csrf) in attempts {
            let mut jar = vec![("token", token.as_str()), ("refreshToken", refresh.as_str())];
            if let Some(c) = cookie_csrf {
                jar.push(("csrfToken", c));
            }
            let response = send(
                &app,
                request(Method::POST, "/auth/logout-others", &jar, header_csrf, None),
            )
            .await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(json_body(response).await["error_code"], "csrf_mismatch");
        }

        // Without a session the CSRF check still runs first
        let response = send(
            &app,
            request(Method::POST, "/auth/logout-others", &[], None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn logout_others_and_logout_scoping() {
        let (state, _dir, mailer) = test_state();
        let app = router(state.clone());
        let id = signup(&app, &mailer, "multi@example.com").await;

        let mut devices = Vec::new();
        for _ in 0..4 {
            devices.push(login_cookies(&app, "multi@example.com", PASSWORD).await);
        }
        assert_eq!(stored_tokens(&state, &id).len(), 4);

        // Logging out one device removes exactly one record
        let response = send(
            &app,
            request(
                Method::POST,
                "/auth/logout",
                &[("refreshToken", devices[3]["refreshToken"].as_str())],
                None,
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stored_tokens(&state, &id).len(), 3);

        let current = &devices[0];
        let response = send(
            &app,
            request(
                Method::GET,
                "/auth/sessions",
                &[("token", current["token"].as_str()), ("refreshToken", current["refreshToken"].as_str())],
                None,
                None,
            ),
        )
        .await;
        let listing = json_body(response).await;
        let sessions = listing["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions.iter().filter(|s| s["current"] == true).count(), 1);

        let csrf = current["csrfToken"].clone();
        let response = send(
            &app,
            request(
                Method::POST,
                "/auth/logout-others",
                &[
                    ("token", current["token"].as_str()),
                    ("refreshToken", current["refreshToken"].as_str()),
                    ("csrfToken", csrf.as_str()),
                ],
                Some(csrf.as_str()),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["revoked"], 2);
        assert_eq!(
            stored_tokens(&state, &id),
            vec![current["refreshToken"].clone()]
        );
    }

    #[tokio::test]
    async fn logout_succeeds_without_or_with_garbled_cookie() {
        let (state, _dir, _) = test_state();
        let app = router(state);

        for cookies in [vec![], vec![("refreshToken", "garbled")]] {
            let response = send(&app, request(Method::POST, "/auth/logout", &cookies, None, None)).await;
            assert_eq!(response.status(), StatusCode::OK);
            let cleared = set_cookies(&response);
            assert_eq!(cleared["token"], "");
            assert_eq!(cleared["refreshToken"], "");
        }
    }

    #[tokio::test]
    async fn forgot_and_reset_password_flow() {
        let (state, _dir, mailer) = test_state();
        let app = router(state);
        signup(&app, &mailer, "reset@example.com").await;

        for email in ["reset@example.com", "nobody@example.com"] {
            let response = send(
                &app,
                request(
                    Method::POST,
                    "/auth/forgot-password",
                    &[],
                    None,
                    Some(json!({ "email": email })),
                ),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let token = mailer.last_token_for("reset@example.com").unwrap();
        let response = send(
            &app,
            request(
                Method::POST,
                &format!("/auth/reset-password/{token}"),
                &[],
                None,
                Some(json!({ "password": "after the reset" })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            request(
                Method::POST,
                &format!("/auth/reset-password/{token}"),
                &[],
                None,
                Some(json!({ "password": "second attempt!" })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        login_cookies(&app, "reset@example.com", "after the reset").await;
    }
}
