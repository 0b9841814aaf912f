// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info_span, Span};
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{csrf::CSRF_HEADER, middleware::csrf_guard, AuthenticatedUser, Role, Tenant},
    models::{
        ChangePasswordRequest, ForceLogoutResponse, ForgotPasswordRequest, LoginRequest,
        LoginResponse, MessageResponse, RegisterRequest, ResetPasswordRequest,
        RevokedSessionsResponse, SessionView, SessionsResponse, UserProfile,
    },
    state::AppState,
    storage::AuditEvent,
};

pub mod admin;
pub mod auth;
pub mod health;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    // Routes that run before the client holds a CSRF cookie, plus logout,
    // which must always succeed.
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password/{token}", post(auth::reset_password))
        .route("/verify-email/{token}", get(auth::verify_email))
        .route("/admin/login", post(admin::login))
        .route("/admin/refresh", post(admin::refresh))
        .route("/admin/logout", post(admin::logout));

    let guarded_routes = Router::new()
        .route("/me", get(users::me))
        .route("/sessions", get(users::list_sessions))
        .route("/logout-others", post(auth::logout_others))
        .route("/change-password", post(auth::change_password))
        .route("/admin/me", get(admin::me))
        .route("/admin/sessions", get(admin::list_sessions))
        .route("/admin/logout-others", post(admin::logout_others))
        .route("/admin/users/{user_id}/force-logout", post(admin::force_logout))
        .route("/admin/events", get(admin::events))
        .layer(axum::middleware::from_fn(csrf_guard));

    let cors = cors_layer(&state.config.public_base_url);

    Router::new()
        .nest("/auth", public_routes.merge(guarded_routes))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    MakeRequestUuid,
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
}

/// Credentialed CORS for the storefront origin only.
fn cors_layer(public_base_url: &Url) -> CorsLayer {
    let origin = public_base_url.origin().ascii_serialization();
    let allow_origin = match HeaderValue::from_str(&origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!(%origin, "Public base URL is not a valid origin, CORS disabled");
            AllowOrigin::list(std::iter::empty::<HeaderValue>())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(CSRF_HEADER)])
        .allow_credentials(true)
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::logout_others,
        auth::change_password,
        auth::forgot_password,
        auth::reset_password,
        auth::verify_email,
        users::me,
        users::list_sessions,
        admin::login,
        admin::refresh,
        admin::logout,
        admin::me,
        admin::list_sessions,
        admin::logout_others,
        admin::force_logout,
        admin::events,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            ChangePasswordRequest,
            ForgotPasswordRequest,
            ResetPasswordRequest,
            LoginResponse,
            UserProfile,
            SessionView,
            SessionsResponse,
            RevokedSessionsResponse,
            ForceLogoutResponse,
            MessageResponse,
            AuthenticatedUser,
            AuditEvent,
            Role,
            Tenant,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Storefront sessions and credentials"),
        (name = "Admin", description = "Console sessions and administrative actions"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use axum::{
        body::{to_bytes, Body},
        http::{header::COOKIE, header::SET_COOKIE, Method, Request, Response},
        Router,
    };
    use tower::ServiceExt;

    use crate::auth::csrf::CSRF_HEADER;

    /// Cookies set by a response, by name. Cleared cookies map to "".
    pub(crate) fn set_cookies(response: &Response<Body>) -> HashMap<String, String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    /// Build a request carrying `cookies`, an optional CSRF header and an
    /// optional JSON body.
    pub(crate) fn request(
        method: Method,
        uri: &str,
        cookies: &[(&str, &str)],
        csrf: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if !cookies.is_empty() {
            let header = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, header);
        }
        if let Some(csrf) = csrf {
            builder = builder.header(CSRF_HEADER, csrf);
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub(crate) async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.unwrap()
    }

    pub(crate) async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
