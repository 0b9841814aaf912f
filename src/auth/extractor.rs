// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the authorization gate.
//!
//! Use the `Auth` extractor in storefront handlers and `AdminAuth` /
//! `AdminOnly` in console handlers:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;

use super::claims::TokenClass;
use super::rotation::ClientMeta;
use super::{AuthError, AuthenticatedUser, Tenant};
use crate::state::AppState;
use crate::storage::IdentitySummary;

/// Resolve an access token presented to `tenant` into the caller.
///
/// Fails with `NoToken`, `TokenExpired`, `InvalidToken`, `UserNotFound` or
/// `TokenRevoked`. Role requirements are left to the caller.
pub fn authorize(
    state: &AppState,
    tenant: Tenant,
    token: Option<&str>,
) -> Result<AuthenticatedUser, AuthError> {
    let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::NoToken)?;
    let claims = state.tokens.verify(token, TokenClass::Access)?;
    claims.check_tenant(tenant)?;

    let summary = match state.identity_cache.get(&claims.sub) {
        Some(summary) => summary,
        None => {
            let generation = state.identity_cache.generation();
            let identity = state
                .db
                .get_identity(&claims.sub)?
                .ok_or(AuthError::UserNotFound)?;
            let summary = IdentitySummary::from(&identity);
            state.identity_cache.put(summary.clone(), generation);
            summary
        }
    };

    if summary.revokes_tokens_issued_at(claims.iat) {
        tracing::debug!(user_id = %summary.id, %tenant, "Access token predates password change");
        return Err(AuthError::TokenRevoked);
    }

    Ok(AuthenticatedUser {
        user_id: summary.id,
        email: summary.email,
        name: summary.name,
        role: summary.role,
        tenant,
        verified: summary.verified,
        issued_at: claims.iat,
        expires_at: claims.exp,
    })
}

/// Read the tenant's access cookie and run the gate, unless a previous
/// layer already resolved a caller for this tenant.
fn from_parts(parts: &Parts, state: &AppState, tenant: Tenant) -> Result<AuthenticatedUser, AuthError> {
    if let Some(user) = parts
        .extensions
        .get::<AuthenticatedUser>()
        .filter(|user| user.tenant == tenant)
    {
        return Ok(user.clone());
    }

    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar.get(tenant.access_cookie()).map(|c| c.value());
    authorize(state, tenant, token)
}

/// Storefront caller, authenticated by the `token` cookie.
///
/// # Example
///
/// ```rust,ignore
/// async fn list_sessions(
///     Auth(user): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<SessionsResponse>, AuthError> {
///     // user.user_id contains the caller's identity ID
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        from_parts(parts, state, Tenant::User).map(Auth)
    }
}

/// Console caller, authenticated by the `admin_token` cookie.
pub struct AdminAuth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        from_parts(parts, state, Tenant::Admin).map(AdminAuth)
    }
}

/// Console caller whose identity currently holds the admin role.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AdminAuth(user) = AdminAuth::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            return Err(AuthError::AdminRequired);
        }

        Ok(AdminOnly(user))
    }
}

fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(ClientMeta {
            ip: client_ip(&parts.headers, peer),
            user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{password::hash_password, Role};
    use crate::state::test_support::test_state;
    use crate::storage::repository::{Identity, IdentityRepository};
    use axum::http::{header::COOKIE, Request};
    use chrono::Utc;

    fn seed(state: &AppState, role: Role) -> Identity {
        let identity = Identity::new(
            "gate@example.com",
            "Gate",
            &hash_password("gate password").unwrap(),
            role,
        );
        IdentityRepository::new(&state.db).create(&identity).unwrap();
        identity
    }

    fn parts_with_cookie(cookie: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/auth/me");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_requires_cookie() {
        let (state, _dir, _) = test_state();
        let mut parts = parts_with_cookie(None);
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::NoToken)));
    }

    #[tokio::test]
    async fn auth_resolves_access_cookie() {
        let (state, _dir, _) = test_state();
        let identity = seed(&state, Role::User);
        let access = state.tokens.issue_access(&identity.id, Tenant::User).unwrap();

        let mut parts = parts_with_cookie(Some(format!("token={}", access.token)));
        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, identity.id);
        assert_eq!(user.tenant, Tenant::User);
        assert_eq!(user.email, "gate@example.com");
    }

    #[tokio::test]
    async fn auth_rejects_garbage_and_refresh_tokens() {
        let (state, _dir, _) = test_state();
        let identity = seed(&state, Role::User);

        assert_eq!(
            authorize(&state, Tenant::User, Some("not.a.jwt")).unwrap_err(),
            AuthError::InvalidToken
        );
        let refresh = state.tokens.issue_refresh(&identity.id, Tenant::User).unwrap();
        assert_eq!(
            authorize(&state, Tenant::User, Some(&refresh.token)).unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn expired_access_token_is_reported() {
        let (state, _dir, _) = test_state();
        let identity = seed(&state, Role::User);
        let stale = Utc::now().timestamp() - 3 * 3600;
        let access = state
            .tokens
            .issue_at(TokenClass::Access, &identity.id, Tenant::User, stale)
            .unwrap();
        assert_eq!(
            authorize(&state, Tenant::User, Some(&access.token)).unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn deleted_subject_is_not_found() {
        let (state, _dir, _) = test_state();
        let access = state.tokens.issue_access("no-such-id", Tenant::User).unwrap();
        assert_eq!(
            authorize(&state, Tenant::User, Some(&access.token)).unwrap_err(),
            AuthError::UserNotFound
        );
    }

    #[tokio::test]
    async fn password_change_revokes_older_access_tokens() {
        let (state, _dir, _) = test_state();
        let identity = seed(&state, Role::User);
        let five_minutes_ago = Utc::now().timestamp() - 300;
        let old = state
            .tokens
            .issue_at(TokenClass::Access, &identity.id, Tenant::User, five_minutes_ago)
            .unwrap();

        // Warm the cache, then change the password through the repository
        assert!(authorize(&state, Tenant::User, Some(&old.token)).is_ok());
        IdentityRepository::new(&state.db)
            .set_password(&identity.id, &hash_password("changed password").unwrap(), Utc::now())
            .unwrap();
        state.identity_cache.invalidate(&identity.id);

        assert_eq!(
            authorize(&state, Tenant::User, Some(&old.token)).unwrap_err(),
            AuthError::TokenRevoked
        );

        // A token minted after the change is accepted
        let fresh = state
            .tokens
            .issue_at(TokenClass::Access, &identity.id, Tenant::User, Utc::now().timestamp() + 1)
            .unwrap();
        assert!(authorize(&state, Tenant::User, Some(&fresh.token)).is_ok());
    }

    #[tokio::test]
    async fn summary_read_before_password_change_is_not_cached() {
        let (state, _dir, _) = test_state();
        let identity = seed(&state, Role::User);
        let old = state
            .tokens
            .issue_at(TokenClass::Access, &identity.id, Tenant::User, Utc::now().timestamp() - 300)
            .unwrap();

        // A gate lookup reads the identity, then a password change commits
        // before the lookup stores its summary.
        let generation = state.identity_cache.generation();
        let before = state.db.get_identity(&identity.id).unwrap().unwrap();
        IdentityRepository::new(&state.db)
            .set_password(&identity.id, &hash_password("changed password").unwrap(), Utc::now())
            .unwrap();
        state.identity_cache.invalidate(&identity.id);
        assert!(!state
            .identity_cache
            .put(IdentitySummary::from(&before), generation));

        assert_eq!(
            authorize(&state, Tenant::User, Some(&old.token)).unwrap_err(),
            AuthError::TokenRevoked
        );
    }

    #[tokio::test]
    async fn tenants_do_not_accept_each_others_tokens() {
        let (state, _dir, _) = test_state();
        let identity = seed(&state, Role::Admin);
        let user_token = state.tokens.issue_access(&identity.id, Tenant::User).unwrap();
        let admin_token = state.tokens.issue_access(&identity.id, Tenant::Admin).unwrap();

        assert_eq!(
            authorize(&state, Tenant::Admin, Some(&user_token.token)).unwrap_err(),
            AuthError::InvalidToken
        );
        assert_eq!(
            authorize(&state, Tenant::User, Some(&admin_token.token)).unwrap_err(),
            AuthError::InvalidToken
        );

        // An admin cookie under the storefront name is still an admin token
        let mut parts = parts_with_cookie(Some(format!("token={}", admin_token.token)));
        assert!(matches!(
            Auth::from_request_parts(&mut parts, &state).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn admin_only_rejects_demoted_identity() {
        let (state, _dir, _) = test_state();
        let identity = seed(&state, Role::Admin);
        let admin_token = state.tokens.issue_access(&identity.id, Tenant::Admin).unwrap();
        let cookie = format!("admin_token={}", admin_token.token);

        let mut parts = parts_with_cookie(Some(cookie.clone()));
        assert!(AdminOnly::from_request_parts(&mut parts, &state).await.is_ok());

        IdentityRepository::new(&state.db)
            .set_role(&identity.id, Role::User)
            .unwrap();
        state.identity_cache.invalidate(&identity.id);

        let mut parts = parts_with_cookie(Some(cookie));
        assert!(AdminAuth::from_request_parts(&mut parts, &state).await.is_ok());
        let mut parts = parts_with_cookie(Some(format!("admin_token={}", admin_token.token)));
        assert!(matches!(
            AdminOnly::from_request_parts(&mut parts, &state).await,
            Err(AuthError::AdminRequired)
        ));
    }

    #[tokio::test]
    async fn extensions_are_preferred_per_tenant() {
        let (state, _dir, _) = test_state();
        let mut parts = parts_with_cookie(None);
        parts.extensions.insert(AuthenticatedUser {
            user_id: "from-layer".to_string(),
            email: "layer@example.com".to_string(),
            name: "Layer".to_string(),
            role: Role::User,
            tenant: Tenant::User,
            verified: true,
            issued_at: 0,
            expires_at: 0,
        });

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, "from-layer");
        assert!(matches!(
            AdminAuth::from_request_parts(&mut parts, &state).await,
            Err(AuthError::NoToken)
        ));
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        assert_eq!(client_ip(&headers, None), "unknown");
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");

        headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.4");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }

    #[tokio::test]
    async fn client_meta_reads_user_agent() {
        let mut parts = Request::builder()
            .uri("/auth/login")
            .header(USER_AGENT, "test-agent/1.0")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let meta = ClientMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(meta.user_agent, "test-agent/1.0");
        assert_eq!(meta.ip, "unknown");
    }
}
