// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `Set-Cookie` construction for session and CSRF cookies.
//!
//! Console cookies are scoped to the admin path so a browser never sends
//! them to storefront routes.

use axum::http::{
    header::{InvalidHeaderValue, SET_COOKIE},
    HeaderName, HeaderValue,
};

use super::csrf::CSRF_COOKIE;
use super::roles::Tenant;
use crate::config::ServiceConfig;

/// Headers to append to a response.
pub type CookieHeaders = Vec<(HeaderName, HeaderValue)>;

struct CookieSpec<'a> {
    name: &'a str,
    value: &'a str,
    path: &'a str,
    http_only: bool,
    max_age: u64,
    secure: bool,
}

impl CookieSpec<'_> {
    fn render(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{}={}; Path={}; SameSite=Lax; Max-Age={}",
            self.name, self.value, self.path, self.max_age
        );
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

/// Path the tenant's session cookies are scoped to.
pub fn cookie_path(tenant: Tenant, config: &ServiceConfig) -> &str {
    match tenant {
        Tenant::User => "/",
        Tenant::Admin => &config.admin_cookie_path,
    }
}

/// Cookies set after a successful login or refresh.
pub fn session_cookies(
    tenant: Tenant,
    access_token: &str,
    refresh_token: &str,
    csrf_token: &str,
    config: &ServiceConfig,
) -> Result<CookieHeaders, InvalidHeaderValue> {
    let path = cookie_path(tenant, config);
    let cookies = [
        CookieSpec {
            name: tenant.access_cookie(),
            value: access_token,
            path,
            http_only: true,
            max_age: config.access_token_ttl.as_secs(),
            secure: config.cookie_secure,
        },
        CookieSpec {
            name: tenant.refresh_cookie(),
            value: refresh_token,
            path,
            http_only: true,
            max_age: config.refresh_token_ttl.as_secs(),
            secure: config.cookie_secure,
        },
        CookieSpec {
            name: CSRF_COOKIE,
            value: csrf_token,
            path: "/",
            http_only: false,
            max_age: config.refresh_token_ttl.as_secs(),
            secure: config.cookie_secure,
        },
    ];
    cookies
        .iter()
        .map(|c| c.render().map(|v| (SET_COOKIE, v)))
        .collect()
}

/// Cookies that expire the tenant's session cookies.
///
/// The CSRF cookie is only cleared for the storefront; the console shares it.
pub fn clear_session_cookies(
    tenant: Tenant,
    config: &ServiceConfig,
) -> Result<CookieHeaders, InvalidHeaderValue> {
    let path = cookie_path(tenant, config);
    let mut cookies = vec![
        CookieSpec {
            name: tenant.access_cookie(),
            value: "",
            path,
            http_only: true,
            max_age: 0,
            secure: config.cookie_secure,
        },
        CookieSpec {
            name: tenant.refresh_cookie(),
            value: "",
            path,
            http_only: true,
            max_age: 0,
            secure: config.cookie_secure,
        },
    ];
    if tenant == Tenant::User {
        cookies.push(CookieSpec {
            name: CSRF_COOKIE,
            value: "",
            path: "/",
            http_only: false,
            max_age: 0,
            secure: config.cookie_secure,
        });
    }
    cookies
        .iter()
        .map(|c| c.render().map(|v| (SET_COOKIE, v)))
        .collect()
}
