// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! typed `ServiceConfig` loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the database and audit logs | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `ACCESS_TOKEN_SECRET` | HS256 secret for access tokens (>= 32 bytes) | Required |
//! | `REFRESH_TOKEN_SECRET` | HS256 secret for refresh tokens (>= 32 bytes) | Required |
//! | `ONE_TIME_TOKEN_SECRET` | HMAC key for reset/verification token digests | Required |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `1800` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime (at most one year) | `1209600` |
//! | `COOKIE_SECURE` | Mark cookies `Secure` | `true` |
//! | `ADMIN_COOKIE_PATH` | Path console cookies are scoped to | `/auth/admin` |
//! | `DEV_MODE` | Allow unverified identities to log in | `false` |
//! | `MAX_SESSIONS_PER_TENANT` | Live sessions kept per identity and tenant | `10` |
//! | `PUBLIC_BASE_URL` | Base URL used in emailed links | `http://localhost:3000` |
//! | `SEED_ADMIN_EMAIL` / `SEED_ADMIN_PASSWORD` | Bootstrap admin identity | Optional |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; enables HTTPS | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Default access token lifetime (30 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Default refresh token lifetime (14 days).
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(14 * 24 * 3600);

/// Upper bound for either token lifetime (one year).
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 3600;

/// Default cap on live sessions per identity per tenant.
pub const DEFAULT_MAX_SESSIONS_PER_TENANT: usize = 10;

/// Default path for console cookies.
pub const DEFAULT_ADMIN_COOKIE_PATH: &str = "/auth/admin";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Certificate and key used when TLS is enabled.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Bootstrap administrator created at startup when absent.
#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

/// Typed service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub one_time_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub cookie_secure: bool,
    pub admin_cookie_path: String,
    pub dev_mode: bool,
    pub max_sessions_per_tenant: usize,
    pub public_base_url: Url,
    pub seed_admin: Option<SeedAdmin>,
    pub tls: Option<TlsPaths>,
    pub json_logs: bool,
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let port = parse_or(&var, "PORT", 8080u16)?;
        let access_ttl = parse_or(&var, "ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TOKEN_TTL.as_secs())?;
        let refresh_ttl =
            parse_or(&var, "REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TOKEN_TTL.as_secs())?;
        if refresh_ttl > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Invalid {
                name: "REFRESH_TOKEN_TTL_SECS",
                reason: format!("must not exceed {MAX_TOKEN_TTL_SECS} seconds"),
            });
        }
        if access_ttl == 0 || refresh_ttl <= access_ttl {
            return Err(ConfigError::Invalid {
                name: "REFRESH_TOKEN_TTL_SECS",
                reason: "refresh lifetime must exceed a non-zero access lifetime".to_string(),
            });
        }

        let max_sessions = parse_or(
            &var,
            "MAX_SESSIONS_PER_TENANT",
            DEFAULT_MAX_SESSIONS_PER_TENANT,
        )?;
        if max_sessions == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_SESSIONS_PER_TENANT",
                reason: "must be at least 1".to_string(),
            });
        }

        let base_url = var("PUBLIC_BASE_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        let mut public_base_url = Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            name: "PUBLIC_BASE_URL",
            reason: e.to_string(),
        })?;
        // Emailed links are joined onto this base; a path without a trailing
        // slash would lose its last segment.
        if !public_base_url.path().ends_with('/') {
            let path = format!("{}/", public_base_url.path());
            public_base_url.set_path(&path);
        }

        let admin_cookie_path =
            var("ADMIN_COOKIE_PATH").unwrap_or_else(|| DEFAULT_ADMIN_COOKIE_PATH.to_string());
        if !admin_cookie_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                name: "ADMIN_COOKIE_PATH",
                reason: "must start with '/'".to_string(),
            });
        }

        let seed_admin = match (var("SEED_ADMIN_EMAIL"), var("SEED_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SeedAdmin { email, password }),
            _ => None,
        };

        let tls = match (var("TLS_CERT_PATH"), var("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "TLS_CERT_PATH",
                    reason: "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
                })
            }
        };

        Ok(Self {
            data_dir: var(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            access_token_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_token_secret: required("REFRESH_TOKEN_SECRET")?,
            one_time_token_secret: required("ONE_TIME_TOKEN_SECRET")?,
            access_token_ttl: Duration::from_secs(access_ttl),
            refresh_token_ttl: Duration::from_secs(refresh_ttl),
            cookie_secure: parse_bool(&var, "COOKIE_SECURE", true)?,
            admin_cookie_path,
            dev_mode: parse_bool(&var, "DEV_MODE", false)?,
            max_sessions_per_tenant: max_sessions,
            public_base_url,
            seed_admin,
            tls,
            json_logs: var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }

    /// Configuration used by unit tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::auth::token::tests::{ACCESS_SECRET, REFRESH_SECRET};
        Self {
            data_dir: std::env::temp_dir(),
            host: "127.0.0.1".to_string(),
            port: 0,
            access_token_secret: ACCESS_SECRET.to_string(),
            refresh_token_secret: REFRESH_SECRET.to_string(),
            one_time_token_secret: "one-time-secret-for-tests".to_string(),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            cookie_secure: false,
            admin_cookie_path: DEFAULT_ADMIN_COOKIE_PATH.to_string(),
            dev_mode: false,
            max_sessions_per_tenant: DEFAULT_MAX_SESSIONS_PER_TENANT,
            public_base_url: Url::parse("http://localhost:3000").expect("static url"),
            seed_admin: None,
            tls: None,
            json_logs: false,
        }
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool<F>(var: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}
