// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mealbox Auth - session and credential lifecycle service
//!
//! Issues short-lived access tokens and rotating refresh tokens for two
//! isolated tenants: the storefront (`user`) and the admin console
//! (`admin`). Every logged-in device is a session record; presenting an
//! already-rotated refresh token revokes every session of that tenant.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token codec, rotation protocol, CSRF guard and authorization gate
//! - `events` - Live audit feed for admin consoles
//! - `session_pruner` - Background cleanup of stale sessions
//! - `storage` - Embedded database (redb) and audit log

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod mailer;
pub mod models;
pub mod session_pruner;
pub mod state;
pub mod storage;
pub mod tls;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Install the global tracing subscriber.
///
/// `json` selects machine-readable output; otherwise a human-readable
/// format is used. Calling this more than once is a no-op.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}
