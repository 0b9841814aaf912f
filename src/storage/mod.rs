// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single embedded redb database under the
//! data directory. Audit events are appended to daily JSONL files next to
//! it.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   auth.redb                  # identities, email index, one-time tokens
//!   audit/
//!     {date}/events.jsonl      # Daily audit logs
//! ```
//!
//! ## Important Notes
//!
//! - Session records are embedded in the identity document, one vector
//!   per tenant
//! - Each mutation is one write transaction; redb serializes writers
//! - One-time tokens are stored by HMAC digest, never in the clear

pub mod audit;
pub mod database;
pub mod identity_cache;
pub mod paths;
pub mod repository;

pub use audit::{AuditEvent, AuditLog};
pub use database::{AuthDatabase, StoreError, StoreResult};
pub use identity_cache::{IdentityCache, IdentitySummary};
pub use paths::StoragePaths;
