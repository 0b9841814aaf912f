// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Logins, rotations, reuse detection, logouts and password changes are
//! appended to a daily JSONL file and pushed to connected admin consoles.
//! Emission is fire-and-forget: it never blocks a handler and its failures
//! are logged and swallowed.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::paths::StoragePaths;
use crate::auth::Tenant;
use crate::events::EventRegistry;

/// Tenant-scoped event suffixes (`USER_*` / `ADMIN_*`).
pub mod kind {
    pub const LOGIN: &str = "LOGIN";
    pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
    pub const SESSION_ROTATED: &str = "SESSION_ROTATED";
    pub const REUSE_DETECTED: &str = "REUSE_DETECTED";
    pub const LOGOUT: &str = "LOGOUT";
    pub const LOGOUT_OTHERS: &str = "LOGOUT_OTHERS";
}

/// Event names that are not tenant-scoped.
pub mod names {
    pub const USER_FORCE_LOGOUT: &str = "USER_FORCE_LOGOUT";
    pub const USER_REGISTERED: &str = "USER_REGISTERED";
    pub const EMAIL_VERIFIED: &str = "EMAIL_VERIFIED";
    pub const PASSWORD_CHANGED: &str = "PASSWORD_CHANGED";
    pub const PASSWORD_RESET_REQUESTED: &str = "PASSWORD_RESET_REQUESTED";
    pub const PASSWORD_RESET: &str = "PASSWORD_RESET";
    pub const ADMIN_SEEDED: &str = "ADMIN_SEEDED";
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Event name, e.g. `USER_REUSE_DETECTED`.
    pub event: String,
    /// Identity the event is about (if known).
    pub user_id: Option<String>,
    /// Identity that performed the action, when different from `user_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// IP address of the request (if available).
    pub ip_address: Option<String>,
    /// User agent of the request (if available).
    pub user_agent: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event: event.into(),
            user_id: None,
            actor_id: None,
            ip_address: None,
            user_agent: None,
            details: None,
            success: true,
        }
    }

    /// Create a tenant-scoped event such as `ADMIN_LOGIN`.
    pub fn for_tenant(tenant: Tenant, kind: &str) -> Self {
        Self::new(format!("{}_{}", tenant.audit_prefix(), kind))
    }

    /// Set the user ID.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the acting identity.
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Set the client address and user agent.
    pub fn with_client(mut self, ip: &str, user_agent: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self.user_agent = Some(user_agent.to_string());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed.
    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

/// Write-only audit sink.
#[derive(Clone)]
pub struct AuditLog {
    paths: StoragePaths,
    events: Arc<EventRegistry>,
}

impl AuditLog {
    /// Create a sink writing under `paths` and publishing to `events`.
    pub fn new(paths: StoragePaths, events: Arc<EventRegistry>) -> Self {
        Self { paths, events }
    }

    /// Record an event without waiting for it.
    ///
    /// The file append runs on the blocking pool; errors are logged only.
    pub fn emit(&self, event: AuditEvent) {
        self.events.publish(&event);

        let paths = self.paths.clone();
        let write = move || {
            if let Err(e) = append_event(&paths, &event) {
                tracing::warn!(
                    event = %event.event,
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to write audit event"
                );
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }

    /// Append an event synchronously.
    pub fn record(&self, event: &AuditEvent) -> std::io::Result<()> {
        append_event(&self.paths, event)
    }

    /// Read audit events for a specific date (YYYY-MM-DD).
    pub fn read_events(&self, date: &str) -> std::io::Result<Vec<AuditEvent>> {
        let path = self.paths.audit_events_file(date);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(std::io::Error::other))
            .collect()
    }
}

/// Append one event as a JSONL line to its daily file.
fn append_event(paths: &StoragePaths, event: &AuditEvent) -> std::io::Result<()> {
    let date = event.timestamp.format("%Y-%m-%d").to_string();
    let path = paths.audit_events_file(&date);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut line = serde_json::to_vec(event).map_err(std::io::Error::other)?;
    line.push(b'\n');

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(&line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AuditLog) {
        let temp = TempDir::new().unwrap();
        let log = AuditLog::new(
            StoragePaths::new(temp.path()),
            Arc::new(EventRegistry::default()),
        );
        (temp, log)
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    #[test]
    fn tenant_scoped_names() {
        let event = AuditEvent::for_tenant(Tenant::Admin, kind::REUSE_DETECTED);
        assert_eq!(event.event, "ADMIN_REUSE_DETECTED");
        let event = AuditEvent::for_tenant(Tenant::User, kind::SESSION_ROTATED);
        assert_eq!(event.event, "USER_SESSION_ROTATED");
    }

    #[test]
    fn builder_sets_fields() {
        let event = AuditEvent::new(names::USER_FORCE_LOGOUT)
            .with_user("target")
            .with_actor("admin")
            .with_client("10.0.0.1", "curl")
            .failed();

        assert_eq!(event.user_id.as_deref(), Some("target"));
        assert_eq!(event.actor_id.as_deref(), Some("admin"));
        assert_eq!(event.ip_address.as_deref(), Some("10.0.0.1"));
        assert!(!event.success);
    }

    #[test]
    fn record_and_read_events() {
        let (_temp, log) = setup();
        log.record(&AuditEvent::new(names::PASSWORD_CHANGED).with_user("u1"))
            .unwrap();
        log.record(&AuditEvent::for_tenant(Tenant::User, kind::LOGOUT))
            .unwrap();

        let events = log.read_events(&today()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "PASSWORD_CHANGED");
        assert_eq!(events[1].event, "USER_LOGOUT");
    }

    #[test]
    fn missing_day_reads_empty() {
        let (_temp, log) = setup();
        assert!(log.read_events("1999-01-01").unwrap().is_empty());
    }

    #[test]
    fn emit_outside_runtime_writes_inline() {
        let (_temp, log) = setup();
        log.emit(AuditEvent::new(names::USER_REGISTERED).with_user("u2"));
        let events = log.read_events(&today()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id.as_deref(), Some("u2"));
    }

    #[test]
    fn write_failure_is_swallowed() {
        let temp = TempDir::new().unwrap();
        // A file where the audit directory should be makes every append fail
        std::fs::write(temp.path().join("audit"), b"not a directory").unwrap();
        let log = AuditLog::new(
            StoragePaths::new(temp.path()),
            Arc::new(EventRegistry::default()),
        );
        log.emit(AuditEvent::new(names::PASSWORD_RESET));
        assert!(log.record(&AuditEvent::new(names::PASSWORD_RESET)).is_err());
    }
}
