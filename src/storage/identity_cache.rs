// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for identity lookups made by the authorization gate.
//!
//! Every authenticated request needs the subject's role and last password
//! change. Caching a small summary avoids a redb read per request. Entries
//! are invalidated whenever the identity changes in-process, and expire
//! after a short TTL otherwise.
//!
//! Each invalidation bumps a generation counter. A reader snapshots the
//! generation before reading the database and hands it back to [`put`];
//! if any invalidation happened in between, the summary may predate it
//! and is not stored.
//!
//! [`put`]: IdentityCache::put

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;

use super::repository::identities::Identity;
use crate::auth::Role;

/// Default number of cached identities.
pub const DEFAULT_IDENTITY_CACHE_CAPACITY: usize = 1024;

/// Default entry lifetime.
pub const DEFAULT_IDENTITY_CACHE_TTL: Duration = Duration::from_secs(30);

/// The subset of an identity the gate needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySummary {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub verified: bool,
    pub password_changed_at: Option<DateTime<Utc>>,
}

impl IdentitySummary {
    /// Whether an access token issued at `issued_at` predates the last password change.
    pub fn revokes_tokens_issued_at(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .is_some_and(|changed| issued_at < changed.timestamp())
    }
}

impl From<&Identity> for IdentitySummary {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role,
            verified: identity.verified,
            password_changed_at: identity.password_changed_at,
        }
    }
}

struct CacheEntry {
    summary: IdentitySummary,
    inserted_at: Instant,
}

/// In-process LRU cache of identity summaries.
pub struct IdentityCache {
    inner: Mutex<CacheState>,
    ttl: Duration,
}

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    generation: u64,
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_CACHE_CAPACITY, DEFAULT_IDENTITY_CACHE_TTL)
    }
}

impl IdentityCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheState {
                entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                generation: 0,
            }),
            ttl,
        }
    }

    /// Get a cached summary. Returns `None` if not cached or expired.
    pub fn get(&self, identity_id: &str) -> Option<IdentitySummary> {
        let mut inner = self.inner.lock().ok()?;
        if let Some(entry) = inner.entries.get(identity_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.summary.clone());
            }
            inner.entries.pop(identity_id);
        }
        None
    }

    /// Current invalidation generation. Take it before reading the
    /// identity that will be passed to [`put`](Self::put).
    pub fn generation(&self) -> u64 {
        self.inner.lock().map(|inner| inner.generation).unwrap_or(u64::MAX)
    }

    /// Store a summary read at `generation`.
    ///
    /// Returns `false` and stores nothing if an invalidation happened since.
    pub fn put(&self, summary: IdentitySummary, generation: u64) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        if inner.generation != generation {
            return false;
        }
        inner.entries.put(
            summary.id.clone(),
            CacheEntry {
                summary,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    /// Drop the entry for an identity and start a new generation.
    pub fn invalidate(&self, identity_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.pop(identity_id);
            inner.generation = inner.generation.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> IdentitySummary {
        IdentitySummary {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
            role: Role::User,
            verified: true,
            password_changed_at: None,
        }
    }

    #[test]
    fn put_get_invalidate() {
        let cache = IdentityCache::new(10, Duration::from_secs(300));
        assert!(cache.get("u1").is_none());

        assert!(cache.put(summary("u1"), cache.generation()));
        assert_eq!(cache.get("u1").unwrap().email, "u1@example.com");

        cache.invalidate("u1");
        assert!(cache.get("u1").is_none());
    }

    #[test]
    fn entries_expire() {
        let cache = IdentityCache::new(10, Duration::from_millis(1));
        cache.put(summary("u1"), cache.generation());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("u1").is_none());
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = IdentityCache::new(2, Duration::from_secs(300));
        cache.put(summary("a"), cache.generation());
        cache.put(summary("b"), cache.generation());
        cache.get("a");
        cache.put(summary("c"), cache.generation());

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn put_after_invalidation_is_dropped() {
        let cache = IdentityCache::new(10, Duration::from_secs(300));
        let before = cache.generation();
        cache.invalidate("u1");

        assert!(!cache.put(summary("u1"), before));
        assert!(cache.get("u1").is_none());
        assert!(cache.put(summary("u1"), cache.generation()));
    }

    #[test]
    fn revocation_compares_whole_seconds() {
        let mut summary = summary("f");
        assert!(!summary.revokes_tokens_issued_at(0));

        summary.password_changed_at = DateTime::from_timestamp(1_700_000_000, 0);
        assert!(summary.revokes_tokens_issued_at(1_699_999_700));
        assert!(!summary.revokes_tokens_issued_at(1_700_000_000));
        assert!(!summary.revokes_tokens_issued_at(1_700_000_001));
    }
}
