// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Pruner
//!
//! Background task that drops session records whose refresh token can no
//! longer be valid, and one-time tokens past their expiry. Without it a
//! device that never logs out keeps its record until the identity's
//! session cap evicts it.
//!
//! ## Strategy
//!
//! Every `interval` (default 10 min) the pruner:
//! 1. Removes session records created more than one refresh-token lifetime
//!    ago, in both tenants.
//! 2. Purges expired password-reset and email-verification tokens.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::repository::SessionRepository;
use crate::storage::AuthDatabase;

/// Default interval between sweeps.
const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Result of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    /// Identities that lost at least one session record
    pub identities_pruned: usize,
    /// One-time tokens removed
    pub tokens_purged: usize,
}

/// Background pruner of stale session records.
pub struct SessionPruner {
    db: Arc<AuthDatabase>,
    refresh_ttl: Duration,
    interval: Duration,
}

impl SessionPruner {
    /// Create a pruner for sessions whose refresh tokens live `refresh_ttl`.
    pub fn new(db: Arc<AuthDatabase>, refresh_ttl: Duration) -> Self {
        Self {
            db,
            refresh_ttl,
            interval: DEFAULT_PRUNE_INTERVAL,
        }
    }

    /// Override the sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the pruner loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(pruner.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Session pruner starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Session pruner shutting down");
                return;
            }

            let db = Arc::clone(&self.db);
            let refresh_ttl = self.refresh_ttl;
            match tokio::task::spawn_blocking(move || prune_once(&db, refresh_ttl)).await {
                Ok(report) if report != PruneReport::default() => {
                    info!(
                        identities = report.identities_pruned,
                        tokens = report.tokens_purged,
                        "Session pruner: removed stale records"
                    );
                }
                Ok(_) => debug!("Session pruner: nothing to remove"),
                Err(e) => warn!(error = %e, "Session pruner: sweep task failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Session pruner shutting down");
                    return;
                }
            }
        }
    }
}

/// Execute one sweep. Store failures are logged and counted as zero.
pub fn prune_once(db: &AuthDatabase, refresh_ttl: Duration) -> PruneReport {
    let mut report = PruneReport::default();

    match chrono::Duration::from_std(refresh_ttl) {
        Ok(ttl) => {
            let cutoff = Utc::now() - ttl;
            // The cap only matters on append, so any value works for pruning.
            match SessionRepository::new(db, usize::MAX).prune_created_before(cutoff) {
                Ok(n) => report.identities_pruned = n,
                Err(e) => warn!(error = %e, "Session pruner: failed to prune sessions"),
            }
        }
        Err(e) => warn!(error = %e, "Session pruner: refresh TTL out of range"),
    }

    match db.purge_expired_one_time_tokens(Utc::now()) {
        Ok(n) => report.tokens_purged = n,
        Err(e) => warn!(error = %e, "Session pruner: failed to purge one-time tokens"),
    }

    report
}
