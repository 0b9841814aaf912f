// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{AccountService, AuthError, SessionService, TokenCodec};
use crate::config::ServiceConfig;
use crate::events::EventRegistry;
use crate::mailer::Mailer;
use crate::storage::{AuditLog, AuthDatabase, IdentityCache, StoreError, StoragePaths};

/// Failure while assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Store(#[from] StoreError),
    #[error("invalid token configuration: {0}")]
    Tokens(AuthError),
}

#[derive(Clone)]
pub struct AppState {
    /// Embedded identity and session database
    pub db: Arc<AuthDatabase>,
    /// Runtime configuration
    pub config: Arc<ServiceConfig>,
    /// Access/refresh token codec
    pub tokens: Arc<TokenCodec>,
    /// Identity summaries for the authorization gate
    pub identity_cache: Arc<IdentityCache>,
    /// Write-only audit sink
    pub audit: AuditLog,
    /// Live admin console connections
    pub events: Arc<EventRegistry>,
    /// Outbound mail
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Open the database under the configured data directory and wire
    /// every component together.
    pub fn new(config: ServiceConfig, mailer: Arc<dyn Mailer>) -> Result<Self, StateError> {
        let paths = StoragePaths::new(&config.data_dir);
        let db = AuthDatabase::open(&paths.database_file())?;
        let tokens = TokenCodec::new(
            &config.access_token_secret,
            &config.refresh_token_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
        .map_err(StateError::Tokens)?;
        let events = Arc::new(EventRegistry::default());

        Ok(Self {
            db: Arc::new(db),
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            identity_cache: Arc::new(IdentityCache::default()),
            audit: AuditLog::new(paths, Arc::clone(&events)),
            events,
            mailer,
        })
    }

    /// Session lifecycle operations.
    pub fn sessions(&self) -> SessionService<'_> {
        SessionService::new(self)
    }

    /// Account lifecycle operations.
    pub fn accounts(&self) -> AccountService<'_> {
        AccountService::new(self)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;

    #[test]
    fn state_opens_database_in_data_dir() {
        let (state, temp_dir, _) = test_state();
        assert!(state.db.health_check().is_ok());
        assert!(temp_dir.path().join("auth.redb").exists());
    }

    #[test]
    fn equal_secrets_are_rejected() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = ServiceConfig::for_tests();
        config.data_dir = temp_dir.path().to_path_buf();
        config.refresh_token_secret = config.access_token_secret.clone();
        let result = AppState::new(config, Arc::new(crate::mailer::TracingMailer));
        assert!(matches!(result, Err(StateError::Tokens(_))));
    }
}
