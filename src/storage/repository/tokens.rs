// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-use tokens for email verification and password reset.
//!
//! Only an HMAC-SHA256 digest of the raw token is stored, so a copy of the
//! database cannot be replayed against the verify or reset endpoints.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::super::database::{AuthDatabase, StoreError, StoreResult};
use super::identities::Identity;
use crate::auth::csrf::random_token;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes per raw token.
const ONE_TIME_TOKEN_BYTES: usize = 32;

/// What a one-time token may be redeemed for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    /// Lifetime of a token of this purpose.
    pub fn ttl(&self) -> Duration {
        match self {
            TokenPurpose::EmailVerification => Duration::hours(24),
            TokenPurpose::PasswordReset => Duration::hours(1),
        }
    }
}

/// Stored form of a one-time token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OneTimeToken {
    pub identity_id: String,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
}

/// Repository for one-time tokens.
pub struct OneTimeTokenRepository<'a> {
    db: &'a AuthDatabase,
    secret: &'a [u8],
}

impl<'a> OneTimeTokenRepository<'a> {
    /// Create a repository keyed by the one-time-token secret.
    pub fn new(db: &'a AuthDatabase, secret: &'a str) -> Self {
        Self {
            db,
            secret: secret.as_bytes(),
        }
    }

    fn digest(&self, raw: &str) -> StoreResult<String> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.secret)
            .map_err(|e| StoreError::InvalidKey(format!("HMAC initialization failed: {e}")))?;
        mac.update(raw.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Issue a fresh token and return the raw value to hand to the user.
    pub fn issue(&self, identity_id: &str, purpose: TokenPurpose) -> StoreResult<String> {
        let raw = random_token(ONE_TIME_TOKEN_BYTES);
        let token = OneTimeToken {
            identity_id: identity_id.to_string(),
            purpose,
            expires_at: Utc::now() + purpose.ttl(),
        };
        self.db.put_one_time_token(&self.digest(&raw)?, &token)?;
        Ok(raw)
    }

    /// Consume a raw token and apply `f` to its identity in the same transaction.
    ///
    /// Returns `None` if the token is unknown, expired, already used or was
    /// issued for another purpose.
    pub fn redeem<T, F>(&self, raw: &str, purpose: TokenPurpose, f: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&mut Identity) -> T,
    {
        self.db
            .redeem_one_time_token(&self.digest(raw)?, purpose, Utc::now(), f)
    }
}
