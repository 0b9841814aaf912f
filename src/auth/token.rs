// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access and refresh token codec.
//!
//! ## Security
//!
//! - HS256 with one secret per token class; the two are never interchangeable
//! - The `typ` claim is checked on top of the signature
//! - Clock skew tolerance is 60 seconds
//! - Stateless: revocation is enforced by the session store (refresh) and the
//!   password-change timestamp (access), never by a blocklist

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::claims::{TokenClaims, TokenClass};
use super::roles::Tenant;
use super::AuthError;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Signing material and lifetime for one token class.
struct ClassKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl ClassKeys {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// A freshly signed token together with its claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

/// Signs and verifies access and refresh tokens.
pub struct TokenCodec {
    access: ClassKeys,
    refresh: ClassKeys,
}

impl TokenCodec {
    /// Create a codec from the two class secrets.
    ///
    /// Fails when a secret is too short or both secrets are equal.
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, AuthError> {
        if access_secret.len() < MIN_SECRET_LEN || refresh_secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::Internal(format!(
                "token secrets must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if access_secret == refresh_secret {
            return Err(AuthError::Internal(
                "access and refresh secrets must differ".to_string(),
            ));
        }
        Ok(Self {
            access: ClassKeys::new(access_secret.as_bytes(), access_ttl),
            refresh: ClassKeys::new(refresh_secret.as_bytes(), refresh_ttl),
        })
    }

    fn keys(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    /// Lifetime of tokens of the given class.
    pub fn ttl(&self, class: TokenClass) -> Duration {
        self.keys(class).ttl
    }

    /// Mint a short-lived access token.
    pub fn issue_access(&self, identity_id: &str, tenant: Tenant) -> Result<IssuedToken, AuthError> {
        self.issue_at(TokenClass::Access, identity_id, tenant, Utc::now().timestamp())
    }

    /// Mint a long-lived refresh token.
    pub fn issue_refresh(&self, identity_id: &str, tenant: Tenant) -> Result<IssuedToken, AuthError> {
        self.issue_at(TokenClass::Refresh, identity_id, tenant, Utc::now().timestamp())
    }

    /// Mint a token with an explicit issued-at time.
    pub(crate) fn issue_at(
        &self,
        class: TokenClass,
        identity_id: &str,
        tenant: Tenant,
        issued_at: i64,
    ) -> Result<IssuedToken, AuthError> {
        let keys = self.keys(class);
        let exp = i64::try_from(keys.ttl.as_secs())
            .ok()
            .and_then(|ttl| issued_at.checked_add(ttl))
            .ok_or_else(|| AuthError::Internal("token lifetime out of range".to_string()))?;
        let claims = TokenClaims {
            sub: identity_id.to_string(),
            role: tenant.role_claim(),
            typ: class,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: issued_at,
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))?;
        Ok(IssuedToken { token, claims })
    }

    /// Verify signature, expiry and class of a token.
    pub fn verify(&self, token: &str, class: TokenClass) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        let token_data = decode::<TokenClaims>(token, &self.keys(class).decoding, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?;

        let claims = token_data.claims;
        if claims.typ != class {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Decode a refresh token for attribution only, ignoring expiry.
    ///
    /// The signature is still checked so a forged token cannot attribute an
    /// audit event to someone else. Used by logout, which must succeed with
    /// an expired or garbled cookie.
    pub fn decode_refresh_lenient(&self, token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub"]);
        decode::<TokenClaims>(token, &self.refresh.decoding, &validation)
            .ok()
            .map(|data| data.claims)
            .filter(|claims| claims.typ == TokenClass::Refresh)
    }
}
