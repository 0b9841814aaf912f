// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account lifecycle: registration, email verification and password
//! change/reset.
//!
//! Every password change stamps `password_changed_at` and drops all
//! storefront sessions in the same transaction, which is what invalidates
//! outstanding access tokens at the authorization gate.

use chrono::Utc;

use super::password::{hash_password, validate_new_password, verify_password};
use super::rotation::ClientMeta;
use super::{AuthError, AuthenticatedUser, Role};
use crate::mailer::{self, MailMessage};
use crate::state::AppState;
use crate::storage::audit::names;
use crate::storage::repository::{
    apply_password_change, is_plausible_email, normalize_email, Identity, IdentityRepository,
    OneTimeTokenRepository, TokenPurpose,
};
use crate::storage::AuditEvent;

/// Maximum display name length.
const MAX_NAME_LEN: usize = 100;

/// Front-end route receiving verification links.
const VERIFY_EMAIL_PATH: &str = "verify-email";

/// Front-end route receiving reset links.
const RESET_PASSWORD_PATH: &str = "reset-password";

/// Validate and normalize an email address.
pub fn validate_email(email: &str) -> Result<String, AuthError> {
    let normalized = normalize_email(email);
    if is_plausible_email(&normalized) {
        Ok(normalized)
    } else {
        Err(AuthError::InvalidInput("Invalid email address".to_string()))
    }
}

/// Account operations over the application state.
pub struct AccountService<'a> {
    state: &'a AppState,
}

impl<'a> AccountService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn identities(&self) -> IdentityRepository<'a> {
        IdentityRepository::new(&self.state.db)
    }

    fn one_time_tokens(&self) -> OneTimeTokenRepository<'a> {
        OneTimeTokenRepository::new(&self.state.db, &self.state.config.one_time_token_secret)
    }

    /// Deliver a message; delivery failures are logged, never surfaced.
    fn deliver(&self, message: MailMessage) {
        if let Err(e) = self.state.mailer.send(&message) {
            tracing::warn!(to = %message.to, error = %e, "Mail delivery failed");
        }
    }

    fn send_verification(&self, identity: &Identity) -> Result<(), AuthError> {
        let raw = self
            .one_time_tokens()
            .issue(&identity.id, TokenPurpose::EmailVerification)?;
        let link = mailer::link(&self.state.config.public_base_url, VERIFY_EMAIL_PATH, &raw)
            .map_err(|e| AuthError::Internal(format!("failed to build verification link: {e}")))?;
        self.deliver(mailer::verification_email(&identity.email, &identity.name, &link));
        Ok(())
    }

    /// Create a storefront identity and send its verification link.
    pub fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
        client: &ClientMeta,
    ) -> Result<Identity, AuthError> {
        let email = validate_email(email)?;
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(AuthError::InvalidInput(format!(
                "Name must be between 1 and {MAX_NAME_LEN} characters"
            )));
        }
        validate_new_password(password)?;

        let identity = Identity::new(&email, name, &hash_password(password)?, Role::User);
        self.identities().create(&identity)?;
        self.send_verification(&identity)?;

        tracing::info!(user_id = %identity.id, "Identity registered");
        self.state.audit.emit(
            AuditEvent::new(names::USER_REGISTERED)
                .with_user(&identity.id)
                .with_client(&client.ip, &client.user_agent),
        );
        Ok(identity)
    }

    /// Confirm an email address with a verification token.
    pub fn verify_email(&self, raw_token: &str, client: &ClientMeta) -> Result<String, AuthError> {
        let identity_id = self
            .one_time_tokens()
            .redeem(raw_token, TokenPurpose::EmailVerification, |identity| {
                identity.verified = true;
                identity.id.clone()
            })?
            .ok_or_else(|| {
                AuthError::InvalidInput("Verification link is invalid or has expired".to_string())
            })?;
        self.state.identity_cache.invalidate(&identity_id);

        self.state.audit.emit(
            AuditEvent::new(names::EMAIL_VERIFIED)
                .with_user(&identity_id)
                .with_client(&client.ip, &client.user_agent),
        );
        Ok(identity_id)
    }

    /// Change the caller's password after re-checking the current one.
    ///
    /// Returns the number of storefront sessions revoked.
    pub fn change_password(
        &self,
        user: &AuthenticatedUser,
        current: &str,
        new: &str,
        client: &ClientMeta,
    ) -> Result<usize, AuthError> {
        validate_new_password(new)?;
        let identity = self
            .identities()
            .get(&user.user_id)?
            .ok_or(AuthError::UserNotFound)?;
        if !verify_password(current, &identity.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if current == new {
            return Err(AuthError::InvalidInput(
                "New password must differ from the current one".to_string(),
            ));
        }

        let hash = hash_password(new)?;
        let revoked = self
            .identities()
            .set_password(&identity.id, &hash, Utc::now())?
            .ok_or(AuthError::UserNotFound)?;
        self.state.identity_cache.invalidate(&identity.id);

        tracing::info!(user_id = %identity.id, revoked, "Password changed");
        self.state.audit.emit(
            AuditEvent::new(names::PASSWORD_CHANGED)
                .with_user(&identity.id)
                .with_client(&client.ip, &client.user_agent)
                .with_details(serde_json::json!({ "revoked_sessions": revoked })),
        );
        Ok(revoked)
    }

    /// Send a reset link if the email belongs to an identity.
    ///
    /// Succeeds whether or not the address is known.
    pub fn request_password_reset(&self, email: &str, client: &ClientMeta) -> Result<(), AuthError> {
        let email = validate_email(email)?;
        let Some(identity) = self.identities().get_by_email(&email)? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let raw = self
            .one_time_tokens()
            .issue(&identity.id, TokenPurpose::PasswordReset)?;
        let link = mailer::link(&self.state.config.public_base_url, RESET_PASSWORD_PATH, &raw)
            .map_err(|e| AuthError::Internal(format!("failed to build reset link: {e}")))?;
        self.deliver(mailer::password_reset_email(&identity.email, &identity.name, &link));

        self.state.audit.emit(
            AuditEvent::new(names::PASSWORD_RESET_REQUESTED)
                .with_user(&identity.id)
                .with_client(&client.ip, &client.user_agent),
        );
        Ok(())
    }

    /// Set a new password with a reset token.
    ///
    /// The token is consumed and the password changed in one transaction.
    /// Returns the number of storefront sessions revoked.
    pub fn reset_password(
        &self,
        raw_token: &str,
        new: &str,
        client: &ClientMeta,
    ) -> Result<usize, AuthError> {
        validate_new_password(new)?;
        let hash = hash_password(new)?;
        let now = Utc::now();

        let (identity_id, revoked) = self
            .one_time_tokens()
            .redeem(raw_token, TokenPurpose::PasswordReset, |identity| {
                (identity.id.clone(), apply_password_change(identity, &hash, now))
            })?
            .ok_or_else(|| {
                AuthError::InvalidInput("Reset link is invalid or has expired".to_string())
            })?;
        self.state.identity_cache.invalidate(&identity_id);

        tracing::info!(user_id = %identity_id, revoked, "Password reset");
        self.state.audit.emit(
            AuditEvent::new(names::PASSWORD_RESET)
                .with_user(&identity_id)
                .with_client(&client.ip, &client.user_agent)
                .with_details(serde_json::json!({ "revoked_sessions": revoked })),
        );
        Ok(revoked)
    }

    /// Create a verified administrator unless `email` is already taken.
    ///
    /// Returns `true` if an identity was created.
    pub fn ensure_admin(&self, email: &str, password: &str) -> Result<bool, AuthError> {
        let email = validate_email(email)?;
        if self.identities().get_by_email(&email)?.is_some() {
            return Ok(false);
        }
        validate_new_password(password)?;

        let hash = hash_password(password)?;
        let mut identity = Identity::new(&email, "Administrator", &hash, Role::Admin);
        identity.verified = true;
        self.identities().create(&identity)?;

        tracing::info!(user_id = %identity.id, "Seeded administrator");
        self.state
            .audit
            .emit(AuditEvent::new(names::ADMIN_SEEDED).with_user(&identity.id));
        Ok(true)
    }
}
