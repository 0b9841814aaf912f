// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound mail for verification and password-reset links.
//!
//! Delivery itself is an external concern. The default [`TracingMailer`]
//! writes messages to the log; deployments plug a real transport in behind
//! the [`Mailer`] trait.

use url::Url;

/// A rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail delivery failure.
#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Sends mail.
pub trait Mailer: Send + Sync {
    fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Mailer that only logs.
#[derive(Debug, Default, Clone)]
pub struct TracingMailer;

impl Mailer for TracingMailer {
    fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        tracing::info!(to = %message.to, subject = %message.subject, "Sending mail");
        tracing::debug!(body = %message.body, "Mail body");
        Ok(())
    }
}

/// Build `{base}/{path}/{token}`.
pub fn link(base: &Url, path: &str, token: &str) -> Result<Url, url::ParseError> {
    base.join(&format!("{}/{}", path.trim_matches('/'), token))
}

/// Email verification message.
pub fn verification_email(to: &str, name: &str, link: &Url) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "Confirm your email address".to_string(),
        body: format!(
            "Hi {name},\n\nConfirm your email address by opening the link below. \
             It is valid for 24 hours.\n\n{link}\n"
        ),
    }
}

/// Password reset message.
pub fn password_reset_email(to: &str, name: &str, link: &Url) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        body: format!(
            "Hi {name},\n\nA password reset was requested for your account. \
             The link below is valid for one hour. If you did not ask for it, \
             you can ignore this message.\n\n{link}\n"
        ),
    }
}

/// Mailer that keeps every message in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CapturingMailer {
    sent: std::sync::Mutex<Vec<MailMessage>>,
}

#[cfg(test)]
impl CapturingMailer {
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Token at the end of the link in the most recent message to `to`.
    pub fn last_token_for(&self, to: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .and_then(|m| {
                m.body
                    .lines()
                    .find(|line| line.starts_with("http"))
                    .and_then(|line| line.trim().rsplit('/').next())
                    .map(str::to_string)
            })
    }
}

#[cfg(test)]
impl Mailer for CapturingMailer {
    fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_joins_path_and_token() {
        let base = Url::parse("https://shop.example.com").unwrap();
        let url = link(&base, "/reset-password/", "abc123").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/reset-password/abc123");
    }

    #[test]
    fn capturing_mailer_extracts_token() {
        let mailer = CapturingMailer::default();
        let base = Url::parse("http://localhost:3000").unwrap();
        let url = link(&base, "verify-email", "tok_1").unwrap();
        mailer
            .send(&verification_email("a@example.com", "A", &url))
            .unwrap();

        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.last_token_for("a@example.com").as_deref(), Some("tok_1"));
        assert!(mailer.last_token_for("b@example.com").is_none());
    }

    #[test]
    fn tracing_mailer_never_fails() {
        let base = Url::parse("http://localhost:3000").unwrap();
        let url = link(&base, "reset-password", "t").unwrap();
        assert!(TracingMailer
            .send(&password_reset_email("a@example.com", "A", &url))
            .is_ok());
    }
}
