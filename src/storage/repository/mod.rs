// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the identity database.
//!
//! Each repository wraps one concern of the identity document. Every
//! mutation runs inside a single redb write transaction.

pub mod identities;
pub mod sessions;
pub mod tokens;

pub(crate) use identities::apply_password_change;
pub use identities::{is_plausible_email, normalize_email, Identity, IdentityRepository};
pub use sessions::{RotateOutcome, SessionRecord, SessionRepository};
pub use tokens::{OneTimeToken, OneTimeTokenRepository, TokenPurpose};
