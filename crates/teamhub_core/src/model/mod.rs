//! Canonical domain model for teams, memberships and invitations.
//!
//! # Responsibility
//! - Define the single canonical shape for each persisted entity.
//! - Keep legacy document shapes out of this layer (see `service::legacy_import`).
//!
//! # Invariants
//! - At most one membership exists per `(team_id, user_id)`; its id is the
//!   deterministic composite `"{team_id}_{user_id}"`.
//! - Invitation emails are stored trimmed and lowercased.

pub mod identity;
pub mod invitation;
pub mod membership;
pub mod team;

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub type UserId = String;
pub type TeamId = String;
pub type InvitationId = String;

/// Field-level validation failure for model records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    EmptyField(&'static str),
    InvalidEmail(String),
    UnknownPack(String),
    UnknownModule(String),
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "`{field}` must not be empty"),
            Self::InvalidEmail(value) => write!(f, "invalid email address: `{value}`"),
            Self::UnknownPack(value) => write!(f, "unknown team pack: `{value}`"),
            Self::UnknownModule(value) => write!(f, "unknown module: `{value}`"),
        }
    }
}

impl Error for ModelValidationError {}

pub(crate) fn require_non_empty(
    field: &'static str,
    value: &str,
) -> Result<(), ModelValidationError> {
    if value.trim().is_empty() {
        return Err(ModelValidationError::EmptyField(field));
    }
    Ok(())
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
