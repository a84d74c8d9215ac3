//! Membership record binding one identity to one team.

use super::invitation::normalize_email;
use super::{now_epoch_ms, require_non_empty, ModelValidationError, TeamId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can invite, remove members and change roles.
    Admin,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    pub fn can_manage_members(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub role: Role,
    #[serde(rename = "joinedAt")]
    pub joined_at_ms: i64,
    /// Normalized address of the member, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Membership {
    pub fn new(team_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            team_id: team_id.into(),
            user_id: user_id.into(),
            role,
            joined_at_ms: now_epoch_ms(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(normalize_email(email)).filter(|email| !email.is_empty());
        self
    }

    /// Deterministic document id; see [`membership_id`].
    pub fn id(&self) -> String {
        membership_id(&self.team_id, &self.user_id)
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_non_empty("team_id", &self.team_id)?;
        require_non_empty("user_id", &self.user_id)
    }
}

/// Composite membership key `"{team_id}_{user_id}"`.
pub fn membership_id(team_id: &str, user_id: &str) -> String {
    format!("{team_id}_{user_id}")
}
