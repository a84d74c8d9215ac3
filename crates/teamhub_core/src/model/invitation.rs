//! Invitation record and the reference shape that carries it to acceptance.
//!
//! # Invariants
//! - `email` is normalized (trimmed, lowercased) before persistence.
//! - There is no expiry: a pending invitation stays valid until it is
//!   accepted (consumed) or revoked by an admin.

use super::{
    now_epoch_ms, require_non_empty, InvitationId, ModelValidationError, TeamId, UserId,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    /// Legacy marker; accepted invitations are normally deleted instead.
    Accepted,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: InvitationId,
    pub email: String,
    pub team_id: TeamId,
    /// Team name captured when the invitation was created.
    pub team_name: String,
    pub status: InvitationStatus,
    pub invited_by: Option<UserId>,
    #[serde(rename = "createdAt")]
    pub created_at_ms: i64,
}

impl Invitation {
    pub fn new(
        email: &str,
        team_id: impl Into<String>,
        team_name: impl Into<String>,
        invited_by: Option<UserId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: normalize_email(email),
            team_id: team_id.into(),
            team_name: team_name.into(),
            status: InvitationStatus::Pending,
            invited_by,
            created_at_ms: now_epoch_ms(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_non_empty("id", &self.id)?;
        require_non_empty("team_id", &self.team_id)?;
        validate_email(&self.email)
    }

    /// Case-insensitive recipient check.
    pub fn is_addressed_to(&self, claimed_email: &str) -> bool {
        normalize_email(claimed_email) == normalize_email(&self.email)
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    pub fn to_ref(&self) -> InvitationRef {
        InvitationRef {
            email: self.email.clone(),
            id: self.id.clone(),
        }
    }
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn validate_email(value: &str) -> Result<(), ModelValidationError> {
    let normalized = normalize_email(value);
    if normalized.is_empty() {
        return Err(ModelValidationError::EmptyField("email"));
    }
    if !EMAIL_RE.is_match(&normalized) {
        return Err(ModelValidationError::InvalidEmail(value.trim().to_string()));
    }
    Ok(())
}

/// `{email, id}` pair identifying an invitation to accept.
///
/// Arrives either from a deep link or from the local pending slot; both
/// carriers produce this same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRef {
    pub email: String,
    pub id: InvitationId,
}

impl InvitationRef {
    pub fn new(email: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            id: id.into(),
        }
    }

    /// Parses `<base>?email=<urlencoded>&id=<id>`.
    ///
    /// Unrelated query parameters are ignored. The first occurrence wins when
    /// a parameter is repeated.
    pub fn from_link(link: &str) -> Result<Self, InvitationLinkError> {
        let (_, query) = link
            .split_once('?')
            .ok_or(InvitationLinkError::MissingQuery)?;
        let query = query.split('#').next().unwrap_or_default();

        let mut email = None;
        let mut id = None;
        for pair in query.split('&') {
            let (key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match key {
                "email" => &mut email,
                "id" => &mut id,
                _ => continue,
            };
            if slot.is_some() {
                continue;
            }
            let decoded = urlencoding::decode(raw_value)
                .map_err(|_| InvitationLinkError::InvalidEncoding(param_name(key)))?;
            *slot = Some(decoded.trim().to_string());
        }

        let email = email
            .filter(|value| !value.is_empty())
            .ok_or(InvitationLinkError::MissingParam("email"))?;
        let id = id
            .filter(|value| !value.is_empty())
            .ok_or(InvitationLinkError::MissingParam("id"))?;
        Ok(Self { email, id })
    }

    /// Builds the deep link understood by [`InvitationRef::from_link`].
    pub fn to_link(&self, base: &str) -> String {
        format!(
            "{base}?email={}&id={}",
            urlencoding::encode(&self.email),
            urlencoding::encode(&self.id)
        )
    }
}

fn param_name(key: &str) -> &'static str {
    if key == "email" {
        "email"
    } else {
        "id"
    }
}

/// Deep-link parse failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitationLinkError {
    MissingQuery,
    MissingParam(&'static str),
    InvalidEncoding(&'static str),
}

impl Display for InvitationLinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingQuery => write!(f, "invitation link has no query string"),
            Self::MissingParam(name) => write!(f, "invitation link is missing `{name}`"),
            Self::InvalidEncoding(name) => {
                write!(f, "invitation link parameter `{name}` is not valid UTF-8")
            }
        }
    }
}

impl Error for InvitationLinkError {}
