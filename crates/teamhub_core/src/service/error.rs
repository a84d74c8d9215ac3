//! Error taxonomy shared by team services.

use crate::model::ModelValidationError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TeamResult<T> = Result<T, TeamError>;

#[derive(Debug)]
pub enum TeamError {
    /// Referenced team, invitation or membership does not exist.
    NotFound { entity: &'static str, id: String },
    /// Invitation email differs from the claimed identity email.
    WrongRecipient { required: String, current: String },
    /// Operation needs a signed-in identity.
    AuthenticationRequired,
    /// Identity holds no membership in the team.
    NotAMember { user_id: String, team_id: String },
    /// Invited address already belongs to a member of the team.
    AlreadyMember { email: String, team_id: String },
    /// Membership data could not be read; terminal for a live subscription.
    MembershipUnavailable(String),
    /// Role-gated action attempted by a non-admin.
    PermissionDenied {
        user_id: String,
        team_id: String,
        action: &'static str,
    },
    Validation(ModelValidationError),
    Repo(RepoError),
}

impl TeamError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn not_a_member(user_id: &str, team_id: &str) -> Self {
        Self::NotAMember {
            user_id: user_id.to_string(),
            team_id: team_id.to_string(),
        }
    }

    /// Whether the caller can fix the input and retry without a service change.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MembershipUnavailable(_) | Self::Repo(_))
    }

    /// Stable machine-readable code for UI mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::WrongRecipient { .. } => "wrong_recipient",
            Self::AuthenticationRequired => "authentication_required",
            Self::NotAMember { .. } => "not_a_member",
            Self::AlreadyMember { .. } => "already_member",
            Self::MembershipUnavailable(_) => "membership_unavailable",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Validation(_) => "validation",
            Self::Repo(_) => "storage",
        }
    }
}

impl Display for TeamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::WrongRecipient { required, current } => write!(
                f,
                "this invitation is addressed to {required}, but you are signed in as {current}"
            ),
            Self::AuthenticationRequired => write!(f, "sign in is required for this operation"),
            Self::NotAMember { user_id, team_id } => {
                write!(f, "user {user_id} is not a member of team {team_id}")
            }
            Self::AlreadyMember { email, team_id } => {
                write!(f, "{email} is already a member of team {team_id}")
            }
            Self::MembershipUnavailable(reason) => {
                write!(f, "membership data is unavailable: {reason}")
            }
            Self::PermissionDenied {
                user_id,
                team_id,
                action,
            } => write!(
                f,
                "user {user_id} is not allowed to {action} in team {team_id}"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TeamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TeamError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<ModelValidationError> for TeamError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}
