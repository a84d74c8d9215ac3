//! Invitation use-cases: invite, load, validate and accept.
//!
//! # Responsibility
//! - Let admins create, resend, list and revoke pending invitations.
//! - Turn an accepted invitation into a `member` membership and consume it.
//! - Carry an invitation reference across sign-in through one carrier only:
//!   the persisted pending slot.
//!
//! # Invariants
//! - Acceptance writes the membership by composite key, then deletes the
//!   invitation. Re-running after a full or partial first run is a no-op
//!   success, never a duplicate membership.
//! - Acceptance never downgrades an existing membership.
//! - Mail delivery failure never removes the invitation record.

use crate::config::{CoreConfig, DEFAULT_INVITATION_LINK_BASE, DEFAULT_INVITEE_FIRST_NAME};
use crate::model::identity::{mask_email, Identity};
use crate::model::invitation::{normalize_email, validate_email, Invitation, InvitationRef};
use crate::model::membership::{Membership, Role};
use crate::repo::invitation_repo::{InvitationRepository, PendingInvitationStore};
use crate::repo::membership_repo::MembershipRepository;
use crate::repo::team_repo::TeamRepository;
use crate::service::error::{TeamError, TeamResult};
use crate::service::team_service::require_admin;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Message handed to the transactional mail collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationEmail {
    pub to_email: String,
    pub recipient_first_name: String,
    pub team_name: String,
    pub invitation_id: String,
    /// Deep link that opens the acceptance flow.
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerError(pub String);

impl Display for MailerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invitation email delivery failed: {}", self.0)
    }
}

impl Error for MailerError {}

/// Transactional email sender; produced-to only.
pub trait InvitationMailer {
    fn send_invitation_email(&self, email: &InvitationEmail) -> Result<(), MailerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteOutcome {
    pub invitation: Invitation,
    /// `false` when an existing pending invitation was reused.
    pub created: bool,
    pub email_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub membership: Membership,
    /// The membership existed before this call (repeat or earlier partial run).
    pub already_member: bool,
    pub invitation_deleted: bool,
}

pub struct InvitationService<I, M, T>
where
    I: InvitationRepository + PendingInvitationStore,
    M: MembershipRepository,
    T: TeamRepository,
{
    invitations: I,
    memberships: M,
    teams: T,
    link_base: String,
    fallback_first_name: String,
}

impl<I, M, T> InvitationService<I, M, T>
where
    I: InvitationRepository + PendingInvitationStore,
    M: MembershipRepository,
    T: TeamRepository,
{
    pub fn new(invitations: I, memberships: M, teams: T) -> Self {
        Self {
            invitations,
            memberships,
            teams,
            link_base: DEFAULT_INVITATION_LINK_BASE.to_string(),
            fallback_first_name: DEFAULT_INVITEE_FIRST_NAME.to_string(),
        }
    }

    pub fn with_link_base(mut self, link_base: impl Into<String>) -> Self {
        self.link_base = link_base.into();
        self
    }

    pub fn with_fallback_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.fallback_first_name = first_name.into();
        self
    }

    /// Applies the link base and greeting fallback from `config`.
    pub fn with_config(self, config: &CoreConfig) -> Self {
        self.with_link_base(config.invitation_link_base.trim())
            .with_fallback_first_name(config.invitee_fallback_first_name.trim())
    }

    /// Creates (or reuses) a pending invitation and emails it.
    ///
    /// # Errors
    /// - `PermissionDenied` when `actor` is not an admin of `team_id`.
    /// - `Validation` when `email` is malformed.
    /// - `AlreadyMember` when a member of the team already uses `email`.
    /// - `NotFound` when the team document does not exist.
    pub fn invite(
        &self,
        actor: &Identity,
        team_id: &str,
        email: &str,
        first_name: Option<&str>,
        mailer: &dyn InvitationMailer,
    ) -> TeamResult<InviteOutcome> {
        require_admin(&self.memberships, actor, team_id, "invite members")?;
        validate_email(email)?;
        if self.memberships.find_by_email(team_id, email)?.is_some() {
            info!("event=invitation_create module=invitation status=rejected reason=already_member");
            return Err(TeamError::AlreadyMember {
                email: normalize_email(email),
                team_id: team_id.to_string(),
            });
        }
        let team = self
            .teams
            .get_team(team_id)?
            .ok_or_else(|| TeamError::not_found("team", team_id))?;

        let (invitation, created) = match self.invitations.find_pending(team_id, email)? {
            Some(existing) => (existing, false),
            None => {
                let invitation =
                    Invitation::new(email, team_id, team.name, Some(actor.user_id.clone()));
                self.invitations.create_invitation(&invitation)?;
                (invitation, true)
            }
        };
        info!(
            "event=invitation_create module=invitation status=ok created={created} to={}",
            mask_email(&invitation.email)
        );

        let email_sent = self.deliver(&invitation, first_name, mailer);
        Ok(InviteOutcome {
            invitation,
            created,
            email_sent,
        })
    }

    /// Re-sends the email for an existing pending invitation.
    pub fn resend(
        &self,
        actor: &Identity,
        invitation_id: &str,
        first_name: Option<&str>,
        mailer: &dyn InvitationMailer,
    ) -> TeamResult<InviteOutcome> {
        let invitation = self.load_invitation(invitation_id)?;
        require_admin(&self.memberships, actor, &invitation.team_id, "resend invitations")?;
        let email_sent = self.deliver(&invitation, first_name, mailer);
        Ok(InviteOutcome {
            invitation,
            created: false,
            email_sent,
        })
    }

    /// Pending invitations of a team, oldest first. Admin only.
    pub fn list_pending(&self, actor: &Identity, team_id: &str) -> TeamResult<Vec<Invitation>> {
        require_admin(&self.memberships, actor, team_id, "list invitations")?;
        Ok(self.invitations.list_pending_for_team(team_id)?)
    }

    /// Deletes a pending invitation. Admin only.
    pub fn revoke(&self, actor: &Identity, invitation_id: &str) -> TeamResult<()> {
        let invitation = self.load_invitation(invitation_id)?;
        require_admin(&self.memberships, actor, &invitation.team_id, "revoke invitations")?;
        self.invitations.delete_invitation(invitation_id)?;
        info!("event=invitation_revoke module=invitation status=ok");
        Ok(())
    }

    pub fn load_invitation(&self, invitation_id: &str) -> TeamResult<Invitation> {
        self.invitations
            .get_invitation(invitation_id)?
            .ok_or_else(|| TeamError::not_found("invitation", invitation_id))
    }

    /// Loads the invitation a reference points to and checks the reference
    /// email against it.
    pub fn open_ref(&self, reference: &InvitationRef) -> TeamResult<Invitation> {
        let invitation = self.load_invitation(&reference.id)?;
        self.validate_recipient(&invitation, &reference.email)?;
        Ok(invitation)
    }

    pub fn recipient_matches(&self, invitation: &Invitation, claimed_email: &str) -> bool {
        invitation.is_addressed_to(claimed_email)
    }

    /// Case-insensitive recipient check reporting both addresses on mismatch.
    pub fn validate_recipient(&self, invitation: &Invitation, claimed_email: &str) -> TeamResult<()> {
        if invitation.is_addressed_to(claimed_email) {
            return Ok(());
        }
        Err(TeamError::WrongRecipient {
            required: invitation.email.clone(),
            current: claimed_email.trim().to_string(),
        })
    }

    /// Accepts `invitation` for `identity`.
    ///
    /// Without an identity the reference is stashed in the pending slot and
    /// `AuthenticationRequired` is returned, whatever the invitation state.
    pub fn accept(
        &self,
        invitation: &Invitation,
        identity: Option<&Identity>,
    ) -> TeamResult<AcceptOutcome> {
        let Some(identity) = identity else {
            return self.defer_until_signed_in(&invitation.to_ref());
        };
        identity.validate()?;
        self.validate_recipient(invitation, &identity.email)?;
        self.consume(invitation, identity)
    }

    /// Accepts from a carrier reference (deep link or pending slot).
    pub fn accept_ref(
        &self,
        reference: &InvitationRef,
        identity: Option<&Identity>,
    ) -> TeamResult<AcceptOutcome> {
        let Some(identity) = identity else {
            return self.defer_until_signed_in(reference);
        };
        identity.validate()?;
        let invitation = self.open_ref(reference)?;
        self.validate_recipient(&invitation, &identity.email)?;
        self.consume(&invitation, identity)
    }

    /// Consumes the pending slot after sign-in, if it holds a reference.
    pub fn resume_pending(&self, identity: &Identity) -> TeamResult<Option<AcceptOutcome>> {
        let Some(reference) = self.invitations.take_pending()? else {
            return Ok(None);
        };
        info!("event=invitation_resume module=invitation status=start");
        self.accept_ref(&reference, Some(identity)).map(Some)
    }

    /// Reference currently waiting for sign-in, if any.
    pub fn pending_reference(&self) -> TeamResult<Option<InvitationRef>> {
        Ok(self.invitations.peek_pending()?)
    }

    /// Always fails with `AuthenticationRequired`; a failed stash is only logged.
    fn defer_until_signed_in(&self, reference: &InvitationRef) -> TeamResult<AcceptOutcome> {
        match self.invitations.stash_pending(reference) {
            Ok(()) => {
                info!("event=invitation_accept module=invitation status=deferred reason=signed_out")
            }
            Err(err) => warn!(
                "event=invitation_accept module=invitation status=deferred reason=signed_out stash=failed error={err}"
            ),
        }
        Err(TeamError::AuthenticationRequired)
    }

    fn consume(&self, invitation: &Invitation, identity: &Identity) -> TeamResult<AcceptOutcome> {
        let stored = match self.invitations.get_invitation(&invitation.id)? {
            Some(stored) if stored.is_pending() => stored,
            Some(_) => {
                warn!("event=invitation_accept module=invitation status=skipped reason=not_pending");
                return self.already_consumed(invitation, identity);
            }
            None => return self.already_consumed(invitation, identity),
        };
        self.validate_recipient(&stored, &identity.email)?;

        let candidate = Membership::new(
            stored.team_id.clone(),
            identity.user_id.clone(),
            Role::Member,
        )
        .with_email(&identity.email);
        let inserted = self.memberships.insert_membership_if_absent(&candidate)?;
        let membership = if inserted {
            candidate
        } else {
            self.memberships
                .get_membership(&stored.team_id, &identity.user_id)?
                .ok_or_else(|| TeamError::not_found("membership", candidate.id()))?
        };
        let invitation_deleted = self.invitations.delete_invitation(&stored.id)?;

        info!(
            "event=invitation_accept module=invitation status=ok already_member={} role={}",
            !inserted, membership.role
        );
        Ok(AcceptOutcome {
            membership,
            already_member: !inserted,
            invitation_deleted,
        })
    }

    /// The record is gone or no longer pending: a no-op success only if an
    /// earlier run left the membership behind, otherwise `NotFound`.
    fn already_consumed(
        &self,
        invitation: &Invitation,
        identity: &Identity,
    ) -> TeamResult<AcceptOutcome> {
        match self
            .memberships
            .get_membership(&invitation.team_id, &identity.user_id)?
        {
            Some(membership) => {
                info!("event=invitation_accept module=invitation status=noop reason=already_consumed");
                Ok(AcceptOutcome {
                    membership,
                    already_member: true,
                    invitation_deleted: false,
                })
            }
            None => Err(TeamError::not_found("invitation", invitation.id.clone())),
        }
    }

    fn deliver(
        &self,
        invitation: &Invitation,
        first_name: Option<&str>,
        mailer: &dyn InvitationMailer,
    ) -> bool {
        let recipient_first_name = first_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.fallback_first_name.as_str())
            .to_string();
        let email = InvitationEmail {
            to_email: invitation.email.clone(),
            recipient_first_name,
            team_name: invitation.team_name.clone(),
            invitation_id: invitation.id.clone(),
            link: invitation.to_ref().to_link(&self.link_base),
        };

        match mailer.send_invitation_email(&email) {
            Ok(()) => {
                info!("event=invitation_email module=invitation status=ok");
                true
            }
            Err(err) => {
                warn!("event=invitation_email module=invitation status=error retryable=true error={err}");
                false
            }
        }
    }
}
