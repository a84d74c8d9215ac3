//! Team administration use-cases.
//!
//! # Responsibility
//! - Create teams with a canonical pack and an admin creator.
//! - Role-gated member management: role changes and removals.
//!
//! # Invariants
//! - Teams are never hard-deleted.
//! - Concurrent admin edits are last-write-wins; there is no version check.

use crate::feature::gate::Pack;
use crate::model::identity::Identity;
use crate::model::membership::{Membership, Role};
use crate::model::team::Team;
use crate::repo::membership_repo::MembershipRepository;
use crate::repo::team_repo::TeamRepository;
use crate::service::error::{TeamError, TeamResult};
use log::info;

/// Returns the actor's membership when it carries the admin role.
pub(crate) fn require_admin<M: MembershipRepository>(
    memberships: &M,
    actor: &Identity,
    team_id: &str,
    action: &'static str,
) -> TeamResult<Membership> {
    match memberships.get_membership(team_id, &actor.user_id)? {
        Some(membership) if membership.role.can_manage_members() => Ok(membership),
        _ => Err(TeamError::PermissionDenied {
            user_id: actor.user_id.clone(),
            team_id: team_id.to_string(),
            action,
        }),
    }
}

pub struct TeamService<M: MembershipRepository, T: TeamRepository> {
    memberships: M,
    teams: T,
}

impl<M: MembershipRepository, T: TeamRepository> TeamService<M, T> {
    pub fn new(memberships: M, teams: T) -> Self {
        Self { memberships, teams }
    }

    /// Creates a team and makes `creator` its admin.
    pub fn create_team(&self, creator: &Identity, name: &str, pack: Pack) -> TeamResult<Team> {
        creator.validate()?;
        let team = Team::new(name, pack, creator.user_id.clone());
        self.teams.create_team(&team)?;
        self.memberships.upsert_membership(&Membership::new(
            team.id.clone(),
            creator.user_id.clone(),
            Role::Admin,
        )
        .with_email(&creator.email))?;
        info!(
            "event=team_create module=team status=ok pack={}",
            team.pack
        );
        Ok(team)
    }

    pub fn get_team(&self, team_id: &str) -> TeamResult<Team> {
        self.teams
            .get_team(team_id)?
            .ok_or_else(|| TeamError::not_found("team", team_id))
    }

    /// Teams of `identity` in membership order; dangling memberships are skipped.
    pub fn teams_for(&self, identity: &Identity) -> TeamResult<Vec<Team>> {
        let mut teams = Vec::new();
        for membership in self.memberships.list_for_user(&identity.user_id)? {
            if let Some(team) = self.teams.get_team(&membership.team_id)? {
                teams.push(team);
            }
        }
        Ok(teams)
    }

    /// Members of a team; the actor must belong to it.
    pub fn list_members(&self, actor: &Identity, team_id: &str) -> TeamResult<Vec<Membership>> {
        self.require_member(actor, team_id)?;
        Ok(self.memberships.list_for_team(team_id)?)
    }

    pub fn rename_team(&self, actor: &Identity, team_id: &str, name: &str) -> TeamResult<()> {
        require_admin(&self.memberships, actor, team_id, "rename the team")?;
        if !self.teams.rename_team(team_id, name)? {
            return Err(TeamError::not_found("team", team_id));
        }
        Ok(())
    }

    /// Changes a member's role. Admin only.
    pub fn set_role(
        &self,
        actor: &Identity,
        team_id: &str,
        user_id: &str,
        role: Role,
    ) -> TeamResult<()> {
        require_admin(&self.memberships, actor, team_id, "change roles")?;
        if !self.memberships.update_role(team_id, user_id, role)? {
            return Err(TeamError::not_a_member(user_id, team_id));
        }
        info!("event=member_role_set module=team status=ok role={role}");
        Ok(())
    }

    /// Flips `admin` <-> `member` and returns the new role. Admin only.
    pub fn toggle_role(&self, actor: &Identity, team_id: &str, user_id: &str) -> TeamResult<Role> {
        require_admin(&self.memberships, actor, team_id, "change roles")?;
        let current = self
            .memberships
            .get_membership(team_id, user_id)?
            .ok_or_else(|| TeamError::not_a_member(user_id, team_id))?;
        let next = match current.role {
            Role::Admin => Role::Member,
            Role::Member => Role::Admin,
        };
        self.set_role(actor, team_id, user_id, next)?;
        Ok(next)
    }

    /// Removes another member. Admin only.
    pub fn remove_member(&self, actor: &Identity, team_id: &str, user_id: &str) -> TeamResult<()> {
        require_admin(&self.memberships, actor, team_id, "remove members")?;
        if !self.memberships.delete_membership(team_id, user_id)? {
            return Err(TeamError::not_a_member(user_id, team_id));
        }
        info!("event=member_remove module=team status=ok");
        Ok(())
    }

    /// Self-service removal of the identity's own membership.
    pub fn leave_team(&self, identity: &Identity, team_id: &str) -> TeamResult<()> {
        if !self
            .memberships
            .delete_membership(team_id, &identity.user_id)?
        {
            return Err(TeamError::not_a_member(&identity.user_id, team_id));
        }
        info!("event=member_leave module=team status=ok");
        Ok(())
    }

    fn require_member(&self, actor: &Identity, team_id: &str) -> TeamResult<Membership> {
        self.memberships
            .get_membership(team_id, &actor.user_id)?
            .ok_or_else(|| TeamError::not_a_member(&actor.user_id, team_id))
    }
}
