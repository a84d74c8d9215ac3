//! Membership resolver: live `(active team, role, team)` view per identity.
//!
//! # Responsibility
//! - Subscribe to one user's membership records and derive the active team.
//! - Fetch the active team document and expose its gated modules.
//! - Validate caller-driven active team switches.
//!
//! # Invariants
//! - A previously selected active team is kept while its membership exists.
//! - Otherwise the active team is the membership with the smallest
//!   `(joined_at, team_id)`; result order from storage is never trusted.
//! - A missing team document yields `team: None` with membership and role
//!   still reported.
//! - A storage or feed failure ends the stream with `MembershipUnavailable`,
//!   which is distinct from an empty (no team yet) view. No automatic retry.

use crate::feature::gate::{self, ModuleId};
use crate::feed::{FeedPoll, FeedSubscription, FeedTopic};
use crate::model::identity::Identity;
use crate::model::membership::{Membership, Role};
use crate::model::team::Team;
use crate::model::{TeamId, UserId};
use crate::repo::membership_repo::MembershipRepository;
use crate::repo::team_repo::TeamRepository;
use crate::repo::RepoError;
use crate::service::error::{TeamError, TeamResult};
use log::{error, info, warn};

/// Resolved membership state for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MembershipView {
    pub user_id: Option<UserId>,
    pub active_team_id: Option<TeamId>,
    /// Membership for the active team.
    pub membership: Option<Membership>,
    pub role: Option<Role>,
    /// Active team document; `None` when signed out, teamless or dangling.
    pub team: Option<Team>,
    /// Every membership of the user, ordered by `(joined_at, team_id)`.
    pub memberships: Vec<Membership>,
    pub loading: bool,
}

impl MembershipView {
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Placeholder shown before the first resolution completes.
    pub fn loading(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            loading: true,
            ..Self::default()
        }
    }

    pub fn has_membership(&self) -> bool {
        self.membership.is_some()
    }

    /// Membership exists but its team document does not.
    pub fn is_dangling(&self) -> bool {
        self.membership.is_some() && self.team.is_none()
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_some_and(Role::can_manage_members)
    }

    /// Modules to mount; empty when there is no resolvable team.
    pub fn enabled_modules(&self) -> &'static [ModuleId] {
        match &self.team {
            Some(team) => gate::enabled_modules(&team.pack),
            None => &[],
        }
    }

    pub fn is_module_enabled(&self, module: ModuleId) -> bool {
        self.enabled_modules().contains(&module)
    }
}

/// One update from a [`MembershipStream`].
pub type MembershipUpdate = TeamResult<MembershipView>;

/// Resolver service over membership and team repositories.
///
/// An explicit active team choice is stored through the membership
/// repository, so it survives re-subscription and new resolver instances.
pub struct MembershipResolver<M: MembershipRepository, T: TeamRepository> {
    memberships: M,
    teams: T,
}

impl<M: MembershipRepository, T: TeamRepository> MembershipResolver<M, T> {
    pub fn new(memberships: M, teams: T) -> Self {
        Self { memberships, teams }
    }

    /// Starts a live resolution for `identity`.
    ///
    /// With no identity the stream yields one signed-out view and ends.
    pub fn resolve(&self, identity: Option<&Identity>) -> MembershipStream<'_, M, T> {
        match identity {
            Some(identity) => self.resolve_user(&identity.user_id),
            None => MembershipStream::signed_out(self),
        }
    }

    /// Starts a live resolution for a raw user id; blank ids count as signed out.
    pub fn resolve_user(&self, user_id: &str) -> MembershipStream<'_, M, T> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return MembershipStream::signed_out(self);
        }

        // Subscribe before the first read so no write slips between them.
        let subscription = self
            .memberships
            .change_feed()
            .subscribe(FeedTopic::UserMemberships(user_id.to_string()));
        info!("event=membership_resolve module=resolver status=start");

        MembershipStream {
            resolver: self,
            user_id: Some(user_id.to_string()),
            subscription: Some(subscription),
            initial_pending: true,
            latest: None,
        }
    }

    /// One-shot fetch for immediate decisions, such as redirecting right
    /// after an invitation was accepted. Not a substitute for a stream.
    pub fn snapshot(&self, user_id: &str) -> MembershipUpdate {
        self.compute_view(user_id)
    }

    /// Switches the active team after checking that a membership exists.
    ///
    /// Live streams of the user are notified and re-resolve.
    pub fn set_active_team(&self, user_id: &str, team_id: &str) -> TeamResult<()> {
        if self
            .memberships
            .get_membership(team_id, user_id)?
            .is_none()
        {
            warn!("event=active_team_set module=resolver status=rejected reason=not_a_member");
            return Err(TeamError::not_a_member(user_id, team_id));
        }

        self.memberships.set_active_team(user_id, team_id)?;
        self.memberships
            .change_feed()
            .publish(&FeedTopic::UserMemberships(user_id.to_string()));
        info!("event=active_team_set module=resolver status=ok");
        Ok(())
    }

    /// Explicitly selected team, if any. `None` means the default rule applies.
    pub fn active_team_id(&self, user_id: &str) -> TeamResult<Option<TeamId>> {
        Ok(self.memberships.get_active_team(user_id)?)
    }

    /// Forgets the explicit selection; live streams fall back to the default.
    pub fn clear_active_team(&self, user_id: &str) -> TeamResult<()> {
        if self.memberships.clear_active_team(user_id)? {
            self.memberships
                .change_feed()
                .publish(&FeedTopic::UserMemberships(user_id.to_string()));
        }
        Ok(())
    }

    fn compute_view(&self, user_id: &str) -> MembershipUpdate {
        let memberships = self
            .memberships
            .list_for_user(user_id)
            .map_err(unavailable)?;

        let preferred = self
            .memberships
            .get_active_team(user_id)
            .map_err(unavailable)?;
        let Some(selected) = self.select_active(user_id, preferred, &memberships) else {
            info!("event=membership_resolve module=resolver status=ok memberships=0");
            return Ok(MembershipView {
                user_id: Some(user_id.to_string()),
                ..MembershipView::default()
            });
        };

        let team = self
            .teams
            .get_team(&selected.team_id)
            .map_err(unavailable)?;
        if team.is_none() {
            warn!(
                "event=membership_resolve module=resolver status=degraded reason=dangling_membership"
            );
        }

        info!(
            "event=membership_resolve module=resolver status=ok memberships={} role={}",
            memberships.len(),
            selected.role
        );
        Ok(MembershipView {
            user_id: Some(user_id.to_string()),
            active_team_id: Some(selected.team_id.clone()),
            role: Some(selected.role),
            membership: Some(selected),
            team,
            memberships,
            loading: false,
        })
    }

    fn select_active(
        &self,
        user_id: &str,
        preferred: Option<TeamId>,
        memberships: &[Membership],
    ) -> Option<Membership> {
        if let Some(team_id) = preferred {
            if let Some(kept) = memberships
                .iter()
                .find(|membership| membership.team_id == team_id)
            {
                return Some(kept.clone());
            }
            // Stale choice; clearing it is best-effort.
            if let Err(err) = self.memberships.clear_active_team(user_id) {
                warn!("event=active_team_clear module=resolver status=error error={err}");
            }
        }
        memberships
            .iter()
            .min_by(|a, b| (a.joined_at_ms, &a.team_id).cmp(&(b.joined_at_ms, &b.team_id)))
            .cloned()
    }
}

fn unavailable(err: RepoError) -> TeamError {
    error!("event=membership_resolve module=resolver status=error error={err}");
    TeamError::MembershipUnavailable(err.to_string())
}

/// Live membership resolution for one identity.
///
/// Poll from the UI event loop; dropping or closing the stream releases the
/// underlying subscription.
pub struct MembershipStream<'r, M: MembershipRepository, T: TeamRepository> {
    resolver: &'r MembershipResolver<M, T>,
    user_id: Option<UserId>,
    subscription: Option<FeedSubscription>,
    initial_pending: bool,
    latest: Option<MembershipView>,
}

impl<'r, M: MembershipRepository, T: TeamRepository> MembershipStream<'r, M, T> {
    fn signed_out(resolver: &'r MembershipResolver<M, T>) -> Self {
        Self {
            resolver,
            user_id: None,
            subscription: None,
            initial_pending: true,
            latest: None,
        }
    }

    /// Returns the next update without blocking.
    ///
    /// The first call always yields the initial resolution. Later calls yield
    /// `None` when nothing changed. After an error the stream is finished.
    pub fn poll(&mut self) -> Option<MembershipUpdate> {
        if self.initial_pending {
            self.initial_pending = false;
            return Some(self.emit());
        }

        let subscription = self.subscription.as_mut()?;
        match subscription.poll() {
            FeedPoll::Idle => None,
            FeedPoll::Changed => Some(self.emit()),
            FeedPoll::Failed(reason) => {
                self.subscription = None;
                error!("event=membership_stream module=resolver status=error reason=feed_failed");
                Some(Err(TeamError::MembershipUnavailable(reason)))
            }
            FeedPoll::Closed => {
                self.subscription = None;
                None
            }
        }
    }

    /// Latest successfully resolved view, or a loading placeholder.
    pub fn current(&self) -> MembershipView {
        match (&self.latest, &self.user_id) {
            (Some(view), _) => view.clone(),
            (None, Some(user_id)) => MembershipView::loading(user_id.clone()),
            (None, None) => MembershipView::signed_out(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Whether no further updates can arrive.
    pub fn is_finished(&self) -> bool {
        !self.initial_pending && self.subscription.is_none()
    }

    /// Releases the subscription; subsequent polls return `None`.
    pub fn close(&mut self) {
        self.initial_pending = false;
        self.subscription = None;
    }

    fn emit(&mut self) -> MembershipUpdate {
        let Some(user_id) = self.user_id.as_deref() else {
            let view = MembershipView::signed_out();
            self.latest = Some(view.clone());
            return Ok(view);
        };

        match self.resolver.compute_view(user_id) {
            Ok(view) => {
                self.latest = Some(view.clone());
                Ok(view)
            }
            Err(err) => {
                self.subscription = None;
                Err(err)
            }
        }
    }
}
