//! One-time import of superseded membership shapes.
//!
//! # Responsibility
//! - Read team documents with an embedded `members` array, `userTeams`
//!   relation records, and user documents carrying a scalar `teamId`, a
//!   `teams` array and a `currentTeam` selection.
//! - Write them as canonical teams, memberships and active-team choices.
//!
//! # Invariants
//! - Import never overwrites an existing canonical membership, team or
//!   active-team choice.
//! - Re-running the same import is a no-op.
//! - References to teams that exist neither in the export nor in the store
//!   are skipped, not imported as dangling memberships.

use crate::feature::gate::Pack;
use crate::model::membership::{Membership, Role};
use crate::model::{now_epoch_ms, UserId};
use crate::model::team::{stored_pack_or_default, Team};
use crate::repo::membership_repo::MembershipRepository;
use crate::repo::team_repo::TeamRepository;
use crate::service::error::TeamError;
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

const UNKNOWN_CREATOR: &str = "unknown";

/// Export envelope `{ "teams": [...], "userTeams": [...], "users": [...] }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyExport {
    #[serde(default)]
    pub teams: Vec<LegacyTeamDoc>,
    #[serde(default)]
    pub user_teams: Vec<LegacyUserTeamDoc>,
    #[serde(default)]
    pub users: Vec<LegacyUserDoc>,
}

/// Team document from the embedded-members era.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTeamDoc {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "templateType")]
    pub pack: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    /// Epoch millis, or anything else the old clients wrote.
    #[serde(default)]
    pub created_at: Option<Value>,
}

/// `userTeams` relation record, stored under the id `"{userId}_{teamId}"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUserTeamDoc {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub joined_at: Option<Value>,
    /// Only `"active"` (or no status at all) becomes a membership.
    #[serde(default)]
    pub status: Option<String>,
}

/// User document from the per-user `teamId` / `teams` era.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUserDoc {
    #[serde(alias = "uid")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub current_team: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub teams_created: usize,
    pub teams_existing: usize,
    pub memberships_created: usize,
    pub memberships_existing: usize,
    pub active_teams_seeded: usize,
    pub skipped_invalid: usize,
    pub skipped_dangling: usize,
}

#[derive(Debug)]
pub enum ImportError {
    Parse(serde_json::Error),
    Team(TeamError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "legacy export is not valid JSON: {err}"),
            Self::Team(err) => write!(f, "legacy import failed: {err}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Team(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<TeamError> for ImportError {
    fn from(value: TeamError) -> Self {
        Self::Team(value)
    }
}

pub struct LegacyImporter<M: MembershipRepository, T: TeamRepository> {
    memberships: M,
    teams: T,
}

impl<M: MembershipRepository, T: TeamRepository> LegacyImporter<M, T> {
    pub fn new(memberships: M, teams: T) -> Self {
        Self { memberships, teams }
    }

    pub fn import_json(&self, json: &str) -> Result<ImportReport, ImportError> {
        let export: LegacyExport = serde_json::from_str(json)?;
        Ok(self.import(&export)?)
    }

    /// Imports teams first, then `userTeams` records, then user documents,
    /// and finally seeds each user's `currentTeam` selection.
    pub fn import(&self, export: &LegacyExport) -> Result<ImportReport, TeamError> {
        let mut report = ImportReport::default();
        let emails = user_emails(&export.users);

        for doc in &export.teams {
            self.import_team(doc, &emails, &mut report)?;
        }
        for doc in &export.user_teams {
            self.import_user_team(doc, &emails, &mut report)?;
        }
        for doc in &export.users {
            self.import_user(doc, &emails, &mut report)?;
        }
        for doc in &export.users {
            self.seed_active_team(doc, &mut report)?;
        }

        info!(
            "event=legacy_import module=import status=ok teams_created={} memberships_created={} active_teams_seeded={} skipped_invalid={} skipped_dangling={}",
            report.teams_created,
            report.memberships_created,
            report.active_teams_seeded,
            report.skipped_invalid,
            report.skipped_dangling
        );
        Ok(report)
    }

    fn import_team(
        &self,
        doc: &LegacyTeamDoc,
        emails: &BTreeMap<UserId, String>,
        report: &mut ImportReport,
    ) -> Result<(), TeamError> {
        let team_id = doc.id.trim();
        if team_id.is_empty() {
            report.skipped_invalid += 1;
            return Ok(());
        }

        let members: BTreeSet<&str> = doc
            .members
            .iter()
            .map(|member| member.trim())
            .filter(|member| !member.is_empty())
            .collect();
        let created_by = doc
            .created_by
            .as_deref()
            .map(str::trim)
            .filter(|creator| !creator.is_empty())
            .or_else(|| members.iter().next().copied())
            .unwrap_or(UNKNOWN_CREATOR);

        let team = Team {
            id: team_id.to_string(),
            name: doc
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(team_id)
                .to_string(),
            pack: legacy_pack_key(doc.pack.as_deref()),
            created_by: created_by.to_string(),
            created_at_ms: doc
                .created_at
                .as_ref()
                .and_then(Value::as_i64)
                .unwrap_or_else(now_epoch_ms),
        };
        if self.teams.create_team_if_absent(&team)? {
            report.teams_created += 1;
        } else {
            report.teams_existing += 1;
        }

        for member in members {
            let role = if member == created_by {
                Role::Admin
            } else {
                Role::Member
            };
            self.import_membership(Membership::new(team_id, member, role), emails, report)?;
        }
        Ok(())
    }

    fn import_user_team(
        &self,
        doc: &LegacyUserTeamDoc,
        emails: &BTreeMap<UserId, String>,
        report: &mut ImportReport,
    ) -> Result<(), TeamError> {
        let (user_id, team_id) = (doc.user_id.trim(), doc.team_id.trim());
        if user_id.is_empty() || team_id.is_empty() {
            report.skipped_invalid += 1;
            return Ok(());
        }
        if doc
            .status
            .as_deref()
            .is_some_and(|status| status.trim() != "active")
        {
            return Ok(());
        }
        if !self.team_exists(team_id, report)? {
            return Ok(());
        }

        let role = parse_role(doc.role.as_deref());
        let mut membership = Membership::new(team_id, user_id, role);
        if let Some(joined_at_ms) = doc.joined_at.as_ref().and_then(Value::as_i64) {
            membership.joined_at_ms = joined_at_ms;
        }
        self.import_membership(membership, emails, report)
    }

    fn import_user(
        &self,
        doc: &LegacyUserDoc,
        emails: &BTreeMap<UserId, String>,
        report: &mut ImportReport,
    ) -> Result<(), TeamError> {
        let team_ids: BTreeSet<&str> = doc
            .team_id
            .iter()
            .chain(doc.teams.iter())
            .map(|team_id| team_id.trim())
            .filter(|team_id| !team_id.is_empty())
            .collect();
        if team_ids.is_empty() {
            return Ok(());
        }
        let user_id = doc.id.trim();
        if user_id.is_empty() {
            report.skipped_invalid += 1;
            return Ok(());
        }

        let role = parse_role(doc.role.as_deref());
        for team_id in team_ids {
            if self.team_exists(team_id, report)? {
                self.import_membership(Membership::new(team_id, user_id, role), emails, report)?;
            }
        }
        Ok(())
    }

    /// Seeds `currentTeam` only when the membership exists and the user has
    /// no stored choice yet.
    fn seed_active_team(
        &self,
        doc: &LegacyUserDoc,
        report: &mut ImportReport,
    ) -> Result<(), TeamError> {
        let user_id = doc.id.trim();
        let Some(team_id) = doc
            .current_team
            .as_deref()
            .map(str::trim)
            .filter(|team_id| !team_id.is_empty())
        else {
            return Ok(());
        };
        if user_id.is_empty() || self.memberships.get_active_team(user_id)?.is_some() {
            return Ok(());
        }
        if self.memberships.get_membership(team_id, user_id)?.is_none() {
            warn!("event=legacy_import module=import status=skipped reason=current_team_not_member");
            return Ok(());
        }
        self.memberships.set_active_team(user_id, team_id)?;
        report.active_teams_seeded += 1;
        Ok(())
    }

    fn team_exists(&self, team_id: &str, report: &mut ImportReport) -> Result<bool, TeamError> {
        if self.teams.get_team(team_id)?.is_some() {
            return Ok(true);
        }
        warn!("event=legacy_import module=import status=skipped reason=unknown_team");
        report.skipped_dangling += 1;
        Ok(false)
    }

    fn import_membership(
        &self,
        membership: Membership,
        emails: &BTreeMap<UserId, String>,
        report: &mut ImportReport,
    ) -> Result<(), TeamError> {
        let membership = match emails.get(membership.user_id.as_str()) {
            Some(email) => membership.with_email(email),
            None => membership,
        };
        if self.memberships.insert_membership_if_absent(&membership)? {
            report.memberships_created += 1;
        } else {
            report.memberships_existing += 1;
        }
        Ok(())
    }
}

fn parse_role(value: Option<&str>) -> Role {
    value.and_then(Role::parse).unwrap_or(Role::Member)
}

fn user_emails(users: &[LegacyUserDoc]) -> BTreeMap<UserId, String> {
    users
        .iter()
        .filter_map(|doc| {
            let email = doc.email.as_deref()?.trim();
            let user_id = doc.id.trim();
            (!email.is_empty() && !user_id.is_empty())
                .then(|| (user_id.to_string(), email.to_string()))
        })
        .collect()
}

/// Canonical key for known packs; unknown values are kept verbatim.
fn legacy_pack_key(value: Option<&str>) -> String {
    match value.and_then(Pack::parse) {
        Some(pack) => pack.as_str().to_string(),
        None => stored_pack_or_default(value.map(str::to_string)),
    }
}
