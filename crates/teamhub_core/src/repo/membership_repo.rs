//! Membership repository contract and SQLite implementation.
//!
//! # Invariants
//! - `(team_id, user_id)` is the primary key; writes are upserts or
//!   insert-if-absent, never blind inserts that could duplicate a pair.
//! - Every committed write publishes both the user and the team topic.
//! - User listings are ordered by `joined_at ASC, team_id ASC`.
//! - An explicit active team choice is stored per user and outlives any
//!   resolver instance; storing it does not publish on the feed.

use crate::feed::{ChangeFeed, FeedTopic};
use crate::model::invitation::normalize_email;
use crate::model::membership::{Membership, Role};
use crate::model::{now_epoch_ms, require_non_empty, TeamId};
use crate::repo::{RepoError, RepoResult};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

const MEMBERSHIP_SELECT_SQL: &str =
    "SELECT team_id, user_id, role, joined_at, email FROM memberships";

pub trait MembershipRepository {
    /// Creates or replaces the role of the `(team_id, user_id)` membership.
    ///
    /// An existing record keeps its original `joined_at`.
    fn upsert_membership(&self, membership: &Membership) -> RepoResult<()>;
    /// Inserts only when the pair is absent; returns whether a row was written.
    fn insert_membership_if_absent(&self, membership: &Membership) -> RepoResult<bool>;
    fn get_membership(&self, team_id: &str, user_id: &str) -> RepoResult<Option<Membership>>;
    /// Membership of `team_id` whose stored email matches `email`.
    fn find_by_email(&self, team_id: &str, email: &str) -> RepoResult<Option<Membership>>;
    fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Membership>>;
    fn list_for_team(&self, team_id: &str) -> RepoResult<Vec<Membership>>;
    fn update_role(&self, team_id: &str, user_id: &str, role: Role) -> RepoResult<bool>;
    fn delete_membership(&self, team_id: &str, user_id: &str) -> RepoResult<bool>;
    fn get_active_team(&self, user_id: &str) -> RepoResult<Option<TeamId>>;
    fn set_active_team(&self, user_id: &str, team_id: &str) -> RepoResult<()>;
    /// Returns whether a stored choice was removed.
    fn clear_active_team(&self, user_id: &str) -> RepoResult<bool>;
    /// Feed on which this repository announces its writes.
    fn change_feed(&self) -> &ChangeFeed;
}

pub struct SqliteMembershipRepository<'conn> {
    conn: &'conn Connection,
    feed: ChangeFeed,
}

impl<'conn> SqliteMembershipRepository<'conn> {
    pub fn new(conn: &'conn Connection, feed: ChangeFeed) -> Self {
        Self { conn, feed }
    }

    fn announce(&self, team_id: &str, user_id: &str, action: &'static str) {
        debug!("event=membership_write module=repo action={action}");
        self.feed
            .publish(&FeedTopic::UserMemberships(user_id.to_string()));
        self.feed
            .publish(&FeedTopic::TeamMembers(team_id.to_string()));
    }

    fn query_list(&self, sql: &str, key: &str) -> RepoResult<Vec<Membership>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([key])?;
        let mut memberships = Vec::new();
        while let Some(row) = rows.next()? {
            memberships.push(parse_membership_row(row)?);
        }
        Ok(memberships)
    }
}

impl MembershipRepository for SqliteMembershipRepository<'_> {
    fn upsert_membership(&self, membership: &Membership) -> RepoResult<()> {
        membership.validate()?;
        self.conn.execute(
            "INSERT INTO memberships (id, team_id, user_id, role, joined_at, email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (team_id, user_id) DO UPDATE SET
                role = excluded.role,
                email = COALESCE(excluded.email, memberships.email);",
            params![
                membership.id(),
                membership.team_id,
                membership.user_id,
                membership.role.as_str(),
                membership.joined_at_ms,
                membership.email
            ],
        )?;
        self.announce(&membership.team_id, &membership.user_id, "upsert");
        Ok(())
    }

    fn insert_membership_if_absent(&self, membership: &Membership) -> RepoResult<bool> {
        membership.validate()?;
        let changed = self.conn.execute(
            "INSERT INTO memberships (id, team_id, user_id, role, joined_at, email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (team_id, user_id) DO NOTHING;",
            params![
                membership.id(),
                membership.team_id,
                membership.user_id,
                membership.role.as_str(),
                membership.joined_at_ms,
                membership.email
            ],
        )?;
        if changed > 0 {
            self.announce(&membership.team_id, &membership.user_id, "insert");
        }
        Ok(changed > 0)
    }

    fn get_membership(&self, team_id: &str, user_id: &str) -> RepoResult<Option<Membership>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEMBERSHIP_SELECT_SQL} WHERE team_id = ?1 AND user_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![team_id, user_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_membership_row(row)?));
        }
        Ok(None)
    }

    fn find_by_email(&self, team_id: &str, email: &str) -> RepoResult<Option<Membership>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEMBERSHIP_SELECT_SQL} WHERE team_id = ?1 AND email = ?2 LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![team_id, normalize_email(email)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_membership_row(row)?));
        }
        Ok(None)
    }

    fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<Membership>> {
        self.query_list(
            &format!("{MEMBERSHIP_SELECT_SQL} WHERE user_id = ?1 ORDER BY joined_at ASC, team_id ASC;"),
            user_id,
        )
    }

    fn list_for_team(&self, team_id: &str) -> RepoResult<Vec<Membership>> {
        self.query_list(
            &format!("{MEMBERSHIP_SELECT_SQL} WHERE team_id = ?1 ORDER BY joined_at ASC, user_id ASC;"),
            team_id,
        )
    }

    fn update_role(&self, team_id: &str, user_id: &str, role: Role) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE memberships SET role = ?1 WHERE team_id = ?2 AND user_id = ?3;",
            params![role.as_str(), team_id, user_id],
        )?;
        if changed > 0 {
            self.announce(team_id, user_id, "update_role");
        }
        Ok(changed > 0)
    }

    fn delete_membership(&self, team_id: &str, user_id: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM memberships WHERE team_id = ?1 AND user_id = ?2;",
            params![team_id, user_id],
        )?;
        if changed > 0 {
            self.announce(team_id, user_id, "delete");
        }
        Ok(changed > 0)
    }

    fn get_active_team(&self, user_id: &str) -> RepoResult<Option<TeamId>> {
        let team_id = self
            .conn
            .query_row(
                "SELECT team_id FROM active_teams WHERE user_id = ?1;",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(team_id)
    }

    fn set_active_team(&self, user_id: &str, team_id: &str) -> RepoResult<()> {
        require_non_empty("user_id", user_id)?;
        require_non_empty("team_id", team_id)?;
        self.conn.execute(
            "INSERT INTO active_teams (user_id, team_id, selected_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                team_id = excluded.team_id,
                selected_at = excluded.selected_at;",
            params![user_id, team_id, now_epoch_ms()],
        )?;
        Ok(())
    }

    fn clear_active_team(&self, user_id: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM active_teams WHERE user_id = ?1;", [user_id])?;
        Ok(changed > 0)
    }

    fn change_feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

fn parse_membership_row(row: &Row<'_>) -> RepoResult<Membership> {
    let role_text: String = row.get("role")?;
    let role = Role::parse(&role_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid role `{role_text}` in memberships.role"))
    })?;

    Ok(Membership {
        team_id: row.get("team_id")?,
        user_id: row.get("user_id")?,
        role,
        joined_at_ms: row.get("joined_at")?,
        email: row.get("email")?,
    })
}
