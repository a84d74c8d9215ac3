//! Invitation repository and the local pending-invitation slot.
//!
//! # Invariants
//! - Stored emails are normalized; lookups normalize their input the same way.
//! - The pending slot holds at most one reference; stashing replaces it.

use crate::model::invitation::{normalize_email, Invitation, InvitationRef, InvitationStatus};
use crate::model::now_epoch_ms;
use crate::repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const INVITATION_SELECT_SQL: &str = "SELECT
    id,
    email,
    team_id,
    team_name,
    status,
    invited_by,
    created_at
FROM invitations";

pub trait InvitationRepository {
    fn create_invitation(&self, invitation: &Invitation) -> RepoResult<()>;
    fn get_invitation(&self, invitation_id: &str) -> RepoResult<Option<Invitation>>;
    /// Oldest pending invitation for `(team_id, email)`.
    fn find_pending(&self, team_id: &str, email: &str) -> RepoResult<Option<Invitation>>;
    fn list_pending_for_team(&self, team_id: &str) -> RepoResult<Vec<Invitation>>;
    /// Returns whether a record was removed; deleting a missing id is not an error.
    fn delete_invitation(&self, invitation_id: &str) -> RepoResult<bool>;
}

/// Local carrier for an invitation reference across sign-in/registration.
pub trait PendingInvitationStore {
    fn stash_pending(&self, reference: &InvitationRef) -> RepoResult<()>;
    fn peek_pending(&self) -> RepoResult<Option<InvitationRef>>;
    /// Reads and clears the slot.
    fn take_pending(&self) -> RepoResult<Option<InvitationRef>>;
}

pub struct SqliteInvitationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteInvitationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl InvitationRepository for SqliteInvitationRepository<'_> {
    fn create_invitation(&self, invitation: &Invitation) -> RepoResult<()> {
        invitation.validate()?;
        self.conn.execute(
            "INSERT INTO invitations (
                id,
                email,
                team_id,
                team_name,
                status,
                invited_by,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                invitation.id,
                normalize_email(&invitation.email),
                invitation.team_id,
                invitation.team_name,
                invitation.status.as_str(),
                invitation.invited_by,
                invitation.created_at_ms,
            ],
        )?;
        Ok(())
    }

    fn get_invitation(&self, invitation_id: &str) -> RepoResult<Option<Invitation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{INVITATION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([invitation_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_invitation_row(row)?));
        }
        Ok(None)
    }

    fn find_pending(&self, team_id: &str, email: &str) -> RepoResult<Option<Invitation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{INVITATION_SELECT_SQL}
             WHERE team_id = ?1 AND email = ?2 AND status = 'pending'
             ORDER BY created_at ASC, id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![team_id, normalize_email(email)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_invitation_row(row)?));
        }
        Ok(None)
    }

    fn list_pending_for_team(&self, team_id: &str) -> RepoResult<Vec<Invitation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{INVITATION_SELECT_SQL}
             WHERE team_id = ?1 AND status = 'pending'
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([team_id])?;
        let mut invitations = Vec::new();
        while let Some(row) = rows.next()? {
            invitations.push(parse_invitation_row(row)?);
        }
        Ok(invitations)
    }

    fn delete_invitation(&self, invitation_id: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM invitations WHERE id = ?1;", [invitation_id])?;
        Ok(changed > 0)
    }
}

impl PendingInvitationStore for SqliteInvitationRepository<'_> {
    fn stash_pending(&self, reference: &InvitationRef) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO pending_invitation (slot, invitation_id, email, stored_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT (slot) DO UPDATE SET
                invitation_id = excluded.invitation_id,
                email = excluded.email,
                stored_at = excluded.stored_at;",
            params![reference.id, reference.email.trim(), now_epoch_ms()],
        )?;
        Ok(())
    }

    fn peek_pending(&self) -> RepoResult<Option<InvitationRef>> {
        let reference = self
            .conn
            .query_row(
                "SELECT invitation_id, email FROM pending_invitation WHERE slot = 1;",
                [],
                |row| {
                    Ok(InvitationRef {
                        id: row.get(0)?,
                        email: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(reference)
    }

    fn take_pending(&self) -> RepoResult<Option<InvitationRef>> {
        let reference = self.peek_pending()?;
        if reference.is_some() {
            self.conn
                .execute("DELETE FROM pending_invitation WHERE slot = 1;", [])?;
        }
        Ok(reference)
    }
}

fn parse_invitation_row(row: &Row<'_>) -> RepoResult<Invitation> {
    let status_text: String = row.get("status")?;
    let status = InvitationStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in invitations.status"
        ))
    })?;

    Ok(Invitation {
        id: row.get("id")?,
        email: row.get("email")?,
        team_id: row.get("team_id")?,
        team_name: row.get("team_name")?,
        status,
        invited_by: row.get("invited_by")?,
        created_at_ms: row.get("created_at")?,
    })
}
