//! Team repository contract and SQLite implementation.
//!
//! Teams are never hard-deleted; there is intentionally no delete path.

use crate::model::team::{stored_pack_or_default, Team};
use crate::repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension, Row};

const TEAM_SELECT_SQL: &str = "SELECT id, name, pack, created_by, created_at FROM teams";

pub trait TeamRepository {
    fn create_team(&self, team: &Team) -> RepoResult<()>;
    /// Inserts the team unless one with the same id exists; returns whether it wrote.
    fn create_team_if_absent(&self, team: &Team) -> RepoResult<bool>;
    fn get_team(&self, team_id: &str) -> RepoResult<Option<Team>>;
    fn rename_team(&self, team_id: &str, name: &str) -> RepoResult<bool>;
}

pub struct SqliteTeamRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTeamRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TeamRepository for SqliteTeamRepository<'_> {
    fn create_team(&self, team: &Team) -> RepoResult<()> {
        team.validate()?;
        self.conn.execute(
            "INSERT INTO teams (id, name, pack, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                team.id,
                team.name,
                team.pack,
                team.created_by,
                team.created_at_ms
            ],
        )?;
        Ok(())
    }

    fn create_team_if_absent(&self, team: &Team) -> RepoResult<bool> {
        team.validate()?;
        let changed = self.conn.execute(
            "INSERT INTO teams (id, name, pack, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id) DO NOTHING;",
            params![
                team.id,
                team.name,
                team.pack,
                team.created_by,
                team.created_at_ms
            ],
        )?;
        Ok(changed > 0)
    }

    fn get_team(&self, team_id: &str) -> RepoResult<Option<Team>> {
        let team = self
            .conn
            .query_row(
                &format!("{TEAM_SELECT_SQL} WHERE id = ?1;"),
                [team_id],
                parse_team_row,
            )
            .optional()?;
        Ok(team)
    }

    fn rename_team(&self, team_id: &str, name: &str) -> RepoResult<bool> {
        crate::model::require_non_empty("name", name)?;
        let changed = self.conn.execute(
            "UPDATE teams SET name = ?1 WHERE id = ?2;",
            params![name.trim(), team_id],
        )?;
        Ok(changed > 0)
    }
}

fn parse_team_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get("id")?,
        name: row.get("name")?,
        pack: stored_pack_or_default(row.get("pack")?),
        created_by: row.get("created_by")?,
        created_at_ms: row.get("created_at")?,
    })
}
