//! Runtime configuration for embedding the team core.
//!
//! # Invariants
//! - A config that passes `validate()` can open its database and start logging
//!   without further argument checks failing.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging::{self, default_log_level, LoggingError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Deep-link base used in invitation emails.
pub const DEFAULT_INVITATION_LINK_BASE: &str = "maisonplus://invitation";
/// Greeting name used when the inviter does not know the invitee's first name.
pub const DEFAULT_INVITEE_FIRST_NAME: &str = "inconnu";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// `None` leaves logging uninitialized.
    pub log_dir: Option<PathBuf>,
    pub invitation_link_base: String,
    pub invitee_fallback_first_name: String,
}

#[derive(Debug)]
pub enum ConfigError {
    EmptyDbPath,
    InvalidLogLevel(String),
    RelativeLogDir(PathBuf),
    InvalidLinkBase(String),
    EmptyFallbackName,
    Db(DbError),
    Logging(LoggingError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDbPath => write!(f, "database path cannot be empty"),
            Self::InvalidLogLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeLogDir(path) => {
                write!(f, "log_dir must be an absolute path, got `{}`", path.display())
            }
            Self::InvalidLinkBase(base) => write!(
                f,
                "invitation link base `{base}` must be a `scheme://path` without a query"
            ),
            Self::EmptyFallbackName => write!(f, "invitee fallback first name cannot be empty"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Logging(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ConfigError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<LoggingError> for ConfigError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            invitation_link_base: DEFAULT_INVITATION_LINK_BASE.to_string(),
            invitee_fallback_first_name: DEFAULT_INVITEE_FIRST_NAME.to_string(),
        }
    }

    pub fn with_db_path(mut self, path: impl AsRef<Path>) -> Self {
        self.db_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.log_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_invitation_link_base(mut self, base: impl Into<String>) -> Self {
        self.invitation_link_base = base.into();
        self
    }

    pub fn with_invitee_fallback_first_name(mut self, name: impl Into<String>) -> Self {
        self.invitee_fallback_first_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.db_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyDbPath);
            }
        }
        if logging::normalize_level(&self.log_level).is_err() {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir.clone()));
            }
        }

        let base = self.invitation_link_base.trim();
        let has_scheme = base
            .split_once("://")
            .is_some_and(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty());
        if !has_scheme || base.contains('?') {
            return Err(ConfigError::InvalidLinkBase(
                self.invitation_link_base.clone(),
            ));
        }
        if self.invitee_fallback_first_name.trim().is_empty() {
            return Err(ConfigError::EmptyFallbackName);
        }
        Ok(())
    }

    /// Validates and opens the configured database with migrations applied.
    pub fn open_database(&self) -> Result<Connection, ConfigError> {
        self.validate()?;
        let conn = match &self.db_path {
            Some(path) => open_db(path)?,
            None => open_db_in_memory()?,
        };
        Ok(conn)
    }

    /// Starts file logging when a log directory is configured.
    ///
    /// Returns `false` when no directory is set and logging stays off.
    pub fn init_logging(&self) -> Result<bool, ConfigError> {
        self.validate()?;
        let Some(dir) = &self.log_dir else {
            return Ok(false);
        };
        logging::init_logging(&self.log_level, &dir.to_string_lossy())?;
        Ok(true)
    }
}
