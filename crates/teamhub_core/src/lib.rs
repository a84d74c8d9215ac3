//! Core domain logic for team membership, pack feature gating and invitations.
//! This crate is the single source of truth for membership invariants.

pub mod config;
pub mod db;
pub mod feature;
pub mod feed;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use feature::gate::{enabled_modules, is_enabled, ModuleId, Pack};
pub use feed::{ChangeFeed, FeedSubscription, FeedTopic};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::identity::Identity;
pub use model::invitation::{Invitation, InvitationRef, InvitationStatus};
pub use model::membership::{Membership, Role};
pub use model::team::Team;
pub use model::ModelValidationError;
pub use repo::invitation_repo::{
    InvitationRepository, PendingInvitationStore, SqliteInvitationRepository,
};
pub use repo::membership_repo::{MembershipRepository, SqliteMembershipRepository};
pub use repo::team_repo::{SqliteTeamRepository, TeamRepository};
pub use repo::{RepoError, RepoResult};
pub use service::error::{TeamError, TeamResult};
pub use service::invitation_service::{
    AcceptOutcome, InvitationEmail, InvitationMailer, InvitationService, InviteOutcome,
    MailerError,
};
pub use service::legacy_import::{ImportError, ImportReport, LegacyImporter};
pub use service::membership_resolver::{
    MembershipResolver, MembershipStream, MembershipUpdate, MembershipView,
};
pub use service::team_service::TeamService;

/// Minimal health-check API for embedding shells.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
