//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into membership, invitation and team
//!   administration use-cases.
//! - Take identity and active-team context explicitly; nothing here reads
//!   an ambient session.

pub mod error;
pub mod invitation_service;
pub mod legacy_import;
pub mod membership_resolver;
pub mod team_service;
