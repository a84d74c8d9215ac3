//! Team pack feature gating.
//!
//! # Responsibility
//! - Own the only pack -> module table in core.
//! - Answer "is this module reachable for this team" for every caller.
//!
//! # Invariants
//! - Every known pack resolves to a non-empty ordered module set.
//! - Unknown packs and unknown modules are closed: they enable nothing.

pub mod gate;
