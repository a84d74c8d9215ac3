//! Team record.

use super::{now_epoch_ms, require_non_empty, ModelValidationError, TeamId, UserId};
use crate::feature::gate::{self, ModuleId, Pack, DEFAULT_PACK};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Group of identities sharing one feature pack.
///
/// `pack` keeps the stored key verbatim so an unrecognized value is not
/// silently promoted to a known pack; gating treats it as closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub pack: String,
    pub created_by: UserId,
    #[serde(rename = "createdAt")]
    pub created_at_ms: i64,
}

impl Team {
    /// Creates a team with a generated id and the canonical key of `pack`.
    pub fn new(name: impl Into<String>, pack: Pack, created_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into().trim().to_string(),
            pack: pack.as_str().to_string(),
            created_by: created_by.into(),
            created_at_ms: now_epoch_ms(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_non_empty("id", &self.id)?;
        require_non_empty("name", &self.name)?;
        require_non_empty("created_by", &self.created_by)
    }

    /// Parsed pack, `None` when the stored key is unrecognized.
    pub fn pack(&self) -> Option<Pack> {
        Pack::parse(&self.pack)
    }

    pub fn enabled_modules(&self) -> &'static [ModuleId] {
        gate::enabled_modules(&self.pack)
    }

    pub fn is_module_enabled(&self, module: ModuleId) -> bool {
        gate::is_enabled(&self.pack, module.as_str())
    }
}

/// Normalizes a stored pack column: blank or missing reads as the default pack.
pub fn stored_pack_or_default(value: Option<String>) -> String {
    match value {
        Some(pack) if !pack.trim().is_empty() => pack.trim().to_string(),
        _ => DEFAULT_PACK.as_str().to_string(),
    }
}
