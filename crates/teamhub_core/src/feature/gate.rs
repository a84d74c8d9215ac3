//! Pack and module declarations plus the gate predicate.

use crate::model::ModelValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Team template that decides which application modules exist for a team.
///
/// Serde goes through [`Pack::parse`] and [`Pack::as_str`], so the wire form
/// accepts exactly what the gate accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Pack {
    Family,
    Roommates,
    Friends,
    Project,
}

/// Pack applied when a team document carries no pack at all.
pub const DEFAULT_PACK: Pack = Pack::Family;

const ALL_PACKS: &[Pack] = &[Pack::Family, Pack::Roommates, Pack::Friends, Pack::Project];

impl Pack {
    /// Stored key written to team documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Family => "famille",
            Self::Roommates => "colocation",
            Self::Friends => "amis",
            Self::Project => "projet",
        }
    }

    /// User-facing pack name.
    pub fn label(self) -> &'static str {
        match self {
            Self::Family => "Famille",
            Self::Roommates => "Colocation",
            Self::Friends => "Amis proches",
            Self::Project => "Projet/Association",
        }
    }

    /// Parses a stored key or one of its accepted aliases.
    ///
    /// Matching is exact after trimming; `"Famille"` is not a pack.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "famille" | "family" => Some(Self::Family),
            "colocation" | "coloc" | "roommates" => Some(Self::Roommates),
            "amis" | "friends" => Some(Self::Friends),
            "projet" | "project" | "custom" => Some(Self::Project),
            _ => None,
        }
    }

    pub fn all() -> &'static [Pack] {
        ALL_PACKS
    }

    /// Ordered module set enabled by this pack.
    pub fn modules(self) -> &'static [ModuleId] {
        match self {
            Self::Family => &[
                ModuleId::Calendar,
                ModuleId::Tasks,
                ModuleId::Notes,
                ModuleId::Chat,
            ],
            Self::Roommates => &[
                ModuleId::Tasks,
                ModuleId::Budget,
                ModuleId::Calendar,
                ModuleId::Chat,
            ],
            Self::Friends => &[ModuleId::Chat, ModuleId::Calendar, ModuleId::Notes],
            Self::Project => &[ModuleId::Tasks, ModuleId::Notes, ModuleId::Calendar],
        }
    }

    pub fn enables(self, module: ModuleId) -> bool {
        self.modules().contains(&module)
    }
}

impl Display for Pack {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Pack {
    type Error = ModelValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(ModelValidationError::UnknownPack(value))
    }
}

impl From<Pack> for &'static str {
    fn from(value: Pack) -> Self {
        value.as_str()
    }
}

/// Application module that can be mounted for a team.
///
/// `Ideas` exists as a module but no pack currently enables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ModuleId {
    Tasks,
    Calendar,
    Notes,
    Budget,
    Chat,
    Ideas,
}

const ALL_MODULES: &[ModuleId] = &[
    ModuleId::Tasks,
    ModuleId::Calendar,
    ModuleId::Notes,
    ModuleId::Budget,
    ModuleId::Chat,
    ModuleId::Ideas,
];

impl ModuleId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Calendar => "calendar",
            Self::Notes => "notes",
            Self::Budget => "budget",
            Self::Chat => "chat",
            Self::Ideas => "ideas",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "tasks" => Some(Self::Tasks),
            "calendar" => Some(Self::Calendar),
            "notes" => Some(Self::Notes),
            "budget" | "finances" => Some(Self::Budget),
            "chat" => Some(Self::Chat),
            "ideas" => Some(Self::Ideas),
            _ => None,
        }
    }

    pub fn all() -> &'static [ModuleId] {
        ALL_MODULES
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ModuleId {
    type Error = ModelValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(ModelValidationError::UnknownModule(value))
    }
}

impl From<ModuleId> for &'static str {
    fn from(value: ModuleId) -> Self {
        value.as_str()
    }
}

/// Returns whether `module_id` is reachable for a team declaring `pack`.
///
/// Total over arbitrary strings: an unknown pack or module yields `false`.
pub fn is_enabled(pack: &str, module_id: &str) -> bool {
    match (Pack::parse(pack), ModuleId::parse(module_id)) {
        (Some(pack), Some(module)) => pack.enables(module),
        _ => false,
    }
}

/// Ordered enabled modules for a stored pack key, empty when unknown.
pub fn enabled_modules(pack: &str) -> &'static [ModuleId] {
    Pack::parse(pack).map(Pack::modules).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::{enabled_modules, is_enabled, ModuleId, Pack, DEFAULT_PACK};
    use crate::model::ModelValidationError;

    #[test]
    fn every_pack_enables_at_least_one_module() {
        for pack in Pack::all() {
            assert!(!pack.modules().is_empty(), "{pack} has no modules");
        }
    }

    #[test]
    fn gate_matches_declared_table() {
        assert!(!is_enabled("famille", "budget"));
        assert!(is_enabled("coloc", "budget"));
        assert!(is_enabled("colocation", "budget"));
        assert!(is_enabled("amis", "chat"));
        assert!(!is_enabled("amis", "tasks"));
        assert!(is_enabled("projet", "calendar"));
        assert!(!is_enabled("projet", "ideas"));
    }

    #[test]
    fn no_pack_enables_ideas() {
        for pack in Pack::all() {
            assert!(!pack.enables(ModuleId::Ideas), "{pack} enables ideas");
        }
    }

    #[test]
    fn unknown_pack_or_module_is_closed() {
        for module in ModuleId::all() {
            assert!(!is_enabled("", module.as_str()));
            assert!(!is_enabled("entreprise", module.as_str()));
            assert!(!is_enabled("Famille", module.as_str()));
        }
        assert!(!is_enabled("famille", "photos"));
        assert!(enabled_modules("unknown").is_empty());
    }

    #[test]
    fn string_gate_agrees_with_typed_table() {
        for pack in Pack::all() {
            for module in ModuleId::all() {
                assert_eq!(
                    is_enabled(pack.as_str(), module.as_str()),
                    pack.enables(*module)
                );
            }
        }
    }

    #[test]
    fn aliases_resolve_to_stored_keys() {
        assert_eq!(Pack::parse("family"), Some(Pack::Family));
        assert_eq!(Pack::parse(" roommates "), Some(Pack::Roommates));
        assert_eq!(Pack::parse("custom"), Some(Pack::Project));
        assert_eq!(ModuleId::parse("finances"), Some(ModuleId::Budget));
        assert_eq!(DEFAULT_PACK.as_str(), "famille");
    }

    #[test]
    fn serde_uses_the_gate_vocabulary() {
        let pack: Pack = serde_json::from_str(r#"" roommates ""#).unwrap();
        assert_eq!(pack, Pack::Roommates);
        let pack: Pack = serde_json::from_str(r#""coloc""#).unwrap();
        assert_eq!(serde_json::to_string(&pack).unwrap(), r#""colocation""#);

        let module: ModuleId = serde_json::from_str(r#"" finances""#).unwrap();
        assert_eq!(module, ModuleId::Budget);
        assert_eq!(serde_json::to_string(&module).unwrap(), r#""budget""#);

        for rejected in [r#""Famille""#, r#""entreprise""#, r#""""#] {
            let err = serde_json::from_str::<Pack>(rejected).unwrap_err();
            assert!(err.to_string().contains("unknown team pack"), "{err}");
        }
        assert!(serde_json::from_str::<ModuleId>(r#""photos""#).is_err());
    }

    #[test]
    fn unknown_keys_report_the_rejected_value() {
        assert_eq!(
            Pack::try_from("Famille".to_string()),
            Err(ModelValidationError::UnknownPack("Famille".to_string()))
        );
        assert_eq!(
            ModuleId::try_from("photos".to_string()),
            Err(ModelValidationError::UnknownModule("photos".to_string()))
        );
    }

    #[test]
    fn modules_keep_declared_order() {
        assert_eq!(
            enabled_modules("amis"),
            &[ModuleId::Chat, ModuleId::Calendar, ModuleId::Notes]
        );
    }
}
