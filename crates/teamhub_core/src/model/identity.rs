//! Signed-in identity as issued by the auth provider.
//!
//! Core never mutates identities; callers pass them explicitly into every
//! operation that needs one.

use super::{require_non_empty, ModelValidationError, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable provider-issued user id.
    #[serde(rename = "uid", alias = "userId")]
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_non_empty("user_id", &self.user_id)?;
        require_non_empty("email", &self.email)
    }

    /// Email safe for log lines: `j***@example.com`.
    pub fn masked_email(&self) -> String {
        mask_email(&self.email)
    }
}

/// Masks the local part of an address, keeping its first character.
pub fn mask_email(email: &str) -> String {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{mask_email, Identity};

    #[test]
    fn masks_local_part() {
        assert_eq!(mask_email("jeanne@example.com"), "j***@example.com");
        assert_eq!(mask_email("not-an-email"), "***");
    }

    #[test]
    fn validate_rejects_blank_fields() {
        assert!(Identity::new("u1", "a@b.com").validate().is_ok());
        assert!(Identity::new(" ", "a@b.com").validate().is_err());
        assert!(Identity::new("u1", "").validate().is_err());
    }
}
