//! Early input validation

use crate::error::ConfigError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// `PROJECT-123`: uppercase letters and digits, a hyphen, a number
pub const TICKET_KEY_PATTERN: &str = r"^[A-Z][A-Z0-9]*-\d+$";

fn ticket_key_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TICKET_KEY_PATTERN).ok()).as_ref()
}

/// Reject keys that do not look like `PROJECT-123`
pub fn validate_ticket_key(key: &str) -> Result<(), ConfigError> {
    if ticket_key_regex().is_some_and(|re| re.is_match(key)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTicketKey {
            key: key.to_string(),
        })
    }
}

/// The path exists, is a directory and holds a `.git` entry
pub fn validate_repo_path(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Invalid(format!(
            "repository path does not exist: {}",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(ConfigError::Invalid(format!(
            "repository path is not a directory: {}",
            path.display()
        )));
    }
    if !path.join(".git").exists() {
        return Err(ConfigError::Invalid(format!(
            "not a git repository: {}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_project_keys() {
        for key in ["SPE-123", "PROJECT-1", "ABC123-456", "A-0"] {
            assert!(validate_ticket_key(key).is_ok(), "{key}");
        }
    }

    #[test]
    fn rejects_malformed_keys() {
        for key in ["", "spe-123", "SPE123", "SPE-", "-123", "1SPE-2", "SPE-12a", "SPE-1 ", "SP E-1"] {
            assert!(
                matches!(validate_ticket_key(key), Err(ConfigError::InvalidTicketKey { .. })),
                "{key:?}"
            );
        }
    }

    #[test]
    fn repo_path_must_be_a_checkout() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_repo_path(&dir.path().join("missing")).is_err());
        assert!(validate_repo_path(dir.path()).is_err());
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(validate_repo_path(dir.path()).is_ok());
    }

    proptest! {
        #[test]
        fn generated_keys_validate(prefix in "[A-Z][A-Z0-9]{0,6}", n in 0u32..100_000) {
            let key = format!("{prefix}-{n}");
            prop_assert!(validate_ticket_key(&key).is_ok());
        }
    }
}
