//! Deterministic names derived from ticket keys and summaries

use crate::error::WorkspaceError;

/// Longest summary slug used in a branch name
pub const SUMMARY_SLUG_MAX: usize = 50;

/// Directory slug for a ticket key: lower-cased, non-alphanumerics stripped
///
/// `SPE-123` becomes `spe123`.
pub fn ticket_slug(ticket_key: &str) -> Result<String, WorkspaceError> {
    let slug: String = ticket_key
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if slug.is_empty() {
        Err(WorkspaceError::InvalidKey(ticket_key.to_string()))
    } else {
        Ok(slug)
    }
}

/// Branch used by a Worktree-kind workspace
#[must_use]
pub fn worktree_branch(slug: &str) -> String {
    format!("fix/{slug}")
}

/// Hyphenated, lower-case slug of a ticket summary
///
/// Runs of anything other than ASCII letters and digits collapse to one `-`.
/// Slugs longer than `max_len` are cut back to the last whole word.
#[must_use]
pub fn slugify_summary(summary: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(summary.len());
    for c in summary.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.len() <= max_len {
        return slug.to_string();
    }
    let cut = &slug[..max_len];
    match cut.rsplit_once('-') {
        Some((head, _)) => head.to_string(),
        None => cut.to_string(),
    }
}

/// Default Branch-kind branch name: `<KEY>-<summary slug>`, or the key alone
#[must_use]
pub fn branch_name_for(ticket_key: &str, summary: Option<&str>) -> String {
    let slug = summary
        .map(|s| slugify_summary(s, SUMMARY_SLUG_MAX))
        .unwrap_or_default();
    if slug.is_empty() {
        ticket_key.to_string()
    } else {
        format!("{ticket_key}-{slug}")
    }
}

/// Reject refs git would parse as options or that are plainly malformed
pub fn check_ref(name: &str) -> Result<(), WorkspaceError> {
    let bad = name.is_empty()
        || name.starts_with('-')
        || name.contains("..")
        || name.chars().any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c));
    if bad {
        Err(WorkspaceError::InvalidRef(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slug_strips_and_lowers() {
        assert_eq!(ticket_slug("SPE-123").unwrap(), "spe123");
        assert_eq!(ticket_slug("ab c_D").unwrap(), "abcd");
        assert!(ticket_slug("--").is_err());
    }

    #[test]
    fn summary_slug_matches_expected_shape() {
        assert_eq!(
            slugify_summary("Cost Code Descriptions not Populating", 50),
            "cost-code-descriptions-not-populating"
        );
        assert_eq!(slugify_summary("  Fix: the (bug)!! ", 50), "fix-the-bug");
        assert_eq!(slugify_summary("Ünïcode stays out", 50), "n-code-stays-out");
    }

    #[test]
    fn long_summary_is_cut_at_word_boundary() {
        let summary = "Users cannot save invoices when the customer record has an empty billing address";
        let slug = slugify_summary(summary, 50);
        assert!(slug.len() <= 50);
        assert_eq!(slug, "users-cannot-save-invoices-when-the-customer");
        assert_eq!(slugify_summary("abcdefghij", 4), "abcd");
    }

    #[test]
    fn branch_names() {
        assert_eq!(branch_name_for("SPE-9", Some("Broken login")), "SPE-9-broken-login");
        assert_eq!(branch_name_for("SPE-9", Some("!!!")), "SPE-9");
        assert_eq!(branch_name_for("SPE-9", None), "SPE-9");
        assert_eq!(worktree_branch("spe9"), "fix/spe9");
    }

    #[test]
    fn refs_are_checked() {
        assert!(check_ref("abc123").is_ok());
        assert!(check_ref("fix/spe-1").is_ok());
        assert!(check_ref("--upload-pack=x").is_err());
        assert!(check_ref("a..b").is_err());
        assert!(check_ref("has space").is_err());
    }
}
