//! Administrator configuration loaded from environment variables.
//!
//! Global administrators bypass team scoping on the rule store and are the
//! only users allowed to hard-delete rules.

use std::collections::HashSet;

/// Environment variable holding a comma-separated list of Discord user ids
pub const ADMIN_IDS_ENV: &str = "REMINDER_ADMIN_IDS";

/// Parses a comma-separated id list, ignoring blanks.
#[must_use]
pub fn parse_admin_ids(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Reads the global administrator ids from `REMINDER_ADMIN_IDS`.
///
/// Returns an empty set when the variable is not configured.
#[must_use]
pub fn get_admin_ids() -> HashSet<String> {
    std::env::var(ADMIN_IDS_ENV)
        .map(|raw| parse_admin_ids(&raw))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_admin_ids_trims_and_skips_blanks() {
        let ids = parse_admin_ids(" 111, 222 ,,333 ");
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("111"));
        assert!(ids.contains("222"));
        assert!(ids.contains("333"));
    }

    #[test]
    fn test_parse_admin_ids_empty() {
        assert!(parse_admin_ids("").is_empty());
    }
}
