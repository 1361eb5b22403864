//! Key-naming scheme
//!
//! Every structure lives under a key built here. The layout is shared with
//! other writers of the same store and must not change:
//!
//! | Pattern | Structure |
//! |---------|-----------|
//! | `<collection>` field `<id>` | hash, one document per field |
//! | `<scope>:<scopeId>:<childType>` | set of member ids |
//! | `<entityType>:<entityId>:<historyType>` | list, newest first |
//! | `queue:<name>` | list, FIFO jobs |
//! | `queue:<name>:processing` | list, claimed but unacknowledged jobs |
//! | `kpi:<category>:<metric>:<epochMillis>` | scalar with TTL |
//! | `kpi_index:<category>:<metric>` | sorted set of KPI keys by epoch millis |
//! | `refresh_token:<userId>` | scalar with TTL |
//! | `territories` member `<id>` | geo index |

use crate::error::{Error, Result};

/// Separator between key segments
pub const SEPARATOR: char = ':';

/// Prefix of queue lists
pub const QUEUE_PREFIX: &str = "queue";

/// Suffix of the in-flight list of a queue
pub const PROCESSING_SUFFIX: &str = "processing";

/// Prefix of KPI records
pub const KPI_PREFIX: &str = "kpi";

/// Prefix of the per-metric KPI time index
pub const KPI_INDEX_PREFIX: &str = "kpi_index";

/// Prefix of refresh tokens
pub const REFRESH_TOKEN_PREFIX: &str = "refresh_token";

/// Geo index holding territory points
pub const TERRITORIES_GEO_KEY: &str = "territories";

/// Characters interpreted by pattern scans
const GLOB_CHARS: [char; 4] = ['*', '?', '[', ']'];

/// Membership set key: `<scope>:<scopeId>:<childType>`
///
/// ```
/// use canvass_core::keys::scope_key;
/// assert_eq!(scope_key("territory", "t1", "volunteers"), "territory:t1:volunteers");
/// ```
pub fn scope_key(scope: &str, scope_id: &str, child_type: &str) -> String {
    format!("{scope}:{scope_id}:{child_type}")
}

/// History list key: `<entityType>:<entityId>:<historyType>`
pub fn history_key(entity_type: &str, entity_id: &str, history_type: &str) -> String {
    format!("{entity_type}:{entity_id}:{history_type}")
}

/// Queue list key: `queue:<name>`
pub fn queue_key(name: &str) -> String {
    format!("{QUEUE_PREFIX}:{name}")
}

/// In-flight list key: `queue:<name>:processing`
pub fn queue_processing_key(name: &str) -> String {
    format!("{QUEUE_PREFIX}:{name}:{PROCESSING_SUFFIX}")
}

/// KPI record key: `kpi:<category>:<metric>:<epochMillis>`
pub fn kpi_key(category: &str, metric: &str, epoch_millis: u64) -> String {
    format!("{KPI_PREFIX}:{category}:{metric}:{epoch_millis}")
}

/// Pattern matching every KPI record of one metric
pub fn kpi_pattern(category: &str, metric: &str) -> String {
    format!("{KPI_PREFIX}:{category}:{metric}:*")
}

/// Sorted time index of one metric
pub fn kpi_index_key(category: &str, metric: &str) -> String {
    format!("{KPI_INDEX_PREFIX}:{category}:{metric}")
}

/// Refresh token key: `refresh_token:<userId>`
pub fn refresh_token_key(user_id: &str) -> String {
    format!("{REFRESH_TOKEN_PREFIX}:{user_id}")
}

/// Parse the trailing epoch-millis segment of a KPI key
///
/// Returns `None` when the last segment is not an unsigned integer.
pub fn parse_kpi_timestamp(key: &str) -> Option<u64> {
    key.rsplit(SEPARATOR).next()?.parse().ok()
}

/// Reject empty segments
pub fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_input(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Reject empty segments and segments that would be read as a scan pattern
pub fn validate_pattern_segment(what: &str, value: &str) -> Result<()> {
    validate_segment(what, value)?;
    if value.contains(GLOB_CHARS) {
        return Err(Error::invalid_input(format!(
            "{what} '{value}' must not contain any of * ? [ ]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_and_history_keys() {
        assert_eq!(
            scope_key("territory", "t1", "events"),
            "territory:t1:events"
        );
        assert_eq!(
            history_key("voter", "v9", "contacts"),
            "voter:v9:contacts"
        );
    }

    #[test]
    fn test_queue_keys() {
        assert_eq!(queue_key("events"), "queue:events");
        assert_eq!(queue_processing_key("events"), "queue:events:processing");
    }

    #[test]
    fn test_kpi_keys() {
        assert_eq!(
            kpi_key("auth", "login", 1_700_000_000_000),
            "kpi:auth:login:1700000000000"
        );
        assert_eq!(kpi_pattern("auth", "login"), "kpi:auth:login:*");
        assert_eq!(kpi_index_key("auth", "login"), "kpi_index:auth:login");
    }

    #[test]
    fn test_refresh_token_key() {
        assert_eq!(refresh_token_key("u1"), "refresh_token:u1");
    }

    #[test]
    fn test_parse_kpi_timestamp() {
        assert_eq!(parse_kpi_timestamp("kpi:auth:login:42"), Some(42));
        assert_eq!(parse_kpi_timestamp("kpi:auth:login:abc"), None);
        assert_eq!(parse_kpi_timestamp("kpi:auth:login:"), None);
        assert_eq!(parse_kpi_timestamp("kpi:auth:login:-5"), None);
    }

    #[test]
    fn test_validate_segments() {
        assert!(validate_segment("queue name", "events").is_ok());
        assert!(validate_segment("queue name", "").is_err());
        assert!(validate_pattern_segment("category", "auth").is_ok());
        assert!(validate_pattern_segment("category", "au*th").is_err());
        assert!(validate_pattern_segment("metric", "log?in").is_err());
        assert!(validate_pattern_segment("metric", "[x]").is_err());
    }
}
