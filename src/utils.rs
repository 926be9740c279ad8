//! Small helpers shared across the hall service

use crate::types::SessionId;
use chrono::{DateTime, Utc};

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "SSID";

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Extract a session id from a `Cookie` header value
///
/// Pairs are separated by `;`, keys and values by `=`. Returns `None` when
/// the cookie is missing or its value is not a number.
pub fn session_id_from_cookie(header: &str, cookie_name: &str) -> Option<SessionId> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == cookie_name)
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_cookie() {
        assert_eq!(session_id_from_cookie("SSID=12; path=/", SESSION_COOKIE), Some(12));
        assert_eq!(session_id_from_cookie("path=/; SSID=7", SESSION_COOKIE), Some(7));
        assert_eq!(session_id_from_cookie(" SSID = 3 ", SESSION_COOKIE), Some(3));
    }

    #[test]
    fn test_session_id_from_cookie_missing_or_invalid() {
        assert_eq!(session_id_from_cookie("", SESSION_COOKIE), None);
        assert_eq!(session_id_from_cookie("path=/", SESSION_COOKIE), None);
        assert_eq!(session_id_from_cookie("SSID=abc", SESSION_COOKIE), None);
        assert_eq!(session_id_from_cookie("XSSID=5", SESSION_COOKIE), None);
    }

    #[test]
    fn test_current_timestamp_moves_forward() {
        let first = current_timestamp();
        let second = current_timestamp();
        assert!(second >= first);
    }
}
