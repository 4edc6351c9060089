use std::time::{SystemTime, UNIX_EPOCH};

/// Parse "true"/"false"/"1"/"0" from an owned String.
pub fn parse_bool_flag(s: String) -> Option<bool> {
    parse_bool_str(&s)
}

/// Parse "true"/"false"/"1"/"0" from a &str.
pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Format a response duration for display: seconds under a minute,
/// minutes + seconds above.
pub fn format_response_time(ms: u64) -> String {
    if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let total_secs = ms / 1000;
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    }
}

/// Truncate a diagnostic string to at most one line and `max_chars` characters.
pub fn truncate_diagnostic(s: &str, max_chars: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    if first_line.chars().count() > max_chars {
        let truncated: String = first_line.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        first_line.to_string()
    }
}

/// Returns true for localhost, loopback IPv4/IPv6, and 0.0.0.0 URLs.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let normalized = url.trim().to_ascii_lowercase();
    normalized.starts_with("http://localhost")
        || normalized.starts_with("https://localhost")
        || normalized.starts_with("http://127.")
        || normalized.starts_with("https://127.")
        || normalized.starts_with("http://0.0.0.0")
        || normalized.starts_with("https://0.0.0.0")
        || normalized.starts_with("http://[::1]")
        || normalized.starts_with("https://[::1]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_helpers() {
        assert_eq!(parse_bool_str("true"), Some(true));
        assert_eq!(parse_bool_str("0"), Some(false));
        assert_eq!(parse_bool_flag("YES".to_string()), Some(true));
        assert_eq!(parse_bool_flag("off".to_string()), Some(false));
        assert_eq!(parse_bool_str("maybe"), None);
    }

    #[test]
    fn test_format_response_time_seconds_and_minutes() {
        assert_eq!(format_response_time(4_200), "4.2s");
        assert_eq!(format_response_time(950), "0.9s");
        assert_eq!(format_response_time(72_000), "1m 12s");
        assert_eq!(format_response_time(60_000), "1m 0s");
    }

    #[test]
    fn test_truncate_diagnostic_takes_first_line() {
        assert_eq!(truncate_diagnostic("abc\ndef", 10), "abc");
        assert_eq!(truncate_diagnostic("abcdefgh", 4), "abcd...");
    }

    #[test]
    fn test_is_local_endpoint_url() {
        assert!(is_local_endpoint_url(" HTTP://LOCALHOST:8700/v1/agent "));
        assert!(is_local_endpoint_url("https://127.0.0.1/v1/agent"));
        assert!(!is_local_endpoint_url("https://agent.example.com/v1"));
    }
}
