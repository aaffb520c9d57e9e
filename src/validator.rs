//! Link scheme allow-list applied to everything that enters the stage.

use url::Url;

/// Schemes a staged bookmark may carry.
pub const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// True only for absolute `http`/`https` URLs.
///
/// `javascript:`, `data:`, `file:` and anything else that parses is rejected,
/// as is anything that does not parse at all.
pub fn is_valid_url(candidate: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return false;
    }

    match Url::parse(candidate) {
        // The parser lowercases the scheme, so `HTTPS:` compares equal here.
        Ok(parsed) => ALLOWED_SCHEMES.contains(&parsed.scheme()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_and_https() {
        assert!(is_valid_url("https://example.com"));
        assert!(is_valid_url("http://example.com/path?q=1#frag"));
        assert!(is_valid_url("HTTPS://EXAMPLE.COM"));
    }

    #[test]
    fn test_rejects_dangerous_schemes() {
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("JavaScript:alert(1)"));
        assert!(!is_valid_url("data:text/html,x"));
        assert!(!is_valid_url("file:///etc/passwd"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("chrome://settings"));
    }

    #[test]
    fn test_rejects_unparsable() {
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("/relative/path"));
        assert!(!is_valid_url("https://"));
    }
}
