//! Affinity cookie reading and writing.

use chrono::Utc;
use std::fmt;
use std::time::Duration;

/// Find the value of a named cookie among `Cookie` header values.
///
/// If the name occurs multiple times, across headers or within one, the
/// first occurrence wins.
pub fn read_named_cookie<'a, I>(headers: I, name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    headers
        .into_iter()
        .find_map(|header| find_in_header(header, name))
}

fn find_in_header<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for pair in header.split(';') {
        if let Some((key, value)) = pair.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// A `Set-Cookie` response header carrying an affinity route value.
///
/// `Domain` and `Path` are emitted only when non-empty; `Expires` only when a
/// lifetime is configured, computed relative to serialization time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    expires: Option<Duration>,
}

impl SetCookie {
    pub(crate) fn new(
        name: String,
        value: String,
        domain: String,
        path: String,
        expires: Option<Duration>,
    ) -> Self {
        Self {
            name,
            value,
            domain,
            path,
            expires,
        }
    }

    /// Get the cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the route value carried by the cookie.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Serialize to a `Set-Cookie` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if !self.domain.is_empty() {
            write!(f, "; Domain={}", self.domain)?;
        }
        if !self.path.is_empty() {
            write!(f, "; Path={}", self.path)?;
        }
        if let Some(expires) = self.expires {
            if let Ok(lifetime) = chrono::Duration::from_std(expires) {
                let deadline = Utc::now() + lifetime;
                write!(f, "; Expires={}", deadline.format("%a, %d %b %Y %H:%M:%S GMT"))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_named_cookie() {
        let headers = ["theme=dark; route=abc123; lang=en"];
        assert_eq!(read_named_cookie(headers, "route"), Some("abc123"));
        assert_eq!(read_named_cookie(headers, "lang"), Some("en"));
        assert_eq!(read_named_cookie(headers, "missing"), None);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let one_header = ["route=first; route=second"];
        assert_eq!(read_named_cookie(one_header, "route"), Some("first"));

        let two_headers = ["lang=en", "route=first", "route=second"];
        assert_eq!(read_named_cookie(two_headers, "route"), Some("first"));
    }

    #[test]
    fn test_cookie_name_is_exact() {
        let headers = ["xroute=a; routex=b"];
        assert_eq!(read_named_cookie(headers, "route"), None);
    }

    #[test]
    fn test_empty_cookie_value() {
        let headers = ["route="];
        assert_eq!(read_named_cookie(headers, "route"), Some(""));
    }

    #[test]
    fn test_header_value_minimal() {
        let cookie = SetCookie::new(
            "route".to_string(),
            "2".to_string(),
            String::new(),
            String::new(),
            None,
        );
        assert_eq!(cookie.header_value(), "route=2");
    }

    #[test]
    fn test_header_value_with_attributes() {
        let cookie = SetCookie::new(
            "route".to_string(),
            "abc".to_string(),
            ".example.com".to_string(),
            "/app".to_string(),
            Some(Duration::from_secs(3600)),
        );

        let header = cookie.header_value();
        assert!(header.starts_with("route=abc; Domain=.example.com; Path=/app; Expires="));
        assert!(header.ends_with("GMT"));
    }

    #[test]
    fn test_header_value_skips_empty_attributes() {
        let cookie = SetCookie::new(
            "route".to_string(),
            "abc".to_string(),
            String::new(),
            "/".to_string(),
            None,
        );
        assert_eq!(cookie.header_value(), "route=abc; Path=/");
    }
}
