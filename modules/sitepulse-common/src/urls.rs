use url::Url;

use crate::error::SitepulseError;

const MAX_URL_LEN: usize = 2048;

/// Validate a URL against the pipeline's invariants: http/https scheme,
/// non-empty host, length at most 2048, no whitespace anywhere.
pub fn validate_url(s: &str) -> Result<(), SitepulseError> {
    if s.is_empty() {
        return Err(SitepulseError::Validation("invalid url: empty".into()));
    }
    if s.len() > MAX_URL_LEN {
        return Err(SitepulseError::Validation(format!(
            "invalid url: length {} exceeds {MAX_URL_LEN}",
            s.len()
        )));
    }
    if s.chars().any(char::is_whitespace) {
        return Err(SitepulseError::Validation(
            "invalid url: contains whitespace".into(),
        ));
    }
    let parsed = Url::parse(s)
        .map_err(|e| SitepulseError::Validation(format!("invalid url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(SitepulseError::Validation(format!(
                "invalid url: unsupported scheme {other}"
            )))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(SitepulseError::Validation(
            "invalid url: missing host".into(),
        ));
    }
    Ok(())
}

/// Host part of a URL, lowercased. Falls back to the raw string when
/// unparseable so callers always get a usable key.
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| url.to_string())
}

/// Same URL with a leading `www.` removed from the host, if present.
pub fn strip_www(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let stripped = host.strip_prefix("www.")?;
    let mut out = parsed.clone();
    out.set_host(Some(stripped)).ok()?;
    Some(out.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_https() {
        assert!(validate_url("https://a.test/g/x").is_ok());
        assert!(validate_url("http://a.test/").is_ok());
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(validate_url("").is_err());
        assert!(validate_url("ftp://a.test/x").is_err());
        assert!(validate_url("https://a.test/with space").is_err());
        assert!(validate_url("not a url").is_err());
        let long = format!("https://a.test/{}", "x".repeat(2048));
        assert!(validate_url(&long).is_err());
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(extract_domain("https://WWW.Example.com/sitemap.xml"), "www.example.com");
        assert_eq!(extract_domain("https://a.test/g/x"), "a.test");
    }

    #[test]
    fn www_stripping() {
        assert_eq!(
            strip_www("https://www.example.com/sitemap.xml").as_deref(),
            Some("https://example.com/sitemap.xml")
        );
        assert_eq!(strip_www("https://example.com/sitemap.xml"), None);
    }
}
