//! Masking helpers for log output. Secrets, URLs and keyword lists never
//! appear verbatim in log records — only a domain plus a short hash, or a
//! length.

use crate::types::short_hash;
use crate::urls::extract_domain;

/// Mask a URL for logging: domain plus the first 8 hex chars of its hash.
pub fn mask_url(url: &str) -> String {
    format!("{}#{}", extract_domain(url), &short_hash(url)[..8])
}

/// Mask an API key or other secret: length only, never content.
pub fn mask_key(key: &str) -> String {
    if key.is_empty() {
        "(empty)".to_string()
    } else {
        format!("({} chars)", key.len())
    }
}

/// Mask a keyword list: count plus a hash of the joined set, so identical
/// batches are recognizable across log lines without leaking the terms.
pub fn mask_keywords(keywords: &[String]) -> String {
    let joined = keywords.join("\n");
    format!("{} keywords #{}", keywords.len(), &short_hash(&joined)[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_mask_hides_path() {
        let masked = mask_url("https://a.test/secret/path?token=abc");
        assert!(masked.starts_with("a.test#"));
        assert!(!masked.contains("secret"));
        assert!(!masked.contains("token"));
    }

    #[test]
    fn key_mask_hides_value() {
        assert_eq!(mask_key(""), "(empty)");
        assert_eq!(mask_key("s3cr3t-key-value"), "(16 chars)");
    }

    #[test]
    fn keyword_mask_is_stable() {
        let kws = vec!["racing games".to_string(), "puzzle".to_string()];
        assert_eq!(mask_keywords(&kws), mask_keywords(&kws));
        assert!(mask_keywords(&kws).starts_with("2 keywords #"));
    }
}
