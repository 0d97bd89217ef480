//! Encoding-safe sitemap recovery.
//!
//! Handles documents whose bytes do not match their declared encoding, carry
//! stray control characters, or contain unbalanced `&`. Detection order:
//! BOM, then the XML `encoding=` declaration, then a UTF-8 validity check
//! with a Windows-1252 fallback.

use std::collections::HashSet;
use std::sync::OnceLock;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::Regex;

use sitepulse_common::urls::validate_url;

/// Decode sitemap bytes to UTF-8, tolerating a mis-declared encoding.
pub fn decode_lenient(bytes: &[u8]) -> String {
    let encoding = detect_encoding(bytes);
    let (text, _, _) = encoding.decode(bytes);
    // Drop a decoded BOM so the parser sees `<` first.
    text.trim_start_matches('\u{feff}').to_string()
}

fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if let Some(label) = declared_encoding(bytes) {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return encoding;
        }
    }
    if std::str::from_utf8(bytes).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

/// The `encoding="..."` label from an XML declaration, if one is present in
/// the first few hundred bytes. The declaration itself is ASCII in every
/// encoding this pipeline meets, so a lossy scan of the prefix is safe.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let prefix = String::from_utf8_lossy(&bytes[..bytes.len().min(400)]);
    let re = declaration_re();
    re.captures(&prefix)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn declaration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)encoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#).expect("valid regex")
    })
}

/// Scrub a decoded document so a second parse attempt can succeed: control
/// characters outside {tab, LF, CR} and non-character code points are
/// removed, and bare `&` is rebalanced to `&amp;`.
pub fn clean_xml(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|&c| {
            if c == '\t' || c == '\n' || c == '\r' {
                return true;
            }
            if c.is_control() {
                return false;
            }
            let v = c as u32;
            // Unicode non-characters: U+FDD0..=U+FDEF and the last two code
            // points of every plane.
            if (0xFDD0..=0xFDEF).contains(&v) || (v & 0xFFFE) == 0xFFFE {
                return false;
            }
            true
        })
        .collect();

    rebalance_entities(&stripped)
}

/// Protect well-formed entities behind a placeholder, escape every
/// remaining `&`, then restore the placeholders.
fn rebalance_entities(text: &str) -> String {
    // U+E000 is private-use; it cannot appear in the cleaned input because
    // the caller already stripped non-characters but not private-use, so
    // clear it defensively first.
    const MARK: char = '\u{E000}';
    let text = text.replace(MARK, "");

    let re = entity_re();
    let protected = re.replace_all(&text, |caps: &regex::Captures<'_>| {
        format!("{MARK}{}", &caps[1])
    });
    let escaped = protected.replace('&', "&amp;");
    escaped.replace(MARK, "&")
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&((?:amp|lt|gt|quot|apos|#[0-9]{1,7}|#x[0-9a-fA-F]{1,6});)")
            .expect("valid regex")
    })
}

/// Last-resort URL extraction from text that refuses structural parsing.
/// Applies the loc/url/link/guid/href patterns, unescapes the basic
/// entities, validates and de-duplicates.
pub fn extract_urls_regex(text: &str) -> Vec<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r"(?s)<loc>\s*(.*?)\s*</loc>",
            r"(?s)<url>\s*(.*?)\s*</url>",
            r"(?s)<link>\s*(.*?)\s*</link>",
            r"(?s)<guid[^>]*>\s*(.*?)\s*</guid>",
            r#"href\s*=\s*["']([^"']+)["']"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    });

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for re in patterns {
        for cap in re.captures_iter(text) {
            let candidate = unescape_basic(cap[1].trim());
            if validate_url(&candidate).is_ok() && seen.insert(candidate.clone()) {
                urls.push(candidate);
            }
        }
    }
    urls
}

fn unescape_basic(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}
