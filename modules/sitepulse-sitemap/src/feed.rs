//! RSS/Atom feeds as a URL source. Some sites publish their game catalog
//! only as a feed, so the chain treats feeds as one more sitemap shape.

use sitepulse_common::error::SitepulseError;
use sitepulse_common::urls::validate_url;
use sitepulse_common::UrlRecord;

/// Quick shape check used for strategy pre-selection.
pub fn looks_like_feed(url: &str, content: &[u8]) -> bool {
    let lower = url.to_lowercase();
    if lower.contains("rss") || lower.contains("atom") || lower.ends_with("/feed") {
        return true;
    }
    let prefix = String::from_utf8_lossy(&content[..content.len().min(512)]).to_lowercase();
    prefix.contains("<rss") || prefix.contains("<feed")
}

/// Parse an RSS/Atom payload into URL records (`source=rss`).
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<UrlRecord>, SitepulseError> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| SitepulseError::Parsing(format!("feed parse error: {e}")))?;

    let mut urls = Vec::new();
    for entry in feed.entries {
        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()));
        let Some(link) = link else { continue };
        if validate_url(&link).is_err() {
            continue;
        }
        let mut record = UrlRecord::new(link).with_property("source", "rss");
        if let Some(date) = entry.published.or(entry.updated) {
            record = record.with_last_modified(date.to_rfc3339());
        }
        urls.push(record);
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_feed_urls_and_bodies() {
        assert!(looks_like_feed("https://a.test/games/rss.xml", b""));
        assert!(looks_like_feed("https://a.test/feed", b""));
        assert!(looks_like_feed(
            "https://a.test/sitemap.xml",
            b"<?xml version=\"1.0\"?><rss version=\"2.0\">"
        ));
        assert!(!looks_like_feed("https://a.test/sitemap.xml", b"<urlset>"));
    }

    #[test]
    fn parses_rss_items() {
        let rss = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel>
            <title>games</title>
            <item><link>https://a.test/g/x</link><guid>https://a.test/g/x</guid></item>
            <item><link>https://a.test/g/y</link></item>
        </channel></rss>"#;
        let urls = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].address, "https://a.test/g/x");
        assert_eq!(urls[0].properties.get("source").map(String::as_str), Some("rss"));
    }

    #[test]
    fn rejects_non_feed_content() {
        assert!(parse_feed(b"<urlset></urlset>").is_err());
    }
}
