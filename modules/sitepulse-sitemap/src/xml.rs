//! Sitemap XML parsing (urlset and sitemapindex) via quick-xml.

use quick_xml::events::Event;
use quick_xml::Reader;

use sitepulse_common::error::SitepulseError;
use sitepulse_common::urls::validate_url;
use sitepulse_common::UrlRecord;

/// Outcome of parsing one sitemap document: either page URLs, references to
/// child sitemaps, or both (some generators mix the two).
#[derive(Debug, Default)]
pub struct ParsedSitemap {
    pub urls: Vec<UrlRecord>,
    pub sub_sitemaps: Vec<String>,
}

impl ParsedSitemap {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.sub_sitemaps.is_empty()
    }
}

/// Parse sitemap XML. `max_urls` bounds the number of accepted URL entries.
///
/// Structural errors are returned so the caller can move to the next
/// strategy; entries that fail URL validation are skipped, not fatal.
pub fn parse_sitemap(xml: &str, max_urls: usize) -> Result<ParsedSitemap, SitepulseError> {
    let mut result = ParsedSitemap::default();

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current_tag = String::new();
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut saw_root = false;

    let mut loc = String::new();
    let mut lastmod: Option<String> = None;
    let mut priority: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = local_name(e.name().as_ref());
                match tag.as_str() {
                    "urlset" | "sitemapindex" => saw_root = true,
                    "url" => {
                        in_url = true;
                        loc.clear();
                        lastmod = None;
                        priority = None;
                    }
                    "sitemap" => {
                        in_sitemap = true;
                        loc.clear();
                        lastmod = None;
                    }
                    _ => {}
                }
                current_tag = tag;
            }
            Ok(Event::End(e)) => {
                let tag = local_name(e.name().as_ref());
                match tag.as_str() {
                    "url" if in_url => {
                        if result.urls.len() < max_urls {
                            push_url(&mut result.urls, &loc, lastmod.take(), priority.take());
                        }
                        in_url = false;
                    }
                    "sitemap" if in_sitemap => {
                        if !loc.is_empty() && validate_url(loc.trim()).is_ok() {
                            result.sub_sitemaps.push(loc.trim().to_string());
                        }
                        in_sitemap = false;
                    }
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| SitepulseError::Parsing(format!("XML entity error: {e}")))?
                    .to_string();
                if in_url || in_sitemap {
                    match current_tag.as_str() {
                        "loc" => loc = text,
                        "lastmod" => lastmod = Some(text),
                        "priority" if in_url => priority = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SitepulseError::Parsing(format!("XML syntax error: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    if in_url || in_sitemap {
        return Err(SitepulseError::Parsing(
            "XML syntax error: truncated document".into(),
        ));
    }
    if !saw_root && result.is_empty() {
        return Err(SitepulseError::Parsing(
            "XML syntax error: no urlset or sitemapindex root".into(),
        ));
    }

    Ok(result)
}

fn push_url(urls: &mut Vec<UrlRecord>, loc: &str, lastmod: Option<String>, priority: Option<String>) {
    let loc = loc.trim();
    if loc.is_empty() || validate_url(loc).is_err() {
        return;
    }
    let mut record = UrlRecord::new(loc).with_property("source", "xml");
    if let Some(lm) = lastmod {
        record = record.with_last_modified(lm);
    }
    if let Some(p) = priority {
        record = record.with_property("priority", p);
    }
    urls.push(record);
}

/// Tag name without any namespace prefix, lowercased.
fn local_name(raw: &[u8]) -> String {
    let s = String::from_utf8_lossy(raw);
    s.rsplit(':').next().unwrap_or(&s).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <url>
                <loc>https://a.test/g/x</loc>
                <lastmod>2026-01-15</lastmod>
                <priority>0.8</priority>
            </url>
            <url>
                <loc>https://a.test/g/y</loc>
            </url>
        </urlset>"#;

        let result = parse_sitemap(xml, 100_000).unwrap();
        assert_eq!(result.urls.len(), 2);
        assert!(result.sub_sitemaps.is_empty());
        assert_eq!(result.urls[0].address, "https://a.test/g/x");
        assert_eq!(result.urls[0].last_modified.as_deref(), Some("2026-01-15"));
        assert_eq!(result.urls[0].properties.get("priority").map(String::as_str), Some("0.8"));
        assert_eq!(result.urls[0].properties.get("source").map(String::as_str), Some("xml"));
    }

    #[test]
    fn parses_sitemapindex() {
        let xml = r#"<?xml version="1.0"?>
        <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sitemap><loc>https://a.test/sitemap-1.xml</loc></sitemap>
            <sitemap><loc>https://a.test/sitemap-2.xml</loc><lastmod>2026-02-01</lastmod></sitemap>
        </sitemapindex>"#;

        let result = parse_sitemap(xml, 100_000).unwrap();
        assert!(result.urls.is_empty());
        assert_eq!(
            result.sub_sitemaps,
            vec!["https://a.test/sitemap-1.xml", "https://a.test/sitemap-2.xml"]
        );
    }

    #[test]
    fn namespaced_tags_are_accepted() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sm:url><sm:loc>https://a.test/g/z</sm:loc></sm:url>
        </sm:urlset>"#;
        let result = parse_sitemap(xml, 10).unwrap();
        assert_eq!(result.urls.len(), 1);
        assert_eq!(result.urls[0].address, "https://a.test/g/z");
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let xml = r#"<urlset>
            <url><loc>not a url</loc></url>
            <url><loc>ftp://a.test/file</loc></url>
            <url><loc>https://a.test/ok</loc></url>
        </urlset>"#;
        let result = parse_sitemap(xml, 10).unwrap();
        assert_eq!(result.urls.len(), 1);
        assert_eq!(result.urls[0].address, "https://a.test/ok");
    }

    #[test]
    fn max_urls_is_honored() {
        let mut xml = String::from("<urlset>");
        for i in 0..10 {
            xml.push_str(&format!("<url><loc>https://a.test/g/{i}</loc></url>"));
        }
        xml.push_str("</urlset>");
        let result = parse_sitemap(&xml, 3).unwrap();
        assert_eq!(result.urls.len(), 3);
    }

    #[test]
    fn html_is_a_parse_error() {
        let err = parse_sitemap("<html><body>404</body></html>", 10);
        assert!(err.is_err());
    }

    #[test]
    fn truncated_xml_is_a_parse_error() {
        let err = parse_sitemap("<urlset><url><loc>https://a.test/x</loc>", 10);
        assert!(err.is_err());
    }
}
