//! Empty-content recovery: alternate sitemap locations, robots.txt
//! discovery, and the last-resort website scrape for game links.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use sitepulse_common::error::SitepulseError;
use sitepulse_common::safety::mask_url;
use sitepulse_common::urls::{strip_www, validate_url};
use sitepulse_common::UrlRecord;

use crate::fetch::Downloader;

/// Alternate sitemap paths probed under the same origin when the primary
/// URL comes back blank or as an HTML error page.
const ALTERNATE_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap-index.xml",
    "/sitemap.txt",
    "/sitemap-games.xml",
    "/sitemap-posts.xml",
    "/sitemap1.xml",
    "/sitemap_main.xml",
    "/robots.txt",
];

/// Likely game-index pages probed by the scraping fallback.
const GAME_INDEX_PATHS: &[&str] = &[
    "/",
    "/games",
    "/games/",
    "/all-games",
    "/new-games",
    "/popular-games",
    "/category/games",
    "/en/games",
];

/// Path fragments that mark a link as a game page.
const GAME_URL_MARKERS: &[&str] = &["/game/", "/games/", "/play/", "/g/", "-game"];

const SCRAPE_MAX_LINKS: usize = 200;

/// True when a payload is blank or an HTML error page rather than a sitemap.
pub fn is_empty_or_error_page(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lower = trimmed.to_lowercase();
    if lower.contains("<?xml") || lower.contains("<urlset") || lower.contains("<sitemapindex") {
        return false;
    }
    let is_html = lower.contains("<html") || lower.contains("<!doctype");
    if !is_html {
        return false;
    }
    ["404", "403", "500", "error", "forbidden"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Candidate URLs to try instead of a dead primary: the fixed alternate
/// paths under the same origin, plus the original with `www.` stripped.
/// The primary itself is excluded.
pub fn alternate_urls(primary: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(primary) else {
        return Vec::new();
    };
    let Some(host) = parsed.host_str() else {
        return Vec::new();
    };
    let origin = format!("{}://{}", parsed.scheme(), host);

    let mut out = Vec::new();
    for path in ALTERNATE_PATHS {
        let candidate = format!("{origin}{path}");
        if candidate != primary {
            out.push(candidate);
        }
    }
    if let Some(stripped) = strip_www(primary) {
        out.push(stripped);
    }
    out
}

/// `Sitemap:` directives from a robots.txt body.
pub fn robots_sitemaps(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line
                .strip_prefix("Sitemap:")
                .or_else(|| line.strip_prefix("sitemap:"))?;
            let url = rest.trim();
            validate_url(url).ok().map(|_| url.to_string())
        })
        .collect()
}

/// Scrape likely index pages of the origin and keep in-origin links that
/// match a game-URL pattern. This is the end of the chain; anything it
/// returns has already survived validation.
pub async fn scrape_game_urls(
    fetcher: &dyn Downloader,
    primary: &str,
) -> Result<Vec<UrlRecord>, SitepulseError> {
    let parsed = Url::parse(primary)
        .map_err(|e| SitepulseError::Validation(format!("invalid url: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| SitepulseError::Validation("invalid url: missing host".into()))?
        .to_string();
    let origin = format!("{}://{}", parsed.scheme(), host);

    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for path in GAME_INDEX_PATHS {
        if records.len() >= SCRAPE_MAX_LINKS {
            break;
        }
        let page_url = format!("{origin}{path}");
        let body = match fetcher.download_resilient(&page_url).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!(url = %mask_url(&page_url), error = %e, "Scrape probe failed");
                continue;
            }
        };
        for link in extract_links(&body, &origin) {
            if !link_is_game_url(&link, &host) {
                continue;
            }
            if validate_url(&link).is_ok() && seen.insert(link.clone()) {
                records.push(
                    UrlRecord::new(link).with_property("source", "scrape"),
                );
                if records.len() >= SCRAPE_MAX_LINKS {
                    break;
                }
            }
        }
    }

    Ok(records)
}

/// href extraction with relative-URL resolution against the origin.
fn extract_links(html: &str, origin: &str) -> Vec<String> {
    static HREF_RE: OnceLock<Regex> = OnceLock::new();
    let re = HREF_RE
        .get_or_init(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));
    let base = Url::parse(origin).ok();

    let mut links = Vec::new();
    for cap in re.captures_iter(html) {
        let raw = &cap[1];
        if raw.starts_with('#')
            || raw.starts_with("javascript:")
            || raw.starts_with("mailto:")
            || raw.starts_with("tel:")
        {
            continue;
        }
        let resolved = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else if let Some(ref b) = base {
            match b.join(raw) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            }
        } else {
            continue;
        };
        links.push(resolved);
    }
    links
}

fn link_is_game_url(link: &str, host: &str) -> bool {
    let Ok(parsed) = Url::parse(link) else {
        return false;
    };
    if parsed.host_str() != Some(host) {
        return false;
    }
    let path = parsed.path().to_lowercase();
    GAME_URL_MARKERS.iter().any(|m| path.contains(m))
}
