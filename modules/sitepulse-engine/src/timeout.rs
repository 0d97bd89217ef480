//! Per-task deadline heuristics.
//!
//! The adaptive calculator multiplies URL-shape factors into a complexity
//! estimate; the progressive calculator tiers by expected URL count. When
//! both are available the larger deadline wins.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

pub const DEFAULT_BASE: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX: Duration = Duration::from_secs(900);

/// Locale path markers that usually mean a larger, slower mirror of the
/// main sitemap.
const LOCALE_MARKERS: &[&str] = &[
    "/de/", "/fr/", "/es/", "/it/", "/pt/", "/ru/", "/ja/", "/ko/", "/zh/", "/pl/", "/tr/",
    "/nl/", "/ar/",
];

#[derive(Debug, Clone)]
pub struct AdaptiveTimeout {
    base: Duration,
    max: Duration,
    /// Hosts known to serve very large sitemaps.
    large_hosts: Vec<String>,
}

impl Default for AdaptiveTimeout {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            max: DEFAULT_MAX,
            large_hosts: Vec::new(),
        }
    }
}

impl AdaptiveTimeout {
    pub fn new(base: Duration, max: Duration, large_hosts: Vec<String>) -> Self {
        Self {
            base,
            max,
            large_hosts: large_hosts.into_iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    /// Multiplicative complexity estimate for a sitemap URL.
    pub fn complexity(&self, url: &str) -> f64 {
        let lower = url.to_lowercase();
        let (host, path) = match Url::parse(&lower) {
            Ok(u) => (
                u.host_str().unwrap_or_default().to_string(),
                u.path().to_string(),
            ),
            Err(_) => (String::new(), lower.clone()),
        };

        let mut factor = 1.0;
        if lower.ends_with(".gz") {
            factor *= 1.8;
        }
        if path.contains("index") {
            factor *= 3.0;
        }
        if self.large_hosts.iter().any(|h| host.ends_with(h.as_str())) {
            factor *= 2.5;
        }
        if numbered_re().is_match(&path) {
            factor *= 1.5;
        }
        if LOCALE_MARKERS.iter().any(|m| path.contains(m)) {
            factor *= 1.3;
        }
        if path.contains("rss") || path.contains("feed") {
            factor *= 0.8;
        }
        if lower.ends_with(".txt") {
            factor *= 0.6;
        }
        factor
    }

    /// Integer complexity score carried on the task record.
    pub fn complexity_score(&self, url: &str) -> u32 {
        (self.complexity(url) * 100.0).round() as u32
    }

    /// `clamp(base × complexity, base, max)`.
    pub fn timeout_for(&self, url: &str) -> Duration {
        let scaled = self.base.mul_f64(self.complexity(url));
        scaled.clamp(self.base, self.max)
    }

    /// Layer the progressive calculator on top: the larger deadline wins.
    pub fn timeout_with_estimate(&self, url: &str, estimated_urls: Option<usize>) -> Duration {
        let adaptive = self.timeout_for(url);
        match estimated_urls {
            Some(n) => adaptive.max(progressive_timeout(n)),
            None => adaptive,
        }
    }
}

/// Tiered deadline by expected URL count.
pub fn progressive_timeout(estimated_urls: usize) -> Duration {
    match estimated_urls {
        0..=100 => Duration::from_secs(30),
        101..=1_000 => Duration::from_secs(120),
        1_001..=10_000 => Duration::from_secs(300),
        _ => Duration::from_secs(900),
    }
}

fn numbered_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"sitemap[-_]?[0-9]+").expect("valid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> AdaptiveTimeout {
        AdaptiveTimeout::new(DEFAULT_BASE, DEFAULT_MAX, vec!["big.test".into()])
    }

    #[test]
    fn plain_url_gets_base() {
        assert_eq!(calc().timeout_for("https://a.test/sitemap.xml"), DEFAULT_BASE);
    }

    #[test]
    fn gz_and_index_multiply() {
        let c = calc();
        assert!((c.complexity("https://a.test/sitemap.xml.gz") - 1.8).abs() < 1e-9);
        assert!((c.complexity("https://a.test/sitemap_index.xml") - 3.0).abs() < 1e-9);
        // Both factors stack.
        assert!((c.complexity("https://a.test/sitemap_index.xml.gz") - 5.4).abs() < 1e-9);
    }

    #[test]
    fn large_host_and_numbered_sitemaps() {
        let c = calc();
        assert!((c.complexity("https://www.big.test/sitemap.xml") - 2.5).abs() < 1e-9);
        assert!((c.complexity("https://a.test/sitemap-42.xml") - 1.5).abs() < 1e-9);
        assert!((c.complexity("https://a.test/de/sitemap.xml") - 1.3).abs() < 1e-9);
    }

    #[test]
    fn cheap_formats_shrink_but_clamp_to_base() {
        let c = calc();
        assert!((c.complexity("https://a.test/feed/rss.xml") - 0.8).abs() < 1e-9);
        assert!((c.complexity("https://a.test/sitemap.txt") - 0.6).abs() < 1e-9);
        // A shrinking factor never produces less than the base deadline.
        assert_eq!(c.timeout_for("https://a.test/sitemap.txt"), DEFAULT_BASE);
    }

    #[test]
    fn timeout_clamps_to_max() {
        let c = calc();
        // index (3.0) on a large host (2.5), gz (1.8) = 13.5 × base > max
        let t = c.timeout_for("https://www.big.test/sitemap_index.xml.gz");
        assert_eq!(t, DEFAULT_MAX);
    }

    #[test]
    fn progressive_tiers() {
        assert_eq!(progressive_timeout(50), Duration::from_secs(30));
        assert_eq!(progressive_timeout(100), Duration::from_secs(30));
        assert_eq!(progressive_timeout(101), Duration::from_secs(120));
        assert_eq!(progressive_timeout(10_000), Duration::from_secs(300));
        assert_eq!(progressive_timeout(50_000), Duration::from_secs(900));
    }

    #[test]
    fn larger_of_adaptive_and_progressive_wins() {
        let c = calc();
        // Adaptive says base (2 min); progressive says 5 min for 5k URLs.
        assert_eq!(
            c.timeout_with_estimate("https://a.test/sitemap.xml", Some(5_000)),
            Duration::from_secs(300)
        );
        // Progressive says 30 s for a tiny map; adaptive base still wins.
        assert_eq!(
            c.timeout_with_estimate("https://a.test/sitemap.xml", Some(10)),
            DEFAULT_BASE
        );
    }
}
