//! Curated monitoring targets and per-host tuning hints.

/// Default sitemap set, used when `SITEMAP_URLS` is empty.
pub const DEFAULT_SITEMAP_URLS: &[&str] = &[
    "https://www.crazygames.com/sitemap-index.xml",
    "https://poki.com/sitemap.xml",
    "https://www.miniclip.com/sitemap.xml",
    "https://itch.io/sitemap.xml",
    "https://www.kongregate.com/sitemap.xml",
    "https://armorgames.com/sitemap.xml",
    "https://www.addictinggames.com/sitemap.xml",
    "https://www.y8.com/sitemap.xml",
];

/// Hosts whose sitemaps run to hundreds of thousands of entries; the
/// adaptive timeout grants them extra room.
pub const LARGE_HOSTS: &[&str] = &["itch.io", "crazygames.com", "y8.com"];

/// Hosts known to publish TXT sitemaps.
pub const TXT_HOSTS: &[&str] = &[];

/// Hosts known to answer the canonical sitemap path with an error page.
pub const EMPTY_HOSTS: &[&str] = &[];

pub fn default_sitemaps() -> Vec<String> {
    DEFAULT_SITEMAP_URLS.iter().map(|s| s.to_string()).collect()
}

pub fn large_hosts() -> Vec<String> {
    LARGE_HOSTS.iter().map(|s| s.to_string()).collect()
}

pub fn txt_hosts() -> Vec<String> {
    TXT_HOSTS.iter().map(|s| s.to_string()).collect()
}

pub fn empty_hosts() -> Vec<String> {
    EMPTY_HOSTS.iter().map(|s| s.to_string()).collect()
}
