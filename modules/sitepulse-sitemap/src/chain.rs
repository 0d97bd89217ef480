//! The parser strategy chain.
//!
//! Strategies run in a fixed order until one produces URLs. Pre-selection
//! can jump into the middle of the chain based on the URL shape and errors
//! seen on previous runs, but everything after the entry point is still
//! attempted on failure.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use sitepulse_common::error::{classify, ErrorClass, SitepulseError};
use sitepulse_common::safety::mask_url;
use sitepulse_common::urls::extract_domain;
use sitepulse_common::UrlRecord;

use crate::encoding::{clean_xml, decode_lenient, extract_urls_regex};
use crate::feed::{looks_like_feed, parse_feed};
use crate::fetch::Downloader;
use crate::filters::{apply_filters, UrlFilter};
use crate::scrape::{alternate_urls, is_empty_or_error_page, robots_sitemaps, scrape_game_urls};
use crate::txt::parse_txt;
use crate::xml::parse_sitemap;

/// Concurrent sub-sitemap fetches inside one index expansion. Kept low to
/// avoid hot-spotting a single origin.
const INDEX_CONCURRENCY: usize = 2;
const MAX_INDEX_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strategy {
    Xml,
    Feed,
    Txt,
    EncodingSafe,
    Hybrid,
    EmptyContent,
}

const CHAIN_ORDER: &[Strategy] = &[
    Strategy::Xml,
    Strategy::Feed,
    Strategy::Txt,
    Strategy::EncodingSafe,
    Strategy::Hybrid,
    Strategy::EmptyContent,
];

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Xml => "xml",
            Strategy::Feed => "feed",
            Strategy::Txt => "txt",
            Strategy::EncodingSafe => "encoding_safe",
            Strategy::Hybrid => "hybrid",
            Strategy::EmptyContent => "empty_content",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    pub max_urls: usize,
    pub filters: Vec<UrlFilter>,
    /// Hosts known to serve TXT sitemaps; pre-selected to the TXT strategy.
    pub txt_hosts: Vec<String>,
    /// Hosts known to serve blank or error-page sitemaps.
    pub empty_hosts: Vec<String>,
}

impl ChainConfig {
    pub fn with_max_urls(max_urls: usize) -> Self {
        Self {
            max_urls,
            ..Self::default()
        }
    }
}

pub struct ParserChain {
    fetcher: Arc<dyn Downloader>,
    config: ChainConfig,
}

impl ParserChain {
    pub fn new(fetcher: Arc<dyn Downloader>, config: ChainConfig) -> Self {
        Self { fetcher, config }
    }

    fn max_urls(&self) -> usize {
        if self.config.max_urls == 0 {
            100_000
        } else {
            self.config.max_urls
        }
    }

    /// Entry strategy for a URL, given the error its site produced on a
    /// previous run (if any).
    pub fn select_start(&self, url: &str, prior_error: Option<&str>) -> Strategy {
        let host = extract_domain(url);
        if url.to_lowercase().ends_with(".txt") || self.config.txt_hosts.contains(&host) {
            return Strategy::Txt;
        }
        if self.config.empty_hosts.contains(&host) {
            return Strategy::EmptyContent;
        }
        if let Some(prior) = prior_error {
            match classify(prior) {
                ErrorClass::Parsing => return Strategy::EncodingSafe,
                ErrorClass::Http => return Strategy::Hybrid,
                _ => {}
            }
        }
        if looks_like_feed(url, b"") {
            return Strategy::Feed;
        }
        Strategy::Xml
    }

    /// Run the chain from its pre-selected entry point.
    pub async fn parse(
        &self,
        url: &str,
        prior_error: Option<&str>,
    ) -> Result<Vec<UrlRecord>, SitepulseError> {
        let start = self.select_start(url, prior_error);
        self.parse_from(url, start).await
    }

    /// Run the chain from `start` to the end, returning the first non-empty,
    /// validated, de-duplicated result.
    pub async fn parse_from(
        &self,
        url: &str,
        start: Strategy,
    ) -> Result<Vec<UrlRecord>, SitepulseError> {
        // One plain download shared by the content-based strategies; the
        // hybrid and empty-content strategies fetch for themselves.
        let body = match self.fetcher.download(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(url = %mask_url(url), error = %e, "Plain download failed, deferring to resilient strategies");
                None
            }
        };

        let mut last_err: Option<SitepulseError> = None;
        for strategy in CHAIN_ORDER.iter().filter(|s| **s >= start) {
            match self.run_strategy(*strategy, url, body.as_deref()).await {
                Ok(records) if !records.is_empty() => {
                    let finalized = self.finalize(records);
                    if !finalized.is_empty() {
                        info!(
                            url = %mask_url(url),
                            strategy = strategy.name(),
                            urls = finalized.len(),
                            "Sitemap parsed"
                        );
                        return Ok(finalized);
                    }
                }
                Ok(_) => {
                    debug!(url = %mask_url(url), strategy = strategy.name(), "Strategy produced no URLs");
                }
                Err(e) => {
                    debug!(url = %mask_url(url), strategy = strategy.name(), error = %e, "Strategy failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| SitepulseError::EmptyContent(mask_url(url))))
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        url: &str,
        body: Option<&[u8]>,
    ) -> Result<Vec<UrlRecord>, SitepulseError> {
        match strategy {
            Strategy::Xml => {
                let bytes = require_body(body, url)?;
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    SitepulseError::Encoding(format!("encoding error: not UTF-8: {e}"))
                })?;
                self.parse_xml_tree(text, 0).await
            }
            Strategy::Feed => {
                let bytes = require_body(body, url)?;
                if !looks_like_feed(url, bytes) {
                    return Err(SitepulseError::Parsing("not an RSS/Atom feed".into()));
                }
                parse_feed(bytes)
            }
            Strategy::Txt => {
                let bytes = require_body(body, url)?;
                let text = String::from_utf8_lossy(bytes);
                Ok(parse_txt(&text, self.max_urls()))
            }
            Strategy::EncodingSafe => {
                let bytes = require_body(body, url)?;
                self.parse_encoding_safe(url, bytes).await
            }
            Strategy::Hybrid => {
                let bytes = self.fetcher.download_resilient(url).await?;
                self.parse_encoding_safe(url, &bytes).await
            }
            Strategy::EmptyContent => {
                let blank = body
                    .map(|b| is_empty_or_error_page(&String::from_utf8_lossy(b)))
                    .unwrap_or(true);
                if !blank {
                    // The payload has real content; earlier strategies were
                    // the right tool and this one has nothing to add.
                    return Err(SitepulseError::Parsing(
                        "content present, empty-content handler not applicable".into(),
                    ));
                }
                self.parse_alternates(url).await
            }
        }
    }

    /// Encoding-safe parse: transform-decode, then structural parse, then
    /// cleaning, then the regex fallback.
    async fn parse_encoding_safe(
        &self,
        url: &str,
        bytes: &[u8],
    ) -> Result<Vec<UrlRecord>, SitepulseError> {
        let decoded = decode_lenient(bytes);

        match self.parse_xml_tree(&decoded, 0).await {
            Ok(records) if !records.is_empty() => return Ok(records),
            _ => {}
        }

        let cleaned = clean_xml(&decoded);
        match self.parse_xml_tree(&cleaned, 0).await {
            Ok(records) if !records.is_empty() => return Ok(records),
            _ => {}
        }

        let candidates = extract_urls_regex(&cleaned);
        if candidates.is_empty() {
            return Err(SitepulseError::Parsing(
                "encoding-safe parse found no URLs".into(),
            ));
        }
        Ok(candidates
            .into_iter()
            .take(self.max_urls())
            .map(|u| UrlRecord::new(u).with_property("source", "regex"))
            .collect())
    }

    /// Parse one XML document; a sitemapindex is expanded recursively with
    /// bounded concurrency per chain.
    fn parse_xml_tree<'a>(
        &'a self,
        text: &'a str,
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<UrlRecord>, SitepulseError>> {
        async move {
            let parsed = parse_sitemap(text, self.max_urls())?;
            let mut records = parsed.urls;

            if parsed.sub_sitemaps.is_empty() || depth >= MAX_INDEX_DEPTH {
                return Ok(records);
            }

            let semaphore = Arc::new(Semaphore::new(INDEX_CONCURRENCY));
            let expansions = parsed.sub_sitemaps.iter().map(|sub_url| {
                let semaphore = semaphore.clone();
                async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return Vec::new(),
                    };
                    let bytes = match self.fetcher.download(sub_url).await {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!(url = %mask_url(sub_url), error = %e, "Sub-sitemap fetch failed");
                            return Vec::new();
                        }
                    };
                    let text = decode_lenient(&bytes);
                    match self.parse_xml_tree(&text, depth + 1).await {
                        Ok(records) => {
                            debug!(url = %mask_url(sub_url), urls = records.len(), "Sub-sitemap parsed");
                            records
                        }
                        Err(e) => {
                            warn!(url = %mask_url(sub_url), error = %e, "Sub-sitemap parse failed");
                            Vec::new()
                        }
                    }
                }
            });

            let sub_results = futures::future::join_all(expansions).await;
            for sub in sub_results {
                if records.len() >= self.max_urls() {
                    break;
                }
                let room = self.max_urls() - records.len();
                records.extend(sub.into_iter().take(room));
            }
            Ok(records)
        }
        .boxed()
    }

    /// Strategy 5: probe the alternate locations under the same origin,
    /// follow robots.txt sitemap directives, and finally scrape likely
    /// game-index pages.
    async fn parse_alternates(&self, url: &str) -> Result<Vec<UrlRecord>, SitepulseError> {
        for alternate in alternate_urls(url) {
            let bytes = match self.fetcher.download_resilient(&alternate).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(url = %mask_url(&alternate), error = %e, "Alternate fetch failed");
                    continue;
                }
            };
            let text = decode_lenient(&bytes);
            if is_empty_or_error_page(&text) {
                continue;
            }

            let records = if alternate.ends_with("robots.txt") {
                let mut collected = Vec::new();
                for sitemap_url in robots_sitemaps(&text) {
                    let Ok(bytes) = self.fetcher.download_resilient(&sitemap_url).await else {
                        continue;
                    };
                    let sub_text = decode_lenient(&bytes);
                    if let Ok(records) = self.parse_any(&sub_text).await {
                        collected.extend(records);
                    }
                }
                collected
            } else {
                self.parse_any(&text).await.unwrap_or_default()
            };

            if !records.is_empty() {
                info!(
                    url = %mask_url(url),
                    alternate = %mask_url(&alternate),
                    urls = records.len(),
                    "Alternate sitemap location succeeded"
                );
                return Ok(records
                    .into_iter()
                    .map(|r| r.with_property("source", "alternate"))
                    .collect());
            }
        }

        let scraped = scrape_game_urls(self.fetcher.as_ref(), url).await?;
        if scraped.is_empty() {
            Err(SitepulseError::EmptyContent(mask_url(url)))
        } else {
            Ok(scraped)
        }
    }

    /// Best-effort parse of an alternate payload by shape: XML tree, then
    /// TXT lines.
    async fn parse_any(&self, text: &str) -> Result<Vec<UrlRecord>, SitepulseError> {
        if let Ok(records) = self.parse_xml_tree(text, 0).await {
            if !records.is_empty() {
                return Ok(records);
            }
        }
        let records = parse_txt(text, self.max_urls());
        if records.is_empty() {
            Err(SitepulseError::Parsing("alternate payload yielded no URLs".into()))
        } else {
            Ok(records)
        }
    }

    /// De-duplicate by address and apply exclusion filters.
    fn finalize(&self, records: Vec<UrlRecord>) -> Vec<UrlRecord> {
        let mut seen = HashSet::new();
        let deduped: Vec<UrlRecord> = records
            .into_iter()
            .filter(|r| seen.insert(r.address.clone()))
            .take(self.max_urls())
            .collect();
        apply_filters(deduped, &self.config.filters)
    }
}

fn require_body<'a>(body: Option<&'a [u8]>, url: &str) -> Result<&'a [u8], SitepulseError> {
    body.ok_or_else(|| {
        SitepulseError::Network(format!("no content downloaded for {}", mask_url(url)))
    })
}
