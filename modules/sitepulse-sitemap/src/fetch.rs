//! Resilient sitemap downloads.
//!
//! One shared connection pool for the whole run. Four header profiles are
//! rotated until a response comes back 200, with exponential backoff between
//! attempts. Gzip payloads (`.gz` URLs or `Content-Encoding: gzip`) are
//! decoded before the bytes are handed to the parser chain.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use sitepulse_common::error::{status_is_retryable, SitepulseError};
use sitepulse_common::safety::mask_url;
use sitepulse_common::urls::{extract_domain, validate_url};

const DESKTOP_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:126.0) Gecko/20100101 Firefox/126.0",
];

const BOT_AGENT: &str = "SitepulseBot/0.1 (+sitemap monitoring)";
const MINIMAL_AGENT: &str = "sitepulse/0.1";

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Request header profiles, tried in order until one gets HTTP 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    StandardBrowser,
    SessionSimulation,
    RobotsCompliant,
    Minimal,
}

const ALL_PROFILES: &[Profile] = &[
    Profile::StandardBrowser,
    Profile::SessionSimulation,
    Profile::RobotsCompliant,
    Profile::Minimal,
];

/// Download seam between the fetcher and the parser chain. The chain's
/// normal strategies use `download`; the hybrid strategy and the
/// empty-content alternates force `download_resilient`.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Standard-browser profile with retry and backoff.
    async fn download(&self, url: &str) -> Result<Vec<u8>, SitepulseError>;

    /// Full anti-bot rotation across all four header profiles.
    async fn download_resilient(&self, url: &str) -> Result<Vec<u8>, SitepulseError>;
}

/// HTTP downloader with header rotation, backoff, per-host rate limiting and
/// gzip decoding. Holds exactly one `reqwest::Client` for its lifetime; the
/// pool is shared across every worker in the run.
pub struct ResilientFetcher {
    client: reqwest::Client,
    limiter: HostLimiter,
}

impl ResilientFetcher {
    /// `rate_limit` is requests per second per host; 0 disables limiting.
    pub fn new(rate_limit: f64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            // Decoding is explicit below so `.gz` URLs and header-marked
            // bodies go through the same path.
            .gzip(false)
            .build()?;
        Ok(Self {
            client,
            limiter: HostLimiter::new(rate_limit),
        })
    }

    async fn fetch_with_profiles(
        &self,
        url: &str,
        profiles: &[Profile],
    ) -> Result<Vec<u8>, SitepulseError> {
        validate_url(url)?;
        let host = extract_domain(url);

        let mut last_err: Option<SitepulseError> = None;
        for (attempt, profile) in profiles.iter().enumerate() {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt as u32)).await;
            }
            self.limiter.acquire(&host).await;

            if *profile == Profile::RobotsCompliant {
                // Polite bots do not hammer; a short random pause before the
                // conservative profile keeps us under burst detectors.
                let pause = rand::rng().random_range(1000..4000);
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }

            match self.attempt(url, *profile).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    let retryable = match &e {
                        SitepulseError::Http { status, .. } => status_is_retryable(*status),
                        SitepulseError::Network(msg) => {
                            sitepulse_common::error::is_retryable(msg)
                        }
                        _ => false,
                    };
                    if !retryable {
                        return Err(e);
                    }
                    debug!(
                        url = %mask_url(url),
                        attempt = attempt + 1,
                        error = %e,
                        "Fetch attempt failed, rotating profile"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            SitepulseError::Network(format!("no fetch attempt made for {}", mask_url(url)))
        }))
    }

    async fn attempt(&self, url: &str, profile: Profile) -> Result<Vec<u8>, SitepulseError> {
        let host = extract_domain(url);
        let resp = self
            .client
            .get(url)
            .headers(profile_headers(url, profile))
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(SitepulseError::from_status(status, &host));
        }

        let gzip_encoded = resp
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("gzip"))
            .unwrap_or(false);

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SitepulseError::Network(format!("body read failed: {e}")))?;

        if gzip_encoded || url.ends_with(".gz") || looks_gzipped(&bytes) {
            gunzip(&bytes)
        } else {
            Ok(bytes.to_vec())
        }
    }
}

#[async_trait]
impl Downloader for ResilientFetcher {
    async fn download(&self, url: &str) -> Result<Vec<u8>, SitepulseError> {
        // Standard profile twice before giving up keeps the cheap path cheap.
        self.fetch_with_profiles(url, &[Profile::StandardBrowser, Profile::StandardBrowser])
            .await
    }

    async fn download_resilient(&self, url: &str) -> Result<Vec<u8>, SitepulseError> {
        self.fetch_with_profiles(url, ALL_PROFILES).await
    }
}

fn profile_headers(url: &str, profile: Profile) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match profile {
        Profile::StandardBrowser => {
            headers.insert(reqwest::header::USER_AGENT, agent_for(url));
            headers.insert(
                reqwest::header::ACCEPT,
                HeaderValue::from_static(
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                ),
            );
            headers.insert(
                reqwest::header::ACCEPT_LANGUAGE,
                HeaderValue::from_static("en-US,en;q=0.9"),
            );
            headers.insert(
                reqwest::header::ACCEPT_ENCODING,
                HeaderValue::from_static("gzip, deflate"),
            );
            headers.insert(reqwest::header::CONNECTION, HeaderValue::from_static("keep-alive"));
        }
        Profile::SessionSimulation => {
            headers.insert(reqwest::header::USER_AGENT, agent_for(url));
            headers.insert(
                reqwest::header::ACCEPT,
                HeaderValue::from_static("application/xml,text/xml;q=0.9,*/*;q=0.8"),
            );
            headers.insert(
                reqwest::header::ACCEPT_LANGUAGE,
                HeaderValue::from_static("en-US,en;q=0.9"),
            );
            headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
            headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
            headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
            if let Some(referer) = origin_of(url) {
                if let Ok(v) = HeaderValue::from_str(&referer) {
                    headers.insert(reqwest::header::REFERER, v);
                }
            }
        }
        Profile::RobotsCompliant => {
            headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(BOT_AGENT));
            headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
            headers.insert(
                reqwest::header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache"),
            );
        }
        Profile::Minimal => {
            headers.insert(
                reqwest::header::USER_AGENT,
                HeaderValue::from_static(MINIMAL_AGENT),
            );
            headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        }
    }
    headers
}

/// Deterministic desktop User-Agent per URL, so one host always sees the
/// same browser identity across attempts and runs.
fn agent_for(url: &str) -> HeaderValue {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let idx = (hasher.finish() as usize) % DESKTOP_AGENTS.len();
    HeaderValue::from_static(DESKTOP_AGENTS[idx])
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    Some(format!("{}://{}/", parsed.scheme(), parsed.host_str()?))
}

/// Exponential backoff with ±25% jitter: 500ms, 1s, 2s, ... capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1));
    let capped = base.min(BACKOFF_CAP);
    let jitter = rand::rng().random_range(0.75..1.25);
    capped.mul_f64(jitter)
}

fn looks_gzipped(bytes: &[u8]) -> bool {
    bytes.len() > 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, SitepulseError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| SitepulseError::Parsing(format!("gzip decode failed: {e}")))?;
    Ok(out)
}

fn map_reqwest_error(e: &reqwest::Error) -> SitepulseError {
    if e.is_timeout() {
        SitepulseError::Network("request timed out".to_string())
    } else if e.is_connect() {
        SitepulseError::Network(format!("connection failed: {e}"))
    } else {
        SitepulseError::Network(e.to_string())
    }
}

/// Per-host minimum-interval limiter. A token per host, refilled by time;
/// callers sleep until their host's slot opens.
struct HostLimiter {
    min_interval: Option<Duration>,
    last: Mutex<HashMap<String, Instant>>,
}

impl HostLimiter {
    fn new(rate_limit: f64) -> Self {
        let min_interval = if rate_limit > 0.0 {
            Some(Duration::from_secs_f64(1.0 / rate_limit))
        } else {
            None
        };
        Self {
            min_interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, host: &str) {
        let Some(interval) = self.min_interval else {
            return;
        };
        let wait_until = {
            let mut last = self.last.lock().await;
            let now = Instant::now();
            let next = match last.get(host) {
                Some(prev) => (*prev + interval).max(now),
                None => now,
            };
            last.insert(host.to_string(), next);
            next
        };
        let now = Instant::now();
        if wait_until > now {
            tokio::time::sleep_until(wait_until).await;
        }
    }
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher").finish_non_exhaustive()
    }
}
