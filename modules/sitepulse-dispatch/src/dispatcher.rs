//! Keyword dispatch against the metrics service: strictly sequential calls,
//! round-robin across mirror endpoints, a circuit breaker per endpoint, and
//! a retry list for keywords that exhaust their budget.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sitepulse_common::error::SitepulseError;
use sitepulse_common::safety::mask_keywords;
use sitepulse_common::types::normalize_phrase;

use crate::api::{KeywordMetric, MetricsApi};
use crate::breaker::CircuitBreaker;
use crate::serial::SerialExecutor;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_BASE_COOLDOWN: Duration = Duration::from_secs(30);
const DEFAULT_MAX_COOLDOWN: Duration = Duration::from_secs(600);

struct MirrorEndpoint {
    url: String,
    breaker: CircuitBreaker,
    failures: AtomicU64,
}

/// Totals for one dispatch run.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub succeeded: usize,
    /// Keywords that exhausted their retry budget; fed to the retry queue.
    pub failed: Vec<String>,
}

pub struct KeywordDispatcher {
    endpoints: Vec<MirrorEndpoint>,
    next_endpoint: AtomicUsize,
    serial: SerialExecutor,
    api: Arc<dyn MetricsApi>,
    /// Call attempts per keyword before it lands on the retry queue.
    per_keyword_attempts: u32,
}

impl KeywordDispatcher {
    pub fn new(
        endpoint_urls: Vec<String>,
        api: Arc<dyn MetricsApi>,
        inter_call_delay: Duration,
        per_keyword_attempts: u32,
    ) -> Result<Self, SitepulseError> {
        if endpoint_urls.is_empty() {
            return Err(SitepulseError::Config(
                "at least one metrics endpoint is required".into(),
            ));
        }
        let endpoints = endpoint_urls
            .into_iter()
            .map(|url| MirrorEndpoint {
                url,
                breaker: CircuitBreaker::new(
                    DEFAULT_FAILURE_THRESHOLD,
                    DEFAULT_BASE_COOLDOWN,
                    DEFAULT_MAX_COOLDOWN,
                ),
                failures: AtomicU64::new(0),
            })
            .collect();
        Ok(Self {
            endpoints,
            next_endpoint: AtomicUsize::new(0),
            serial: SerialExecutor::new(inter_call_delay),
            api,
            per_keyword_attempts: per_keyword_attempts.max(1),
        })
    }

    /// Normalize and globally de-duplicate a keyword set, preserving first
    /// occurrence order.
    pub fn dedup_keywords(keywords: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        keywords
            .into_iter()
            .map(|k| normalize_phrase(&k))
            .filter(|k| !k.is_empty())
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }

    /// Fetch metrics for one keyword, rotating endpoints on failure.
    pub async fn dispatch(&self, keyword: &str) -> Result<KeywordMetric, SitepulseError> {
        let mut last_err: Option<SitepulseError> = None;

        for _ in 0..self.per_keyword_attempts {
            let Some(endpoint) = self.pick_endpoint() else {
                last_err = Some(SitepulseError::CircuitOpen("all mirrors".into()));
                break;
            };

            let result = self
                .serial
                .run(self.api.fetch(&endpoint.url, keyword))
                .await;

            match result {
                Ok(metrics) => {
                    endpoint.breaker.record_success();
                    return Ok(KeywordMetric {
                        keyword: keyword.to_string(),
                        url: None,
                        metrics,
                    });
                }
                Err(e) => {
                    endpoint.breaker.record_failure();
                    endpoint.failures.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %e, "Metrics call failed, advancing mirror");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| SitepulseError::Network("dispatch failed".into())))
    }

    /// Dispatch a whole keyword set in order, streaming successes into
    /// `results_tx` so backend submission overlaps acquisition. Failures
    /// collect into the outcome for the retry queue.
    pub async fn dispatch_all(
        &self,
        keywords: Vec<String>,
        results_tx: mpsc::Sender<KeywordMetric>,
    ) -> DispatchOutcome {
        info!(batch = %mask_keywords(&keywords), "Dispatching keyword set");
        let mut outcome = DispatchOutcome::default();

        for keyword in keywords {
            match self.dispatch(&keyword).await {
                Ok(metric) => {
                    outcome.succeeded += 1;
                    if results_tx.send(metric).await.is_err() {
                        warn!("Result consumer closed, stopping dispatch");
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Keyword exhausted its retry budget");
                    outcome.failed.push(keyword);
                }
            }
        }

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed.len(),
            "Dispatch complete"
        );
        outcome
    }

    /// Round-robin over endpoints, skipping those whose breaker is open.
    fn pick_endpoint(&self) -> Option<&MirrorEndpoint> {
        let n = self.endpoints.len();
        for _ in 0..n {
            let idx = self.next_endpoint.fetch_add(1, Ordering::Relaxed) % n;
            let endpoint = &self.endpoints[idx];
            if endpoint.breaker.try_acquire() {
                return Some(endpoint);
            }
        }
        None
    }

    /// Recorded failures per endpoint, for the run summary.
    pub fn endpoint_failures(&self) -> Vec<(String, u64)> {
        self.endpoints
            .iter()
            .map(|e| (e.url.clone(), e.failures.load(Ordering::Relaxed)))
            .collect()
    }
}
