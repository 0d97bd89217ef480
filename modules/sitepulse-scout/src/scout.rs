//! One end-to-end monitoring run: acquire sitemaps through the task engine,
//! snapshot and diff per domain, dispatch keywords, stream metrics to the
//! backend, and persist the retry queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use sitepulse_archive::diff::detect_changes;
use sitepulse_archive::{SnapshotCipher, SnapshotStore, SledStore};
use sitepulse_common::safety::mask_url;
use sitepulse_common::types::short_hash;
use sitepulse_common::urls::extract_domain;
use sitepulse_common::{Config, UrlRecord};
use sitepulse_dispatch::api::HttpMetricsApi;
use sitepulse_dispatch::{BackendSubmitter, KeywordDispatcher, RetryQueue};
use sitepulse_engine::{AdaptiveTimeout, TaskEngine, TaskSpec};
use sitepulse_sitemap::chain::ChainConfig;
use sitepulse_sitemap::{KeywordExtractor, ParserChain, ResilientFetcher};

use crate::sites;
use crate::stats::{RunStats, SiteOutcome};

/// Hard ceiling for one pipeline run.
const RUN_CEILING: Duration = Duration::from_secs(30 * 60);
/// Patience when the task queue is momentarily full.
const SUBMIT_PATIENCE: Duration = Duration::from_secs(30);

pub struct Scout {
    config: Config,
    chain: Arc<ParserChain>,
    snapshots: Arc<SnapshotStore>,
    dispatcher: Arc<KeywordDispatcher>,
    submitter: Arc<BackendSubmitter>,
    retry_queue: RetryQueue,
    extractor: KeywordExtractor,
    timeouts: AdaptiveTimeout,
}

impl Scout {
    /// Wire the pipeline. Configuration and key material are validated here,
    /// before anything touches the network.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let cipher = SnapshotCipher::new(&config.encryption_key)?;

        let store = Arc::new(SledStore::open(&config.snapshot_dir)?);
        let snapshots = Arc::new(SnapshotStore::new(store.clone(), cipher));
        let retry_queue = RetryQueue::new(store);

        let fetcher = Arc::new(ResilientFetcher::new(config.sitemap_rate_limit)?);
        let chain = Arc::new(ParserChain::new(
            fetcher,
            ChainConfig {
                max_urls: config.max_urls_per_sitemap,
                filters: Vec::new(),
                txt_hosts: sites::txt_hosts(),
                empty_hosts: sites::empty_hosts(),
            },
        ));

        // The metrics service tolerates no parallelism; calls serialize, and
        // the rate limit becomes a floor on inter-call spacing.
        let inter_call_delay = effective_call_delay(
            config.api_call_delay_ms,
            config.api_rate_limit,
        );
        let api = Arc::new(HttpMetricsApi::new(Duration::from_secs(30))?);
        let dispatcher = Arc::new(KeywordDispatcher::new(
            config.trends_api_urls.clone(),
            api,
            inter_call_delay,
            3,
        )?);

        let submitter = Arc::new(BackendSubmitter::new(
            &config.backend_url,
            &config.backend_api_key,
            config.submit_batch_size,
            true,
        )?);

        Ok(Self {
            timeouts: AdaptiveTimeout::new(
                sitepulse_engine::timeout::DEFAULT_BASE,
                sitepulse_engine::timeout::DEFAULT_MAX,
                sites::large_hosts(),
            ),
            extractor: KeywordExtractor::default(),
            config,
            chain,
            snapshots,
            dispatcher,
            submitter,
            retry_queue,
        })
    }

    /// Run the whole pipeline once, bounded by the global ceiling.
    pub async fn run(&self) -> anyhow::Result<RunStats> {
        match tokio::time::timeout(RUN_CEILING, self.run_inner()).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!(
                "run exceeded the {}-minute ceiling",
                RUN_CEILING.as_secs() / 60
            ),
        }
    }

    async fn run_inner(&self) -> anyhow::Result<RunStats> {
        let started = Instant::now();
        let mut stats = RunStats {
            run_id: uuid::Uuid::new_v4().to_string(),
            ..RunStats::default()
        };

        let sitemap_urls = if self.config.sitemap_urls.is_empty() {
            sites::default_sitemaps()
        } else {
            self.config.sitemap_urls.clone()
        };
        stats.sites_total = sitemap_urls.len();
        info!(run_id = %stats.run_id, sites = sitemap_urls.len(), "Starting monitoring run");

        // Keywords that failed last run go first this run.
        let carried_over = self.retry_queue.load().await.unwrap_or_default();
        if !carried_over.is_empty() {
            info!(keywords = carried_over.len(), "Loaded retry queue from previous run");
        }

        // --- Acquisition phase ------------------------------------------
        let queue_capacity = sitemap_urls.len().max(16);
        let (engine, mut results) =
            TaskEngine::<Vec<UrlRecord>>::start(self.config.sitemap_workers, queue_capacity);

        for url in &sitemap_urls {
            let chain = self.chain.clone();
            let task_url = url.clone();
            let work = async move {
                chain
                    .parse(&task_url, None)
                    .await
                    .map_err(anyhow::Error::from)
            }
            .boxed();
            let spec = TaskSpec::new(
                short_hash(url),
                url,
                self.timeouts.timeout_for(url),
                work,
            );
            if let Err(e) = engine.submit(spec) {
                // Queue saturated: fall back to the blocking variant.
                warn!(url = %mask_url(url), error = %e, "Task queue full, waiting for a slot");
                let chain = self.chain.clone();
                let task_url = url.clone();
                let work = async move {
                    chain
                        .parse(&task_url, None)
                        .await
                        .map_err(anyhow::Error::from)
                }
                .boxed();
                let retry_spec = TaskSpec::new(
                    short_hash(url),
                    url,
                    self.timeouts.timeout_for(url),
                    work,
                );
                if let Err(e) = engine.submit_timeout(retry_spec, SUBMIT_PATIENCE).await {
                    warn!(url = %mask_url(url), error = %e, "Dropping sitemap task");
                    stats.sites_failed += 1;
                    stats.per_site.push(SiteOutcome {
                        domain: extract_domain(url),
                        success: false,
                        urls: 0,
                        error: Some(e.to_string()),
                        duration: Duration::ZERO,
                    });
                }
            }
        }
        // Let workers drain the queue; the result channel closes when the
        // last worker exits.
        tokio::spawn(engine.drain());

        let mut all_keywords: Vec<String> = carried_over;
        while let Some(result) = results.recv().await {
            let domain = extract_domain(&result.url);
            if result.success {
                let records = result.payload.unwrap_or_default();
                let enriched: Vec<UrlRecord> = records
                    .into_iter()
                    .map(|r| self.extractor.enrich(r))
                    .collect();

                stats.urls_discovered += enriched.len();
                for record in &enriched {
                    all_keywords.extend(record.keywords.iter().cloned());
                }

                self.snapshot_domain(&domain, &enriched).await;

                stats.sites_succeeded += 1;
                stats.per_site.push(SiteOutcome {
                    domain,
                    success: true,
                    urls: enriched.len(),
                    error: None,
                    duration: result.duration,
                });
            } else {
                stats.sites_failed += 1;
                stats.per_site.push(SiteOutcome {
                    domain,
                    success: false,
                    urls: 0,
                    error: result.error,
                    duration: result.duration,
                });
            }
        }

        // --- Dispatch and submission phase ------------------------------
        let keywords = KeywordDispatcher::dedup_keywords(all_keywords);
        stats.keywords_extracted = keywords.len();
        info!(keywords = keywords.len(), "Dispatching de-duplicated keyword set");

        let (metrics_tx, metrics_rx) = mpsc::channel(self.config.api_workers.max(1) * 32);
        let submitter = self.submitter.clone();
        let submit_task = tokio::spawn(async move { submitter.submit_stream(metrics_rx).await });

        let mut failed_keywords = Vec::new();
        for group in keywords.chunks(self.config.batch_size) {
            let outcome = self
                .dispatcher
                .dispatch_all(group.to_vec(), metrics_tx.clone())
                .await;
            stats.keywords_dispatched += outcome.succeeded;
            failed_keywords.extend(outcome.failed);
        }
        drop(metrics_tx);

        let report = submit_task.await.unwrap_or_default();
        stats.batches_sent = report.batches_sent;
        stats.batches_failed = report.batches_failed;
        stats.records_submitted = report.records_sent;
        for error in &report.errors {
            warn!(error = %error, "Batch failed during submission");
        }

        stats.keywords_failed = failed_keywords.len();
        stats.retry_queue_size = failed_keywords.len();
        if let Err(e) = self.retry_queue.save(&failed_keywords).await {
            warn!(error = %e, "Failed to persist retry queue");
        }

        stats.duration = started.elapsed();
        Ok(stats)
    }

    /// Snapshot one domain's URL set and log the change set against the
    /// previous snapshot. Store failures are logged, never fatal.
    async fn snapshot_domain(&self, domain: &str, urls: &[UrlRecord]) {
        let previous = match self.snapshots.load(domain).await {
            Ok(prev) => prev,
            Err(e) => {
                warn!(domain, error = %e, "Failed to load previous snapshot");
                None
            }
        };

        if let Some(previous) = previous {
            let changes = detect_changes(domain, &previous, urls);
            if !changes.is_empty() {
                info!(
                    domain,
                    added = changes.added,
                    removed = changes.removed,
                    modified = changes.modified,
                    "Domain changed since last run"
                );
                if let Err(e) = self.snapshots.record_changes(&changes).await {
                    warn!(domain, error = %e, "Failed to record change history");
                }
            }
        }

        if let Err(e) = self.snapshots.save(domain, urls).await {
            warn!(domain, error = %e, "Failed to save snapshot");
        }
    }

    /// On-demand diff of the two most recent snapshots of a domain.
    pub async fn diff_domain(&self, domain: &str) -> anyhow::Result<()> {
        let history = self.snapshots.history(domain, 2).await?;
        if history.len() < 2 {
            anyhow::bail!("need at least two snapshots of {domain} to diff");
        }
        let (_, newer) = self
            .snapshots
            .snapshot_by_time(domain, history[0].timestamp)
            .await?
            .ok_or_else(|| anyhow::anyhow!("newest snapshot payload missing"))?;
        let (_, older) = self
            .snapshots
            .snapshot_by_time(domain, history[1].timestamp)
            .await?
            .ok_or_else(|| anyhow::anyhow!("previous snapshot payload missing"))?;

        let changes = detect_changes(domain, &older, &newer);
        info!(
            domain,
            added = changes.added,
            removed = changes.removed,
            modified = changes.modified,
            "Snapshot diff"
        );
        self.snapshots.record_changes(&changes).await?;
        for entry in &changes.changes {
            info!(url = %mask_url(&entry.url), change = ?entry.change, "Change");
        }
        Ok(())
    }

    /// Print snapshot metadata history for a domain.
    pub async fn print_history(&self, domain: &str, limit: usize) -> anyhow::Result<()> {
        let history = self.snapshots.history(domain, limit).await?;
        if history.is_empty() {
            info!(domain, "No snapshots recorded");
            return Ok(());
        }
        for meta in history {
            info!(
                domain,
                timestamp = meta.timestamp,
                urls = meta.url_count,
                checksum = %meta.checksum,
                "Snapshot"
            );
        }
        Ok(())
    }
}

/// The forced inter-call delay and the rate limit are separate knobs; the
/// slower of the two wins.
fn effective_call_delay(delay_ms: u64, rate_limit: f64) -> Duration {
    let forced = Duration::from_millis(delay_ms);
    if rate_limit > 0.0 {
        forced.max(Duration::from_secs_f64(1.0 / rate_limit))
    } else {
        forced
    }
}
