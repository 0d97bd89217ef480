//! Run summary assembled by the orchestrator.

use std::time::Duration;

/// Outcome of one sitemap task, kept for the per-site summary table.
#[derive(Debug, Clone)]
pub struct SiteOutcome {
    pub domain: String,
    pub success: bool,
    pub urls: usize,
    pub error: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub run_id: String,
    pub sites_total: usize,
    pub sites_succeeded: usize,
    pub sites_failed: usize,
    pub urls_discovered: usize,
    pub keywords_extracted: usize,
    pub keywords_dispatched: usize,
    pub keywords_failed: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub records_submitted: usize,
    pub retry_queue_size: usize,
    pub duration: Duration,
    pub per_site: Vec<SiteOutcome>,
}

impl RunStats {
    pub fn success_rate(&self) -> f64 {
        if self.sites_total == 0 {
            return 0.0;
        }
        self.sites_succeeded as f64 / self.sites_total as f64 * 100.0
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Sitepulse Run Complete ===")?;
        writeln!(f, "Sites processed:    {}", self.sites_total)?;
        writeln!(f, "Sites succeeded:    {}", self.sites_succeeded)?;
        writeln!(f, "Sites failed:       {}", self.sites_failed)?;
        writeln!(f, "URLs discovered:    {}", self.urls_discovered)?;
        writeln!(f, "Keywords extracted: {}", self.keywords_extracted)?;
        writeln!(f, "Keywords fetched:   {}", self.keywords_dispatched)?;
        writeln!(f, "Keywords failed:    {}", self.keywords_failed)?;
        writeln!(f, "Batches sent:       {}", self.batches_sent)?;
        writeln!(f, "Batches failed:     {}", self.batches_failed)?;
        writeln!(f, "Records submitted:  {}", self.records_submitted)?;
        writeln!(f, "Retry queue:        {}", self.retry_queue_size)?;
        writeln!(f, "Duration:           {:.1}s", self.duration.as_secs_f64())?;
        writeln!(f, "Success rate:       {:.0}%", self.success_rate())?;
        if !self.per_site.is_empty() {
            writeln!(f, "\nPer site:")?;
            for site in &self.per_site {
                if site.success {
                    writeln!(
                        f,
                        "  {} ok, {} urls in {:.1}s",
                        site.domain,
                        site.urls,
                        site.duration.as_secs_f64()
                    )?;
                } else {
                    writeln!(
                        f,
                        "  {} FAILED: {}",
                        site.domain,
                        site.error.as_deref().unwrap_or("unknown error")
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_handles_empty_run() {
        assert_eq!(RunStats::default().success_rate(), 0.0);
    }

    #[test]
    fn display_includes_per_site_failures() {
        let stats = RunStats {
            sites_total: 2,
            sites_succeeded: 1,
            sites_failed: 1,
            per_site: vec![
                SiteOutcome {
                    domain: "a.test".into(),
                    success: true,
                    urls: 3,
                    error: None,
                    duration: Duration::from_secs(2),
                },
                SiteOutcome {
                    domain: "b.test".into(),
                    success: false,
                    urls: 0,
                    error: Some("HTTP 403".into()),
                    duration: Duration::from_secs(1),
                },
            ],
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("a.test ok, 3 urls"));
        assert!(text.contains("b.test FAILED: HTTP 403"));
        assert!(text.contains("Success rate:       50%"));
    }
}
