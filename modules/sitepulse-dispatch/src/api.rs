//! Keyword-metrics service types and HTTP client.
//!
//! The service returns search-volume metrics for one keyword per call. Some
//! deployments serialize `year`/`month` as strings, others as numbers; the
//! deserializer accepts both.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use sitepulse_common::error::SitepulseError;
use sitepulse_common::urls::extract_domain;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlySearches {
    #[serde(deserialize_with = "flexible_u32")]
    pub year: u32,
    #[serde(deserialize_with = "flexible_u32")]
    pub month: u32,
    #[serde(default)]
    pub searches: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataQuality {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub has_missing_months: bool,
    #[serde(default)]
    pub only_last_month_has_data: bool,
    #[serde(default)]
    pub total_months: u32,
    #[serde(default)]
    pub available_months: u32,
    #[serde(default)]
    pub missing_months_count: u32,
    #[serde(default)]
    pub missing_months: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsResponse {
    #[serde(default)]
    pub avg_monthly_searches: u64,
    #[serde(default)]
    pub latest_searches: u64,
    #[serde(default)]
    pub max_monthly_searches: u64,
    #[serde(default)]
    pub competition: String,
    #[serde(default)]
    pub competition_index: u32,
    #[serde(default)]
    pub low_top_of_page_bid_micro: u64,
    #[serde(default)]
    pub high_top_of_page_bid_micro: u64,
    #[serde(default)]
    pub monthly_searches: Vec<MonthlySearches>,
    #[serde(default)]
    pub data_quality: DataQuality,
}

/// One record of the backend submission payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordMetric {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub metrics: MetricsResponse,
}

fn flexible_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s
            .trim()
            .parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid numeric string: {e}"))),
    }
}

/// Seam for the metrics service so the dispatcher can be exercised without
/// a live endpoint.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn fetch(&self, endpoint: &str, keyword: &str)
        -> Result<MetricsResponse, SitepulseError>;
}

pub struct HttpMetricsApi {
    client: reqwest::Client,
}

impl HttpMetricsApi {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetricsApi for HttpMetricsApi {
    async fn fetch(
        &self,
        endpoint: &str,
        keyword: &str,
    ) -> Result<MetricsResponse, SitepulseError> {
        let resp = self
            .client
            .get(endpoint)
            .query(&[("keyword", keyword)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SitepulseError::Network("metrics request timed out".into())
                } else {
                    SitepulseError::Network(format!("metrics request failed: {e}"))
                }
            })?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(SitepulseError::from_status(status, &extract_domain(endpoint)));
        }

        resp.json::<MetricsResponse>()
            .await
            .map_err(|e| SitepulseError::Parsing(format!("metrics response malformed: {e}")))
    }
}
