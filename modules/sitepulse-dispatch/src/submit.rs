//! Batched backend submission.
//!
//! Records stream in from the dispatcher, fill fixed-size batches, and each
//! batch is JSON-encoded, gzip-compressed and POSTed independently. A failed
//! batch is recorded and the run keeps going — delivery is at-least-once
//! with idempotent batches.

use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sitepulse_common::error::SitepulseError;

use crate::api::KeywordMetric;

const SUBMIT_PATH: &str = "/api/v1/keyword-metrics/batch";
const BODY_PREFIX_LIMIT: usize = 200;

#[derive(Debug, Default)]
pub struct SubmitReport {
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub records_sent: usize,
    /// One entry per failed batch: short error description.
    pub errors: Vec<String>,
}

pub struct BackendSubmitter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    batch_size: usize,
    compress: bool,
}

impl BackendSubmitter {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        batch_size: usize,
        compress: bool,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            batch_size: batch_size.max(1),
            compress,
        })
    }

    /// Consume the dispatcher's result stream, submitting every time a batch
    /// fills; the final partial batch goes out when the stream ends.
    pub async fn submit_stream(&self, mut rx: mpsc::Receiver<KeywordMetric>) -> SubmitReport {
        let mut report = SubmitReport::default();
        let mut batch: Vec<KeywordMetric> = Vec::with_capacity(self.batch_size);

        while let Some(record) = rx.recv().await {
            batch.push(record);
            if batch.len() >= self.batch_size {
                self.flush(&mut batch, &mut report).await;
            }
        }
        if !batch.is_empty() {
            self.flush(&mut batch, &mut report).await;
        }
        report
    }

    /// Submit a fully-materialized record set in `batch_size` chunks.
    pub async fn submit_all(&self, records: &[KeywordMetric]) -> SubmitReport {
        let mut report = SubmitReport::default();
        for chunk in records.chunks(self.batch_size) {
            let mut batch = chunk.to_vec();
            self.flush(&mut batch, &mut report).await;
        }
        report
    }

    async fn flush(&self, batch: &mut Vec<KeywordMetric>, report: &mut SubmitReport) {
        let size = batch.len();
        match self.post_batch(batch).await {
            Ok(()) => {
                report.batches_sent += 1;
                report.records_sent += size;
                debug!(records = size, "Batch submitted");
            }
            Err(e) => {
                report.batches_failed += 1;
                report.errors.push(e.to_string());
                warn!(records = size, error = %e, "Batch submission failed");
            }
        }
        batch.clear();
    }

    async fn post_batch(&self, batch: &[KeywordMetric]) -> Result<(), SitepulseError> {
        let url = format!("{}{SUBMIT_PATH}", self.base_url);
        let json = serde_json::to_vec(batch)
            .map_err(|e| SitepulseError::Parsing(format!("encode batch: {e}")))?;

        let mut request = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        let body = if self.compress {
            request = request.header(reqwest::header::CONTENT_ENCODING, "gzip");
            gzip_bytes(&json)?
        } else {
            json
        };

        let resp = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                SitepulseError::Network("backend request timed out".into())
            } else {
                SitepulseError::Network(format!("backend request failed: {e}"))
            }
        })?;

        let status = resp.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let prefix: String = body.chars().take(BODY_PREFIX_LIMIT).collect();
        Err(SitepulseError::Network(format!(
            "backend returned status {status}: {prefix}"
        )))
    }
}

fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>, SitepulseError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SitepulseError::Network(format!("gzip encode: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SitepulseError::Network(format!("gzip encode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MetricsResponse;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn record(keyword: &str) -> KeywordMetric {
        KeywordMetric {
            keyword: keyword.to_string(),
            url: None,
            metrics: MetricsResponse::default(),
        }
    }

    #[test]
    fn gzip_round_trips() {
        let json = serde_json::to_vec(&vec![record("chess")]).unwrap();
        let compressed = gzip_bytes(&json).unwrap();
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, json);
    }

    #[test]
    fn batch_payload_shape() {
        let records = vec![record("chess"), record("racing games")];
        let json = serde_json::to_string(&records).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["keyword"], "chess");
        assert!(arr[0]["metrics"]["monthly_searches"].is_array());
        // `url` is omitted when absent, not serialized as null.
        assert!(arr[0].get("url").is_none());
    }

    #[test]
    fn chunking_never_exceeds_batch_size() {
        let records: Vec<KeywordMetric> = (0..7).map(|i| record(&format!("kw{i}"))).collect();
        let sizes: Vec<usize> = records.chunks(3).map(<[KeywordMetric]>::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }
}
