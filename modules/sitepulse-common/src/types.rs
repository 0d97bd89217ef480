use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single URL extracted from a sitemap, together with everything the rest
/// of the pipeline learns about it. Created by the parser chain, enriched
/// with keywords by the extractor, then either snapshotted or dispatched —
/// never mutated after that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlRecord {
    /// Stable identifier: short hash of the address.
    pub id: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Small property bag: source parser, original line, priority.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl UrlRecord {
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: short_hash(&address),
            address,
            last_modified: None,
            keywords: Vec::new(),
            properties: HashMap::new(),
        }
    }

    pub fn with_last_modified(mut self, lastmod: impl Into<String>) -> Self {
        self.last_modified = Some(lastmod.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// First 16 hex chars of the SHA-256 of the input. Used as the stable id for
/// URLs and tasks, and as the masked form of sensitive values in logs.
pub fn short_hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Normalize a keyword phrase: lowercase, trim, collapse internal
/// whitespace. Idempotent.
pub fn normalize_phrase(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
