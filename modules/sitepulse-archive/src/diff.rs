//! Change detection between two URL snapshots of one domain.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use sitepulse_common::UrlRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub url: String,
    #[serde(rename = "type")]
    pub change: ChangeType,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub domain: String,
    pub timestamp: i64,
    pub changes: Vec<ChangeEntry>,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Diff two URL sets by address. A surviving address counts as modified when
/// its keyword set (order-insensitive) or its property bag (key-wise)
/// changed.
pub fn detect_changes(domain: &str, old: &[UrlRecord], new: &[UrlRecord]) -> ChangeSet {
    let old_by_addr: HashMap<&str, &UrlRecord> =
        old.iter().map(|u| (u.address.as_str(), u)).collect();
    let new_by_addr: HashMap<&str, &UrlRecord> =
        new.iter().map(|u| (u.address.as_str(), u)).collect();

    let mut changes = Vec::new();

    for record in new {
        match old_by_addr.get(record.address.as_str()) {
            None => changes.push(ChangeEntry {
                url: record.address.clone(),
                change: ChangeType::Added,
                metadata: HashMap::new(),
            }),
            Some(previous) => {
                if is_modified(previous, record) {
                    let mut metadata = HashMap::new();
                    metadata.insert(
                        "keywords_before".to_string(),
                        previous.keywords.len().to_string(),
                    );
                    metadata.insert(
                        "keywords_after".to_string(),
                        record.keywords.len().to_string(),
                    );
                    changes.push(ChangeEntry {
                        url: record.address.clone(),
                        change: ChangeType::Modified,
                        metadata,
                    });
                }
            }
        }
    }

    for record in old {
        if !new_by_addr.contains_key(record.address.as_str()) {
            changes.push(ChangeEntry {
                url: record.address.clone(),
                change: ChangeType::Removed,
                metadata: HashMap::new(),
            });
        }
    }

    let count = |t: ChangeType| changes.iter().filter(|c| c.change == t).count();
    ChangeSet {
        domain: domain.to_string(),
        timestamp: Utc::now().timestamp(),
        added: count(ChangeType::Added),
        removed: count(ChangeType::Removed),
        modified: count(ChangeType::Modified),
        changes,
    }
}

fn is_modified(old: &UrlRecord, new: &UrlRecord) -> bool {
    let old_keywords: HashSet<&str> = old.keywords.iter().map(String::as_str).collect();
    let new_keywords: HashSet<&str> = new.keywords.iter().map(String::as_str).collect();
    if old_keywords != new_keywords {
        return true;
    }
    old.properties != new.properties
}
