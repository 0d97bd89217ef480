//! User-configurable URL exclusion filters.

use sitepulse_common::UrlRecord;
use url::Url;

/// One exclusion rule. A URL is dropped when its path contains
/// `path_contains` (if set) or its file extension equals `extension`
/// (if set). Matching is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    pub path_contains: Option<String>,
    pub extension: Option<String>,
}

impl UrlFilter {
    pub fn path(fragment: impl Into<String>) -> Self {
        Self {
            path_contains: Some(fragment.into().to_lowercase()),
            extension: None,
        }
    }

    pub fn ext(extension: impl Into<String>) -> Self {
        Self {
            path_contains: None,
            extension: Some(extension.into().trim_start_matches('.').to_lowercase()),
        }
    }

    fn excludes(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let path = parsed.path().to_lowercase();
        if let Some(fragment) = &self.path_contains {
            if path.contains(fragment.as_str()) {
                return true;
            }
        }
        if let Some(ext) = &self.extension {
            if let Some((_, file_ext)) = path.rsplit_once('.') {
                if file_ext == ext {
                    return true;
                }
            }
        }
        false
    }
}

/// Drop excluded records. Exclusions are silent by design of the filter
/// contract; callers that care about counts compare lengths.
pub fn apply_filters(records: Vec<UrlRecord>, filters: &[UrlFilter]) -> Vec<UrlRecord> {
    if filters.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| !filters.iter().any(|f| f.excludes(&r.address)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(addrs: &[&str]) -> Vec<UrlRecord> {
        addrs.iter().map(|a| UrlRecord::new(*a)).collect()
    }

    #[test]
    fn path_filter_drops_matches() {
        let input = records(&[
            "https://a.test/game/x",
            "https://a.test/admin/panel",
            "https://a.test/game/admin-notes",
        ]);
        // Substring matching: both the /admin/ section and the nested
        // /admin-notes path are dropped.
        let out = apply_filters(input, &[UrlFilter::path("/admin")]);
        let addrs: Vec<_> = out.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addrs, vec!["https://a.test/game/x"]);
    }

    #[test]
    fn extension_filter_drops_matches() {
        let input = records(&[
            "https://a.test/game/x",
            "https://a.test/image.png",
            "https://a.test/style.css",
        ]);
        let out = apply_filters(input, &[UrlFilter::ext("png"), UrlFilter::ext(".css")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].address, "https://a.test/game/x");
    }

    #[test]
    fn no_filters_is_identity() {
        let input = records(&["https://a.test/game/x"]);
        assert_eq!(apply_filters(input.clone(), &[]), input);
    }
}
