//! Keyword phrase extraction from URL paths. No network I/O.

use std::collections::HashSet;
use std::sync::OnceLock;

use sitepulse_common::types::normalize_phrase;
use sitepulse_common::UrlRecord;
use url::Url;

/// Tokens with no keyword value on game sites.
const STOP_TOKENS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "with", "at", "by", "from",
    "is", "html", "htm", "php", "asp", "aspx", "www", "com", "net", "org", "index", "page",
    "pages", "category", "tag", "tags", "online", "free", "play", "new",
];

fn stop_tokens() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_TOKENS.iter().copied().collect())
}

/// Derives keyword phrases from URL paths: path segments are split into
/// alphabetic tokens (separators: `/`, `-`, `_`, digits, punctuation),
/// stop-tokens are dropped, and adjacent tokens within a segment are
/// recombined into phrases up to `max_ngram` words.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    max_ngram: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self { max_ngram: 3 }
    }
}

impl KeywordExtractor {
    pub fn new(max_ngram: usize) -> Self {
        Self {
            max_ngram: max_ngram.max(1),
        }
    }

    /// Extract normalized, de-duplicated phrases from one address.
    pub fn extract(&self, address: &str) -> Vec<String> {
        let Ok(parsed) = Url::parse(address) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut phrases = Vec::new();

        for segment in parsed.path().split('/') {
            let tokens: Vec<String> = segment
                .split(|c: char| !c.is_alphabetic())
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase)
                .filter(|t| !stop_tokens().contains(t.as_str()))
                .collect();
            if tokens.is_empty() {
                continue;
            }
            for n in 1..=self.max_ngram.min(tokens.len()) {
                for window in tokens.windows(n) {
                    let phrase = normalize_phrase(&window.join(" "));
                    if !phrase.is_empty() && seen.insert(phrase.clone()) {
                        phrases.push(phrase);
                    }
                }
            }
        }

        phrases
    }

    /// Attach extracted keywords to a record, returning the enriched record.
    pub fn enrich(&self, mut record: UrlRecord) -> UrlRecord {
        record.keywords = self.extract(&record.address);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_segments_and_separators() {
        let kw = KeywordExtractor::default();
        let phrases = kw.extract("https://a.test/racing-games/monster_truck");
        assert!(phrases.contains(&"racing".to_string()));
        assert!(phrases.contains(&"games".to_string()));
        assert!(phrases.contains(&"racing games".to_string()));
        assert!(phrases.contains(&"monster truck".to_string()));
    }

    #[test]
    fn digits_are_separators_and_dropped() {
        let kw = KeywordExtractor::default();
        let phrases = kw.extract("https://a.test/games/2048-puzzle");
        assert!(phrases.contains(&"puzzle".to_string()));
        assert!(!phrases.iter().any(|p| p.contains("2048")));
    }

    #[test]
    fn stop_tokens_are_dropped() {
        let kw = KeywordExtractor::default();
        let phrases = kw.extract("https://a.test/category/the-best-chess");
        assert!(phrases.contains(&"best chess".to_string()));
        assert!(!phrases.contains(&"category".to_string()));
        assert!(!phrases.contains(&"the".to_string()));
    }

    #[test]
    fn short_segments_survive() {
        let kw = KeywordExtractor::default();
        let phrases = kw.extract("https://a.test/g/x");
        assert_eq!(phrases, vec!["g".to_string(), "x".to_string()]);
    }

    #[test]
    fn ngram_length_is_bounded() {
        let kw = KeywordExtractor::new(2);
        let phrases = kw.extract("https://a.test/deep-sea-diving-adventure");
        assert!(phrases.contains(&"deep sea".to_string()));
        assert!(!phrases.iter().any(|p| p.split(' ').count() > 2));
    }

    #[test]
    fn phrases_are_unique_per_url() {
        let kw = KeywordExtractor::default();
        let phrases = kw.extract("https://a.test/chess/chess");
        let unique: HashSet<_> = phrases.iter().collect();
        assert_eq!(unique.len(), phrases.len());
    }
}
