//! Plain-text sitemap parsing: one URL per line.

use tracing::debug;

use sitepulse_common::urls::validate_url;
use sitepulse_common::UrlRecord;

pub const MAX_LINES: usize = 100_000;
pub const MAX_LINE_BYTES: usize = 4_096;

/// Parse a TXT sitemap. Scans at most `MAX_LINES` lines; lines longer than
/// `MAX_LINE_BYTES`, blank lines and `#` comments are skipped, and every
/// accepted line must pass URL validation. `max_urls` bounds the output.
pub fn parse_txt(content: &str, max_urls: usize) -> Vec<UrlRecord> {
    let mut urls = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        if line_no >= MAX_LINES || urls.len() >= max_urls {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if line.len() > MAX_LINE_BYTES {
            debug!(line = line_no + 1, bytes = line.len(), "Skipping oversized sitemap line");
            continue;
        }
        match validate_url(trimmed) {
            Ok(()) => {
                urls.push(
                    UrlRecord::new(trimmed)
                        .with_property("source", "txt")
                        .with_property("line", (line_no + 1).to_string()),
                );
            }
            Err(e) => {
                debug!(line = line_no + 1, error = %e, "Skipping invalid sitemap line");
            }
        }
    }

    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_list() {
        let content = "https://a.test/g/x\n\n# comment\nhttps://a.test/g/y\n";
        let urls = parse_txt(content, 100);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].address, "https://a.test/g/x");
        assert_eq!(urls[0].properties.get("line").map(String::as_str), Some("1"));
        assert_eq!(urls[1].properties.get("line").map(String::as_str), Some("4"));
    }

    #[test]
    fn invalid_lines_are_skipped() {
        let content = "https://a.test/ok\nnot a url\nftp://a.test/nope\n";
        let urls = parse_txt(content, 100);
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn line_limit_is_exact() {
        let mut content = String::new();
        for i in 0..(MAX_LINES + 50) {
            content.push_str(&format!("https://a.test/g/{i}\n"));
        }
        let urls = parse_txt(&content, usize::MAX);
        assert_eq!(urls.len(), MAX_LINES);
    }

    #[test]
    fn line_length_limit_is_exact() {
        // A URL of exactly MAX_LINE_BYTES is accepted only if it also passes
        // URL validation (max 2048), so build around the byte limit with a
        // too-long line and a maximal valid one.
        let base = "https://a.test/";
        let ok = format!("{base}{}", "g".repeat(2048 - base.len()));
        let over = format!("{base}{}", "g".repeat(MAX_LINE_BYTES + 1 - base.len()));
        let content = format!("{ok}\n{over}\n");
        let urls = parse_txt(&content, 100);
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].address, ok);
    }

    #[test]
    fn max_urls_bounds_output() {
        let content = "https://a.test/1\nhttps://a.test/2\nhttps://a.test/3\n";
        assert_eq!(parse_txt(content, 2).len(), 2);
    }
}
