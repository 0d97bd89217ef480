use thiserror::Error;

#[derive(Error, Debug)]
pub enum SitepulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP {status} from {host}: {category}")]
    Http {
        status: u16,
        host: String,
        category: HttpCategory,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parsing(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Empty content from {0}")]
    EmptyContent(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circuit open for endpoint {0}")]
    CircuitOpen(String),

    #[error("Task queue full")]
    QueueFull,

    #[error("Snapshot I/O error: {0}")]
    SnapshotIo(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Named category for an upstream HTTP status, used in logs and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCategory {
    Forbidden,
    NotFound,
    RateLimited,
    ClientError,
    ServerError,
    Other,
}

impl std::fmt::Display for HttpCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpCategory::Forbidden => "forbidden",
            HttpCategory::NotFound => "not_found",
            HttpCategory::RateLimited => "rate_limited",
            HttpCategory::ClientError => "client_error",
            HttpCategory::ServerError => "server_error",
            HttpCategory::Other => "other",
        };
        f.write_str(s)
    }
}

impl SitepulseError {
    /// Build an HTTP error with its status mapped to a named category.
    pub fn from_status(status: u16, host: &str) -> Self {
        let category = match status {
            403 => HttpCategory::Forbidden,
            404 => HttpCategory::NotFound,
            429 => HttpCategory::RateLimited,
            400..=499 => HttpCategory::ClientError,
            500..=599 => HttpCategory::ServerError,
            _ => HttpCategory::Other,
        };
        SitepulseError::Http {
            status,
            host: host.to_string(),
            category,
        }
    }
}

/// Coarse classification of an error, derived from substring rules on its
/// message. Shared by the fetcher, the parser chain, the dispatcher and the
/// backend submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    None,
    Http,
    Network,
    Parsing,
    Validation,
    Unknown,
}

/// Classify an error by its rendered message.
pub fn classify(message: &str) -> ErrorClass {
    if message.is_empty() {
        return ErrorClass::None;
    }
    let m = message.to_lowercase();
    if m.contains("http ")
        || m.contains("status")
        || m.contains("403")
        || m.contains("429")
        || m.contains("502")
        || m.contains("503")
        || m.contains("504")
    {
        ErrorClass::Http
    } else if m.contains("connection")
        || m.contains("timeout")
        || m.contains("timed out")
        || m.contains("dns")
        || m.contains("network")
        || m.contains("reset")
    {
        ErrorClass::Network
    } else if m.contains("xml")
        || m.contains("parse")
        || m.contains("encoding")
        || m.contains("utf-8")
        || m.contains("syntax")
    {
        ErrorClass::Parsing
    } else if m.contains("invalid url") || m.contains("validation") || m.contains("scheme") {
        ErrorClass::Validation
    } else {
        ErrorClass::Unknown
    }
}

/// Whether an error is worth retrying: transient network failures and the
/// retryable HTTP statuses (403/429/5xx). 4xx other than 403/429 are final.
pub fn is_retryable(message: &str) -> bool {
    match classify(message) {
        ErrorClass::Network => {
            let m = message.to_lowercase();
            // Refused connections and DNS failures do not recover on retry.
            !(m.contains("refused") || m.contains("dns"))
        }
        ErrorClass::Http => {
            let m = message.to_lowercase();
            m.contains("403")
                || m.contains("429")
                || m.contains("502")
                || m.contains("503")
                || m.contains("504")
                || m.contains("500")
        }
        _ => false,
    }
}

/// Retryable statuses for the resilient fetcher.
pub fn status_is_retryable(status: u16) -> bool {
    matches!(status, 403 | 429 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_messages() {
        assert_eq!(classify("HTTP 403 from a.test: forbidden"), ErrorClass::Http);
        assert_eq!(classify("unexpected status 502"), ErrorClass::Http);
    }

    #[test]
    fn classify_network_messages() {
        assert_eq!(classify("connection reset by peer"), ErrorClass::Network);
        assert_eq!(classify("operation timed out"), ErrorClass::Network);
        assert_eq!(classify("dns error: no such host"), ErrorClass::Network);
    }

    #[test]
    fn classify_parsing_and_validation() {
        assert_eq!(classify("XML syntax error at line 3"), ErrorClass::Parsing);
        assert_eq!(classify("invalid url: missing host"), ErrorClass::Validation);
        assert_eq!(classify(""), ErrorClass::None);
        assert_eq!(classify("something else entirely"), ErrorClass::Unknown);
    }

    #[test]
    fn retryable_rules() {
        assert!(is_retryable("HTTP 429 from a.test: rate_limited"));
        assert!(is_retryable("HTTP 503 from a.test: server_error"));
        assert!(is_retryable("connection reset by peer"));
        assert!(!is_retryable("connection refused"));
        assert!(!is_retryable("dns error: no such host"));
        assert!(!is_retryable("HTTP 404 from a.test: not_found"));
        assert!(!is_retryable("XML syntax error"));
    }

    #[test]
    fn status_categories() {
        let e = SitepulseError::from_status(429, "a.test");
        match e {
            SitepulseError::Http { category, .. } => {
                assert_eq!(category, HttpCategory::RateLimited)
            }
            _ => panic!("expected http error"),
        }
        assert!(status_is_retryable(403));
        assert!(status_is_retryable(504));
        assert!(!status_is_retryable(404));
        assert!(!status_is_retryable(200));
    }
}
