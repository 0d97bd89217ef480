pub mod config;
pub mod error;
pub mod safety;
pub mod types;
pub mod urls;

pub use config::Config;
pub use error::{ErrorClass, HttpCategory, SitepulseError};
pub use types::{normalize_phrase, short_hash, UrlRecord};
pub use urls::{extract_domain, strip_www, validate_url};
