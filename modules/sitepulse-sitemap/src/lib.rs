pub mod chain;
pub mod encoding;
pub mod feed;
pub mod fetch;
pub mod filters;
pub mod keywords;
pub mod scrape;
pub mod txt;
pub mod xml;

pub use chain::{ParserChain, Strategy};
pub use fetch::{Downloader, ResilientFetcher};
pub use filters::UrlFilter;
pub use keywords::KeywordExtractor;
