pub mod config;
pub mod error;
pub mod db;
pub mod store;
pub mod directory;
pub mod crawler;
pub mod seed;

pub use config::Config;
pub use error::{GraphcrawlError, Result};
pub use crawler::{crawl_mutual_core, expand_by_threshold, Frontier};
pub use directory::{Directory, FetchError};
pub use store::{CountScope, CrawlStatus};
