pub mod config;
pub mod crawl;
pub mod dedup;
pub mod derivation;
pub mod error;
pub mod normalize;
pub mod policy;
pub mod report;
pub mod sources;

pub use config::{ConfigStep, CrawlerConfig};
pub use crawl::{CrawlSession, Crawler, Phase};
pub use dedup::DedupFilter;
pub use derivation::DerivedValues;
pub use error::{CrawlError, is_suppressed_status};
pub use report::{Category, Report};
pub use sources::{HistoricalSource, RobotsSource, SeedSource, SitemapSource};

// Engine types that appear in the configuration surface
pub use skitter_scanner::{LimitRule, UserAgent};
