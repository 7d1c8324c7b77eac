use skitter_scanner::ScanError;
use thiserror::Error;

/// Everything that can surface on a crawl session's error stream.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// A provisioning step failed; the session never started.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed seed URL {url}: {reason}")]
    MalformedSeed { url: String, reason: String },

    #[error("Cannot resolve base domain of {host}: {reason}")]
    DomainResolution { host: String, reason: String },

    /// A fetch that failed in a way worth reporting (see [`is_suppressed_status`]).
    #[error("Request to {url} failed (status {status}): {message}")]
    Transport {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Seed source {source_name} failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl CrawlError {
    /// Fatal errors end the session; everything else is reported and the
    /// crawl carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::Configuration(_))
    }
}

/// Responses that are expected noise on any crawl and never reported:
/// 404, 429 and every 5xx.
pub fn is_suppressed_status(status: u16) -> bool {
    matches!(status, 404 | 429 | 500..=599)
}

pub type Result<T> = std::result::Result<T, CrawlError>;
