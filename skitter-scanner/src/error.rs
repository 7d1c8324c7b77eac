use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Server returned status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("URL not allowed by filters: {0}")]
    Forbidden(String),

    #[error("URL already visited: {0}")]
    AlreadyVisited(String),

    #[error("Max depth reached for {0}")]
    MaxDepth(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScanError {
    /// True for the refusals `Collector::visit` reports when a URL is simply
    /// not scheduled (as opposed to being unparseable).
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            ScanError::Forbidden(_) | ScanError::AlreadyVisited(_) | ScanError::MaxDepth(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
