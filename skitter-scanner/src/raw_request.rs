use crate::error::{Result, ScanError};
use std::fs;
use std::path::Path;

/// Headers that describe the original connection rather than the session and
/// must not be replayed on every request.
const CONNECTION_HEADERS: &[&str] = &["host", "content-length", "connection", "transfer-encoding"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl RawRequest {
    /// Parse the request line and header block of an HTTP/1.x request.
    /// Anything after the first blank line is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().skip_while(|line| line.trim().is_empty());

        let request_line = lines
            .next()
            .ok_or_else(|| ScanError::Config("raw request is empty".to_string()))?;
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ScanError::Config(format!(
                "malformed request line: {}",
                request_line
            )));
        };
        if !version.starts_with("HTTP/") {
            return Err(ScanError::Config(format!(
                "malformed request line: {}",
                request_line
            )));
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ScanError::Config(format!("malformed header line: {}", line)))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            headers,
        })
    }

    /// Load a request file; a leading `~` is expanded to the home directory.
    pub fn load(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path);
        let content = fs::read_to_string(Path::new(expanded.as_ref())).map_err(|e| {
            ScanError::Config(format!("Failed to open raw request {}: {}", expanded, e))
        })?;
        Self::parse(&content)
            .map_err(|e| ScanError::Config(format!("Failed to parse raw request in {}: {}", expanded, e)))
    }

    /// Headers worth replaying on every crawl request.
    pub fn session_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter(|(name, _)| !CONNECTION_HEADERS.contains(&name.to_lowercase().as_str()))
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}
