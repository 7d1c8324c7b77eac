use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

/// An outbound request that has been scheduled but not yet sent.
///
/// Request callbacks receive it mutably right before the fetch; they may set
/// headers or call [`Request::abort`] to drop it without touching the network.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub depth: usize,
    pub headers: HeaderMap,
    aborted: bool,
}

impl Request {
    pub fn new(url: Url, depth: usize) -> Self {
        Self {
            url,
            depth,
            headers: HeaderMap::new(),
            aborted: false,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replace any existing value for `name`.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::COOKIE;

    #[test]
    fn test_abort_is_sticky() {
        let mut request = Request::new(Url::parse("https://example.com/").unwrap(), 1);
        assert!(!request.is_aborted());
        request.abort();
        request.abort();
        assert!(request.is_aborted());
    }

    #[test]
    fn test_set_header_replaces() {
        let mut request = Request::new(Url::parse("https://example.com/").unwrap(), 1);
        request.set_header(COOKIE, HeaderValue::from_static("a=1"));
        request.set_header(COOKIE, HeaderValue::from_static("b=2"));
        assert_eq!(request.headers.get_all(COOKIE).iter().count(), 1);
        assert_eq!(request.headers[COOKIE], "b=2");
    }
}
