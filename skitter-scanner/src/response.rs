use url::Url;

/// A fetched page as handed to response and error callbacks.
///
/// For transport failures no response was received: `status_code` is 0 and
/// `body` is empty.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub depth: usize,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl Response {
    pub fn new(url: Url, depth: usize) -> Self {
        Self {
            url,
            depth,
            status_code: 0,
            content_type: None,
            body: String::new(),
        }
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false)
    }
}

/// One element matched by a selector registered with `Collector::on_html`.
#[derive(Debug, Clone)]
pub struct HtmlElement {
    /// The page the element was found on.
    pub url: Url,
    pub depth: usize,
    attrs: Vec<(String, String)>,
}

impl HtmlElement {
    pub fn new(url: Url, depth: usize, attrs: Vec<(String, String)>) -> Self {
        Self {
            url,
            depth,
            attrs,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
