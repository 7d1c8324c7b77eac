use crate::normalize;
use crate::policy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Source tag for artifacts found in a fetched page.
pub const SOURCE_BODY: &str = "body";
pub const SOURCE_SITEMAP: &str = "sitemap";
pub const SOURCE_ROBOTS: &str = "robots";
pub const SOURCE_OTHER: &str = "other-sources";

/// What kind of artifact a [`Report`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// A raw `href` found on a page.
    #[serde(rename = "ref")]
    Reference,
    /// A `src` attribute: scripts, data files, images.
    #[serde(rename = "src")]
    ScriptOrDataAsset,
    /// A page containing a file upload input.
    #[serde(rename = "upload-form")]
    UploadForm,
    /// A page containing a form with an action.
    #[serde(rename = "form")]
    Form,
    /// A page that was actually requested.
    #[serde(rename = "url")]
    FetchedPage,
    #[serde(rename = "aws-s3")]
    CloudBucket,
    #[serde(rename = "domain")]
    Domain,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Reference,
        Category::ScriptOrDataAsset,
        Category::UploadForm,
        Category::Form,
        Category::FetchedPage,
        Category::CloudBucket,
        Category::Domain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Reference => "ref",
            Category::ScriptOrDataAsset => "src",
            Category::UploadForm => "upload-form",
            Category::Form => "form",
            Category::FetchedPage => "url",
            Category::CloudBucket => "aws-s3",
            Category::Domain => "domain",
        }
    }

    /// Whether `output` of this category is a URL (as opposed to a bare
    /// host or bucket identifier).
    pub fn is_url(&self) -> bool {
        !matches!(self, Category::CloudBucket | Category::Domain)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("unknown output type: {}", s))
    }
}

/// One discovered artifact.
///
/// Fields are read-only once built: a record is moved through normalization
/// and dedup, never patched in place. `body`, `err` and `depth` are transient
/// crawl state and are left out of the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    source: String,
    #[serde(rename = "type")]
    category: Category,
    #[serde(rename = "status")]
    status_code: u16,
    output: String,
    length: usize,
    #[serde(rename = "input")]
    origin: Url,
    #[serde(skip)]
    body: Arc<str>,
    #[serde(skip)]
    err: Option<String>,
    #[serde(skip)]
    depth: usize,
}

impl Report {
    pub fn new(
        category: Category,
        output: impl Into<String>,
        source: impl Into<String>,
        origin: Url,
    ) -> Self {
        Self {
            source: source.into(),
            category,
            status_code: 0,
            output: output.into(),
            length: 0,
            origin,
            body: Arc::from(""),
            err: None,
            depth: 1,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Attach the page body; `length` follows it.
    pub fn with_body(mut self, body: impl Into<Arc<str>>) -> Self {
        self.body = body.into();
        self.length = self.body.len();
        self
    }

    pub fn with_error(mut self, err: impl Into<String>) -> Self {
        self.err = Some(err.into());
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn error(&self) -> Option<&str> {
        self.err.as_deref()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// A record for an artifact found inside this one. Keeps source, body,
    /// status, origin and depth; only output and category change.
    pub fn derive(&self, category: Category, output: impl Into<String>) -> Report {
        Report {
            source: self.source.clone(),
            category,
            status_code: self.status_code,
            output: output.into(),
            length: self.length,
            origin: self.origin.clone(),
            body: Arc::clone(&self.body),
            err: None,
            depth: self.depth,
        }
    }

    /// The same record with `output` in canonical form. An empty output means
    /// the record must be dropped.
    pub fn normalized(self) -> Report {
        let output = normalize::normalize(self.category, &self.origin, &self.output);
        Report { output, ..self }
    }

    /// FetchedPage records with a body are scanned for derived artifacts.
    pub fn is_derivable(&self) -> bool {
        self.category == Category::FetchedPage && !self.body.is_empty()
    }

    /// URLs this record sends back to the frontier.
    pub fn follow_ups(&self) -> Vec<String> {
        policy::follow_ups(self.category, &self.output)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.status_code > 0 {
            write!(
                f,
                "[{}] - [code-{}] - {}",
                self.category, self.status_code, self.output
            )
        } else {
            write!(f, "[{}] - {}", self.category, self.output)
        }
    }
}
