use crate::error::{Result, ScanError};
use crate::request::Request;
use crate::response::{HtmlElement, Response};
use crate::settings::{CollectorBuilder, LimitRule};
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::{TaskTracker, task_tracker::TaskTrackerToken};
use tracing::{debug, warn};
use url::Url;

pub type HtmlCallback = Arc<dyn Fn(&HtmlElement) + Send + Sync>;
pub type ResponseCallback = Arc<dyn Fn(&Response) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&Response, &ScanError) + Send + Sync>;
pub type RequestCallback = Arc<dyn Fn(&mut Request) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    html: Vec<(Selector, HtmlCallback)>,
    response: Vec<ResponseCallback>,
    error: Vec<ErrorCallback>,
    request: Vec<RequestCallback>,
}

/// Concurrent fetcher: every accepted visit becomes a tracked task that waits
/// for a parallelism permit, runs the request callbacks, fetches, and fires
/// the response/error/html callbacks.
///
/// Callbacks are registered on an owned collector; once it is wrapped in an
/// `Arc` it can be shared with whatever drives the visits.
pub struct Collector {
    client: Client,
    hooks: Hooks,
    allowed: Vec<Regex>,
    disallowed: Vec<Regex>,
    limit: LimitRule,
    max_depth: usize,
    headers: HeaderMap,
    permits: Arc<Semaphore>,
    visited: Mutex<HashSet<String>>,
    tracker: TaskTracker,
}

impl Collector {
    pub fn builder() -> CollectorBuilder {
        CollectorBuilder::default()
    }

    pub(crate) fn new(
        client: Client,
        allowed: Vec<Regex>,
        disallowed: Vec<Regex>,
        limit: LimitRule,
        max_depth: usize,
        headers: HeaderMap,
        request_callbacks: Vec<RequestCallback>,
    ) -> Self {
        Self {
            client,
            hooks: Hooks {
                request: request_callbacks,
                ..Hooks::default()
            },
            allowed,
            disallowed,
            permits: Arc::new(Semaphore::new(limit.parallelism.max(1))),
            limit,
            max_depth,
            headers,
            visited: Mutex::new(HashSet::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Fire `callback` for every element matching `selector` on HTML pages.
    pub fn on_html<F>(&mut self, selector: &str, callback: F) -> Result<()>
    where
        F: Fn(&HtmlElement) + Send + Sync + 'static,
    {
        let parsed = Selector::parse(selector)
            .map_err(|e| ScanError::InvalidSelector(format!("{}: {:?}", selector, e)))?;
        self.hooks.html.push((parsed, Arc::new(callback)));
        Ok(())
    }

    /// Fire `callback` for every response with a status below 400.
    pub fn on_response<F>(&mut self, callback: F)
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.hooks.response.push(Arc::new(callback));
    }

    /// Fire `callback` for responses with status 400 and above and for
    /// requests that failed before a response arrived.
    pub fn on_error<F>(&mut self, callback: F)
    where
        F: Fn(&Response, &ScanError) + Send + Sync + 'static,
    {
        self.hooks.error.push(Arc::new(callback));
    }

    /// Fire `callback` right before a request is sent. Runs after any request
    /// callbacks installed by the builder.
    pub fn on_request<F>(&mut self, callback: F)
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.hooks.request.push(Arc::new(callback));
    }

    /// Schedule `url` as a top-level visit.
    pub fn visit(self: &Arc<Self>, url: &str) -> Result<()> {
        self.visit_at(url, 1)
    }

    /// Schedule `url` at the given depth. Returns a refusal error when the URL
    /// is filtered out, too deep, or was already scheduled once.
    pub fn visit_at(self: &Arc<Self>, url: &str, depth: usize) -> Result<()> {
        let parsed =
            Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScanError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                url,
                parsed.scheme()
            )));
        }

        if self.max_depth > 0 && depth > self.max_depth {
            return Err(ScanError::MaxDepth(parsed.to_string()));
        }

        if !self.is_allowed(parsed.as_str()) {
            return Err(ScanError::Forbidden(parsed.to_string()));
        }

        {
            let mut visited = self.visited.lock().unwrap_or_else(|e| e.into_inner());
            if !visited.insert(parsed.to_string()) {
                return Err(ScanError::AlreadyVisited(parsed.to_string()));
            }
        }

        let collector = Arc::clone(self);
        self.tracker.spawn(async move {
            collector.fetch(parsed, depth).await;
        });
        Ok(())
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        if self.disallowed.iter().any(|re| re.is_match(url)) {
            return false;
        }
        self.allowed.is_empty() || self.allowed.iter().any(|re| re.is_match(url))
    }

    /// Keeps the collector busy until the token is dropped, so `wait` does not
    /// return while a consumer still holds work handed out by a callback.
    pub fn token(&self) -> TaskTrackerToken {
        self.tracker.token()
    }

    /// A clone of the task tracker, for callbacks registered before the
    /// collector is shared.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Run `future` as tracked work that `wait` will account for.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future)
    }

    /// Stop accepting the idea of "more input" and wait until every fetch,
    /// spawned task and outstanding token is gone. Visits scheduled while
    /// waiting are still honoured.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn fetch(&self, url: Url, depth: usize) {
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };

        let mut request = Request::new(url, depth).with_headers(self.headers.clone());
        for callback in &self.hooks.request {
            callback(&mut request);
            if request.is_aborted() {
                debug!("Request to {} aborted before sending", request.url);
                return;
            }
        }

        debug!("Fetching {}", request.url);
        let outcome = self
            .client
            .get(request.url.clone())
            .headers(request.headers)
            .send()
            .await;

        let mut response = Response::new(request.url, depth);
        match outcome {
            Ok(http_response) => {
                response.status_code = http_response.status().as_u16();
                response.content_type = http_response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());

                match http_response.text().await {
                    Ok(body) => {
                        response.body = body;
                        if response.status_code >= 400 {
                            let err = ScanError::HttpStatus {
                                url: response.url.to_string(),
                                status: response.status_code,
                            };
                            self.dispatch_error(&response, &err);
                        } else {
                            self.dispatch_response(&response);
                            if response.is_html() {
                                self.dispatch_html(&response);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read body of {}: {}", response.url, e);
                        self.dispatch_error(&response, &ScanError::HttpError(e));
                    }
                }
            }
            Err(e) => {
                debug!("Request to {} failed: {}", response.url, e);
                self.dispatch_error(&response, &ScanError::HttpError(e));
            }
        }

        self.pause().await;
    }

    /// Hold the permit for the configured delay plus jitter.
    async fn pause(&self) {
        let mut delay = self.limit.delay;
        let jitter_ms = self.limit.random_delay.as_millis() as u64;
        if jitter_ms > 0 {
            delay += Duration::from_millis(rand::rng().random_range(0..=jitter_ms));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn dispatch_response(&self, response: &Response) {
        for callback in &self.hooks.response {
            callback(response);
        }
    }

    fn dispatch_error(&self, response: &Response, err: &ScanError) {
        for callback in &self.hooks.error {
            callback(response, err);
        }
    }

    fn dispatch_html(&self, response: &Response) {
        if self.hooks.html.is_empty() {
            return;
        }
        let document = Html::parse_document(&response.body);
        for (selector, callback) in &self.hooks.html {
            for element in document.select(selector) {
                let attrs = element
                    .value()
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect();
                let found = HtmlElement::new(
                    response.url.clone(),
                    response.depth,
                    attrs,
                );
                callback(&found);
            }
        }
    }
}
