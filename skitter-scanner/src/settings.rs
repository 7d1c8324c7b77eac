use crate::agents::{DEFAULT_USER_AGENT, UserAgent};
use crate::collector::{Collector, RequestCallback};
use crate::error::{Result, ScanError};
use crate::raw_request::RawRequest;
use crate::request::Request;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 10;

/// Concurrency and pacing applied to every host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitRule {
    pub parallelism: usize,
    /// Fixed pause a worker takes after each request.
    pub delay: Duration,
    /// Upper bound of the random pause added on top of `delay`.
    pub random_delay: Duration,
}

impl Default for LimitRule {
    fn default() -> Self {
        Self {
            parallelism: 5,
            delay: Duration::ZERO,
            random_delay: Duration::ZERO,
        }
    }
}

/// Accumulates configuration steps before a [`Collector`] is built.
pub struct CollectorBuilder {
    allowed: Vec<Regex>,
    disallowed: Vec<Regex>,
    limit: LimitRule,
    max_depth: usize,
    proxy: Option<reqwest::Proxy>,
    timeout: Duration,
    user_agent: UserAgent,
    headers: HeaderMap,
    request_callbacks: Vec<RequestCallback>,
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            disallowed: Vec::new(),
            limit: LimitRule::default(),
            max_depth: 0,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: UserAgent::default(),
            headers: HeaderMap::new(),
            request_callbacks: Vec::new(),
        }
    }
}

impl CollectorBuilder {
    /// Only URLs matching at least one allow pattern are visited (when any are set).
    pub fn allow_url(&mut self, pattern: &str) -> Result<&mut Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            ScanError::Config(format!("failed to compile regex filter {}: {}", pattern, e))
        })?;
        self.allowed.push(regex);
        Ok(self)
    }

    /// URLs matching any disallow pattern are never visited.
    pub fn disallow_url(&mut self, pattern: &str) -> Result<&mut Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            ScanError::Config(format!(
                "failed to compile disallowed regex filter {}: {}",
                pattern, e
            ))
        })?;
        self.disallowed.push(regex);
        Ok(self)
    }

    pub fn limit(&mut self, rule: LimitRule) -> Result<&mut Self> {
        if rule.parallelism == 0 {
            return Err(ScanError::Config("parallelism must be at least 1".to_string()));
        }
        self.limit = rule;
        Ok(self)
    }

    /// 0 disables the depth limit.
    pub fn max_depth(&mut self, depth: usize) -> &mut Self {
        self.max_depth = depth;
        self
    }

    pub fn proxy(&mut self, proxy: &str) -> Result<&mut Self> {
        let parsed = reqwest::Proxy::all(proxy)
            .map_err(|e| ScanError::Config(format!("invalid proxy {}: {}", proxy, e)))?;
        info!("Proxy: {}", proxy);
        self.proxy = Some(parsed);
        Ok(self)
    }

    /// A zero timeout falls back to [`DEFAULT_TIMEOUT`].
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        if timeout.is_zero() {
            info!(
                "Request timeout is 0, using {} seconds",
                DEFAULT_TIMEOUT.as_secs()
            );
            self.timeout = DEFAULT_TIMEOUT;
        } else {
            self.timeout = timeout;
        }
        self
    }

    pub fn user_agent(&mut self, user_agent: UserAgent) -> &mut Self {
        self.user_agent = user_agent;
        self
    }

    /// Set a header sent with every request.
    pub fn header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| ScanError::Config(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| ScanError::Config(format!("invalid value for header {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Add a cookie string; appended to any cookie set earlier.
    pub fn cookie(&mut self, cookie: &str) -> Result<&mut Self> {
        let value = HeaderValue::from_str(cookie.trim())
            .map_err(|e| ScanError::Config(format!("invalid cookie {}: {}", cookie, e)))?;
        self.headers.append(COOKIE, value);
        Ok(self)
    }

    /// Replay the headers (and cookies) of a saved raw HTTP request.
    pub fn raw_request(&mut self, path: &str) -> Result<&mut Self> {
        let request = RawRequest::load(path)?;
        for (name, value) in request.session_headers() {
            self.header(name, value)?;
        }
        debug!("Imported {} headers from {}", self.headers.len(), path);
        Ok(self)
    }

    pub fn on_request<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.request_callbacks.push(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<Collector> {
        let user_agent = match &self.user_agent {
            UserAgent::Custom(agent) => agent.clone(),
            _ => DEFAULT_USER_AGENT.to_string(),
        };

        let mut client = Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .connect_timeout(self.timeout / 2)
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .http2_adaptive_window(true)
            .tcp_keepalive(Duration::from_secs(60))
            .danger_accept_invalid_certs(true)
            .redirect(same_host_redirects());
        if let Some(proxy) = self.proxy {
            client = client.proxy(proxy);
        }
        let client = client
            .build()
            .map_err(|e| ScanError::Config(format!("failed to create HTTP client: {}", e)))?;

        let mut request_callbacks = self.request_callbacks;
        if self.user_agent.rotates() {
            let agents = self.user_agent.clone();
            request_callbacks.insert(
                0,
                Arc::new(move |request: &mut Request| {
                    if let Ok(value) = HeaderValue::from_str(agents.pick()) {
                        request.set_header(USER_AGENT, value);
                    }
                }),
            );
        }

        Ok(Collector::new(
            client,
            self.allowed,
            self.disallowed,
            self.limit,
            self.max_depth,
            self.headers,
            request_callbacks,
        ))
    }
}

/// Follow redirects that stay on the same host; stop on the first hop that
/// leaves it so the 3xx response itself is returned.
fn same_host_redirects() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.stop();
        }
        let last_host = attempt
            .previous()
            .last()
            .and_then(|url| url.host_str())
            .map(str::to_string);
        if last_host.as_deref() == attempt.url().host_str() {
            debug!("Redirecting to: {}", attempt.url());
            attempt.follow()
        } else {
            debug!("Refusing cross-host redirect to: {}", attempt.url());
            attempt.stop()
        }
    })
}
