use crate::error::{CrawlError, Result};
use reqwest::Client;
use skitter_scanner::{Collector, CollectorBuilder, DEFAULT_TIMEOUT, LimitRule, UserAgent};
use std::time::Duration;
use tracing::debug;

/// Media, font and stylesheet URLs that are never worth fetching.
pub const DEFAULT_DISALLOW: &str = r"(?i)\.(png|apng|bmp|gif|ico|cur|jpg|jpeg|jfif|pjp|pjpeg|svg|tif|tiff|webp|xbm|3gp|aac|flac|mpg|mpeg|mp3|mp4|m4a|m4v|m4p|oga|ogg|ogv|mov|wav|webm|eot|woff|woff2|ttf|otf|css)(?:\?|#|$)";

pub const DEFAULT_PARALLELISM: usize = 5;
pub const DEFAULT_BUFFER: usize = 256;

/// Everything a crawl session is provisioned from.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Allow-list regexes; when non-empty a URL must match one of them.
    pub scope: Vec<String>,
    pub whitelist_domain: Option<String>,
    pub disallow: Vec<String>,
    pub default_disallow: bool,
    pub parallelism: usize,
    pub delay: Duration,
    pub random_delay: Duration,
    pub proxy: Option<String>,
    pub timeout: Duration,
    /// `Name: value` pairs.
    pub headers: Vec<String>,
    pub cookie: Option<String>,
    /// Path to a saved raw HTTP request whose headers are replayed.
    pub raw_request: Option<String>,
    pub user_agent: UserAgent,
    /// 0 means unlimited.
    pub max_depth: usize,
    pub sitemap: bool,
    pub robots: bool,
    pub other_sources: bool,
    pub include_subdomains: bool,
    pub derive: bool,
    /// Response body lengths to drop.
    pub filter_length: Vec<usize>,
    /// Capacity of the report and error streams.
    pub buffer: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            scope: Vec::new(),
            whitelist_domain: None,
            disallow: Vec::new(),
            default_disallow: true,
            parallelism: DEFAULT_PARALLELISM,
            delay: Duration::ZERO,
            random_delay: Duration::ZERO,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            headers: Vec::new(),
            cookie: None,
            raw_request: None,
            user_agent: UserAgent::default(),
            max_depth: 0,
            sitemap: false,
            robots: false,
            other_sources: false,
            include_subdomains: false,
            derive: true,
            filter_length: Vec::new(),
            buffer: DEFAULT_BUFFER,
        }
    }
}

/// One provisioning step, applied to the collector builder in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigStep {
    Scope(String),
    Disallow(String),
    Limit(LimitRule),
    MaxDepth(usize),
    Proxy(String),
    Timeout(Duration),
    UserAgent(UserAgent),
    Header(String),
    Cookie(String),
    RawRequest(String),
}

impl ConfigStep {
    pub fn apply(&self, builder: &mut CollectorBuilder) -> Result<()> {
        match self {
            ConfigStep::Scope(pattern) => {
                builder.allow_url(pattern).map_err(configuration)?;
            }
            ConfigStep::Disallow(pattern) => {
                builder.disallow_url(pattern).map_err(configuration)?;
            }
            ConfigStep::Limit(rule) => {
                builder.limit(*rule).map_err(configuration)?;
            }
            ConfigStep::MaxDepth(depth) => {
                builder.max_depth(*depth);
            }
            ConfigStep::Proxy(proxy) => {
                builder.proxy(proxy).map_err(configuration)?;
            }
            ConfigStep::Timeout(timeout) => {
                builder.timeout(*timeout);
            }
            ConfigStep::UserAgent(agent) => {
                builder.user_agent(agent.clone());
            }
            ConfigStep::Header(line) => {
                let (name, value) = line.split_once(':').ok_or_else(|| {
                    CrawlError::Configuration(format!("header must be 'Name: value': {}", line))
                })?;
                builder.header(name, value).map_err(configuration)?;
            }
            ConfigStep::Cookie(cookie) => {
                builder.cookie(cookie).map_err(configuration)?;
            }
            ConfigStep::RawRequest(path) => {
                builder.raw_request(path).map_err(configuration)?;
            }
        }
        Ok(())
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, pattern: impl Into<String>) -> Self {
        self.scope.push(pattern.into());
        self
    }

    pub fn with_whitelist_domain(mut self, domain: impl Into<String>) -> Self {
        self.whitelist_domain = Some(domain.into());
        self
    }

    pub fn with_disallow(mut self, pattern: impl Into<String>) -> Self {
        self.disallow.push(pattern.into());
        self
    }

    pub fn with_default_disallow(mut self, enabled: bool) -> Self {
        self.default_disallow = enabled;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_delay(mut self, delay: Duration, random_delay: Duration) -> Self {
        self.delay = delay;
        self.random_delay = random_delay;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_raw_request(mut self, path: impl Into<String>) -> Self {
        self.raw_request = Some(path.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_sitemap(mut self, enabled: bool) -> Self {
        self.sitemap = enabled;
        self
    }

    pub fn with_robots(mut self, enabled: bool) -> Self {
        self.robots = enabled;
        self
    }

    pub fn with_other_sources(mut self, enabled: bool, include_subdomains: bool) -> Self {
        self.other_sources = enabled;
        self.include_subdomains = include_subdomains;
        self
    }

    pub fn with_derive(mut self, enabled: bool) -> Self {
        self.derive = enabled;
        self
    }

    pub fn with_filter_length(mut self, lengths: Vec<usize>) -> Self {
        self.filter_length = lengths;
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Provisioning steps in the order they are applied.
    pub fn steps(&self) -> Vec<ConfigStep> {
        let mut steps = Vec::new();

        if let Some(domain) = &self.whitelist_domain {
            steps.push(ConfigStep::Scope(whitelist_pattern(domain)));
        }
        steps.extend(self.scope.iter().cloned().map(ConfigStep::Scope));
        if self.default_disallow {
            steps.push(ConfigStep::Disallow(DEFAULT_DISALLOW.to_string()));
        }
        steps.extend(self.disallow.iter().cloned().map(ConfigStep::Disallow));

        steps.push(ConfigStep::Limit(LimitRule {
            parallelism: self.parallelism,
            delay: self.delay,
            random_delay: self.random_delay,
        }));
        steps.push(ConfigStep::MaxDepth(self.max_depth));
        if let Some(proxy) = &self.proxy {
            steps.push(ConfigStep::Proxy(proxy.clone()));
        }
        steps.push(ConfigStep::Timeout(self.timeout));
        steps.push(ConfigStep::UserAgent(self.user_agent.clone()));

        steps.extend(self.headers.iter().cloned().map(ConfigStep::Header));
        // A raw request replaces the plain cookie option
        if let Some(path) = &self.raw_request {
            steps.push(ConfigStep::RawRequest(path.clone()));
        } else if let Some(cookie) = &self.cookie {
            steps.push(ConfigStep::Cookie(cookie.clone()));
        }

        steps
    }

    /// Apply every step to a fresh builder and build the collector.
    pub fn collector_builder(&self) -> Result<CollectorBuilder> {
        let mut builder = Collector::builder();
        for step in self.steps() {
            debug!("Applying {:?}", step);
            step.apply(&mut builder)?;
        }
        Ok(builder)
    }

    /// HTTP client for seed sources: same proxy and timeout as the crawl.
    pub fn source_client(&self) -> Result<Client> {
        let timeout = if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        };
        let mut client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true);
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| CrawlError::Configuration(format!("invalid proxy {}: {}", proxy, e)))?;
            client = client.proxy(proxy);
        }
        client
            .build()
            .map_err(|e| CrawlError::Configuration(format!("failed to create HTTP client: {}", e)))
    }
}

/// Scope regex that admits `domain` over http and https.
pub fn whitelist_pattern(domain: &str) -> String {
    format!(r"^https?://{}", regex::escape(domain.trim()))
}

/// Parse a comma separated list of body lengths, skipping anything that is
/// not a number.
pub fn parse_lengths(list: &str) -> Vec<usize> {
    list.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

fn configuration(e: skitter_scanner::ScanError) -> CrawlError {
    CrawlError::Configuration(e.to_string())
}
