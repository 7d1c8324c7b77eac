use crate::error::{CrawlError, Result};
use crate::normalize;
use crate::report::{SOURCE_OTHER, SOURCE_ROBOTS, SOURCE_SITEMAP};
use async_trait::async_trait;
use futures::future::join_all;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

/// Common sitemap locations probed on every seed.
pub const SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_news.xml",
    "/sitemap_index.xml",
    "/sitemap-index.xml",
    "/sitemapindex.xml",
    "/sitemap-news.xml",
    "/post-sitemap.xml",
    "/page-sitemap.xml",
    "/portfolio-sitemap.xml",
    "/home_slider-sitemap.xml",
    "/category-sitemap.xml",
    "/author-sitemap.xml",
];

pub const WAYBACK_ENDPOINT: &str = "https://web.archive.org";
pub const OTX_ENDPOINT: &str = "https://otx.alienvault.com";

/// Anything that can turn a seed into more URLs to crawl.
///
/// Results are emitted as Reference records tagged with [`name`](Self::name)
/// and then followed like any other reference.
#[async_trait]
pub trait SeedSource: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self, target: &Url) -> Result<Vec<String>>;
}

/// `<loc>` entries of the well-known sitemap files.
pub struct SitemapSource {
    client: Client,
}

impl SitemapSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SeedSource for SitemapSource {
    fn name(&self) -> &str {
        SOURCE_SITEMAP
    }

    async fn discover(&self, target: &Url) -> Result<Vec<String>> {
        let probes = SITEMAP_PATHS.iter().filter_map(|path| target.join(path).ok()).map(|url| {
            let client = self.client.clone();
            async move {
                let response = match client.get(url.clone()).send().await {
                    Ok(r) if r.status() == StatusCode::OK => r,
                    Ok(r) => {
                        debug!("No sitemap at {} ({})", url, r.status());
                        return Vec::new();
                    }
                    Err(e) => {
                        debug!("Sitemap probe {} failed: {}", url, e);
                        return Vec::new();
                    }
                };
                match response.text().await {
                    Ok(body) => sitemap_locations(&body),
                    Err(e) => {
                        debug!("Failed to read sitemap {}: {}", url, e);
                        Vec::new()
                    }
                }
            }
        });

        let found: Vec<String> = join_all(probes).await.into_iter().flatten().collect();
        debug!("{} sitemap entries for {}", found.len(), target);
        Ok(found)
    }
}

/// Text of every `<loc>` element, in document order.
pub fn sitemap_locations(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut locations = Vec::new();
    let mut in_loc = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"loc" => in_loc = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(text)) if in_loc => {
                if let Ok(value) = text.unescape() {
                    push_location(&mut locations, &value);
                }
            }
            Ok(Event::CData(data)) if in_loc => {
                push_location(&mut locations, &String::from_utf8_lossy(&data));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Stopped parsing sitemap at {}: {}", reader.buffer_position(), e);
                break;
            }
            _ => {}
        }
    }
    locations
}

fn push_location(locations: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        locations.push(value.to_string());
    }
}

/// Allow and Disallow paths from `/robots.txt`.
pub struct RobotsSource {
    client: Client,
}

impl RobotsSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SeedSource for RobotsSource {
    fn name(&self) -> &str {
        SOURCE_ROBOTS
    }

    async fn discover(&self, target: &Url) -> Result<Vec<String>> {
        let robots = target.join("/robots.txt").map_err(|e| CrawlError::Source {
            source_name: SOURCE_ROBOTS.to_string(),
            message: format!("{}: {}", target, e),
        })?;

        let response = self
            .client
            .get(robots.clone())
            .send()
            .await
            .map_err(|e| source_error(SOURCE_ROBOTS, &robots, e))?;
        if response.status() != StatusCode::OK {
            debug!("No robots.txt at {} ({})", robots, response.status());
            return Ok(Vec::new());
        }
        let body = response
            .text()
            .await
            .map_err(|e| source_error(SOURCE_ROBOTS, &robots, e))?;

        Ok(robots_paths(target, &body))
    }
}

/// Resolve every `Allow:`/`Disallow:` value of a robots.txt body.
pub fn robots_paths(target: &Url, body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let (_, path) = line.split_once("llow:")?;
            let resolved = normalize::resolve(target, path);
            (!resolved.is_empty()).then_some(resolved)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OtxUrlList {
    #[serde(default)]
    url_list: Vec<OtxUrl>,
}

#[derive(Debug, Deserialize)]
struct OtxUrl {
    url: String,
}

/// Previously seen URLs of the seed host from the Wayback Machine CDX index
/// and AlienVault OTX.
pub struct HistoricalSource {
    client: Client,
    include_subdomains: bool,
    wayback: String,
    otx: String,
}

impl HistoricalSource {
    pub fn new(client: Client, include_subdomains: bool) -> Self {
        Self {
            client,
            include_subdomains,
            wayback: WAYBACK_ENDPOINT.to_string(),
            otx: OTX_ENDPOINT.to_string(),
        }
    }

    /// Point the archive lookups somewhere else.
    pub fn with_endpoints(mut self, wayback: impl Into<String>, otx: impl Into<String>) -> Self {
        self.wayback = wayback.into();
        self.otx = otx.into();
        self
    }

    async fn wayback_urls(&self, host: &str) -> Result<Vec<String>> {
        let pattern = if self.include_subdomains {
            format!("*.{}/*", host)
        } else {
            format!("{}/*", host)
        };
        let endpoint = format!("{}/cdx/search/cdx", self.wayback.trim_end_matches('/'));
        let response = self
            .client
            .get(&endpoint)
            .query(&[
                ("url", pattern.as_str()),
                ("output", "txt"),
                ("fl", "original"),
                ("collapse", "urlkey"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| history_error("wayback", e))?;
        let body = response.text().await.map_err(|e| history_error("wayback", e))?;

        Ok(body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn otx_urls(&self, host: &str) -> Result<Vec<String>> {
        let endpoint = format!(
            "{}/api/v1/indicators/hostname/{}/url_list",
            self.otx.trim_end_matches('/'),
            host
        );
        let list: OtxUrlList = self
            .client
            .get(&endpoint)
            .query(&[("limit", "500"), ("page", "1")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| history_error("otx", e))?
            .json()
            .await
            .map_err(|e| history_error("otx", e))?;

        Ok(list.url_list.into_iter().map(|entry| entry.url).collect())
    }
}

#[async_trait]
impl SeedSource for HistoricalSource {
    fn name(&self) -> &str {
        SOURCE_OTHER
    }

    async fn discover(&self, target: &Url) -> Result<Vec<String>> {
        let host = target.host_str().ok_or_else(|| CrawlError::Source {
            source_name: SOURCE_OTHER.to_string(),
            message: format!("{} has no host", target),
        })?;

        let (wayback, otx) = tokio::join!(self.wayback_urls(host), self.otx_urls(host));
        let mut found = Vec::new();
        for result in [wayback, otx] {
            match result {
                Ok(urls) => found.extend(urls),
                Err(e) => warn!("{}", e),
            }
        }
        debug!("{} historical URLs for {}", found.len(), host);
        Ok(found)
    }
}

fn source_error(name: &str, url: &Url, e: reqwest::Error) -> CrawlError {
    CrawlError::Source {
        source_name: name.to_string(),
        message: format!("{}: {}", url, e),
    }
}

fn history_error(provider: &str, e: reqwest::Error) -> CrawlError {
    CrawlError::Source {
        source_name: format!("{}/{}", SOURCE_OTHER, provider),
        message: e.to_string(),
    }
}
