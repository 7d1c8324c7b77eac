use crate::config::CrawlerConfig;
use crate::dedup::DedupFilter;
use crate::derivation::spawn_derived_values;
use crate::error::{CrawlError, Result, is_suppressed_status};
use crate::normalize::decode_body;
use crate::report::{Category, Report, SOURCE_BODY};
use crate::sources::{HistoricalSource, RobotsSource, SeedSource, SitemapSource};
use skitter_scanner::{Collector, HtmlElement, Response, ScanError};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle of a crawl session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Building the collector from the configuration.
    Provisioning,
    /// Seeds are still being consumed.
    Running,
    /// Input is exhausted; waiting for in-flight work.
    Draining,
    /// Cancellation was observed. Streams close once in-flight fetches end.
    Cancelled,
    Closed,
}

/// Handle to a running session. Both streams must be read; the session is
/// complete once both have closed.
pub struct CrawlSession {
    pub reports: mpsc::Receiver<Report>,
    pub errors: mpsc::Receiver<CrawlError>,
    phase: watch::Receiver<Phase>,
    cancel: CancellationToken,
}

impl CrawlSession {
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn phase_changes(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain both streams until they close.
    pub async fn collect(mut self) -> (Vec<Report>, Vec<CrawlError>) {
        let mut reports = Vec::new();
        let mut errors = Vec::new();
        let mut reports_open = true;
        let mut errors_open = true;

        while reports_open || errors_open {
            tokio::select! {
                report = self.reports.recv(), if reports_open => match report {
                    Some(report) => reports.push(report),
                    None => reports_open = false,
                },
                err = self.errors.recv(), if errors_open => match err {
                    Some(err) => errors.push(err),
                    None => errors_open = false,
                },
            }
        }
        (reports, errors)
    }
}

/// Entry point: one `Crawler` can start any number of independent sessions.
pub struct Crawler {
    config: CrawlerConfig,
    sources: Vec<Arc<dyn SeedSource>>,
}

impl Crawler {
    pub fn new(config: CrawlerConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
        }
    }

    /// Add a seed source on top of the ones enabled in the configuration.
    pub fn with_source(mut self, source: Arc<dyn SeedSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Crawl a fixed list of seeds. Must be called inside a tokio runtime.
    pub fn start<I, S>(&self, seeds: I) -> CrawlSession
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let seeds: Vec<String> = seeds.into_iter().map(Into::into).collect();
        self.launch(CancellationToken::new(), Frontier::Batch(seeds.into_iter()))
    }

    /// Crawl seeds read from `sites` until the sender side is dropped.
    /// Cancelling `cancel` cancels the session; cancelling the session does
    /// not cancel `cancel`.
    pub fn stream_crawl(
        &self,
        cancel: CancellationToken,
        sites: mpsc::Receiver<String>,
    ) -> CrawlSession {
        self.launch(cancel.child_token(), Frontier::Stream(sites))
    }

    fn launch(&self, cancel: CancellationToken, frontier: Frontier) -> CrawlSession {
        let buffer = self.config.buffer.max(1);
        let (report_tx, reports) = mpsc::channel(buffer);
        let (error_tx, errors) = mpsc::channel(buffer);
        let (phase_tx, phase) = watch::channel(Phase::Provisioning);

        let session = Session {
            config: self.config.clone(),
            extra_sources: self.sources.clone(),
            filter: Arc::new(DedupFilter::new()),
            report_tx,
            error_tx,
            phase_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(session.run(frontier));

        CrawlSession {
            reports,
            errors,
            phase,
            cancel,
        }
    }
}

enum Frontier {
    Batch(std::vec::IntoIter<String>),
    Stream(mpsc::Receiver<String>),
}

impl Frontier {
    async fn next(&mut self) -> Option<String> {
        match self {
            Frontier::Batch(seeds) => seeds.next(),
            Frontier::Stream(sites) => sites.recv().await,
        }
    }
}

enum Event {
    Report(Report),
    Error(CrawlError),
}

/// An event on its way from a hook to the session loop. The token keeps the
/// collector from quiescing while the event is queued.
struct Pending {
    event: Event,
    _token: TaskTrackerToken,
}

/// What every hook closure holds: a way to queue events, and the session's
/// cancellation state.
#[derive(Clone)]
struct HandOff {
    tx: mpsc::UnboundedSender<Pending>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    filter_length: Arc<Vec<usize>>,
}

impl HandOff {
    fn send(&self, event: Event) {
        if self.cancel.is_cancelled() {
            return;
        }
        let pending = Pending {
            event,
            _token: self.tracker.token(),
        };
        if self.tx.send(pending).is_err() {
            debug!("Session loop is gone, dropping event");
        }
    }

    fn element(&self, element: &HtmlElement, category: Category, attr: &str) {
        let Some(value) = element.attr(attr) else {
            return;
        };
        let report = Report::new(category, value, SOURCE_BODY, element.url.clone())
            .with_depth(element.depth);
        self.send(Event::Report(report));
    }

    /// Forms are reported by the page they sit on.
    fn page(&self, element: &HtmlElement, category: Category) {
        let report = Report::new(category, element.url.as_str(), SOURCE_BODY, element.url.clone())
            .with_depth(element.depth);
        self.send(Event::Report(report));
    }

    /// Decoded body, or `None` when its length is filtered out.
    fn body(&self, response: &Response) -> Option<String> {
        let body = decode_body(&response.body);
        if self.filter_length.contains(&body.len()) {
            debug!("Skipping {} (length {} is filtered)", response.url, body.len());
            return None;
        }
        Some(body)
    }

    fn response(&self, response: &Response) {
        let Some(body) = self.body(response) else {
            return;
        };
        let report = Report::new(
            Category::FetchedPage,
            response.url.as_str(),
            SOURCE_BODY,
            response.url.clone(),
        )
        .with_status(response.status_code)
        .with_body(body)
        .with_depth(response.depth);
        self.send(Event::Report(report));
    }

    fn failure(&self, response: &Response, err: &ScanError) {
        if is_suppressed_status(response.status_code) {
            debug!("Suppressed {} for {}", response.status_code, response.url);
            return;
        }

        self.send(Event::Error(CrawlError::Transport {
            url: response.url.to_string(),
            status: response.status_code,
            message: err.to_string(),
        }));

        // Without a status there is no page to report
        if response.status_code == 0 {
            return;
        }
        let Some(body) = self.body(response) else {
            return;
        };
        let report = Report::new(
            Category::FetchedPage,
            response.url.as_str(),
            SOURCE_BODY,
            response.url.clone(),
        )
        .with_status(response.status_code)
        .with_body(body)
        .with_error(err.to_string())
        .with_depth(response.depth);
        self.send(Event::Report(report));
    }
}

/// Per-session state owned by the session task.
struct Session {
    config: CrawlerConfig,
    extra_sources: Vec<Arc<dyn SeedSource>>,
    filter: Arc<DedupFilter>,
    report_tx: mpsc::Sender<Report>,
    error_tx: mpsc::Sender<CrawlError>,
    phase_tx: watch::Sender<Phase>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(self, frontier: Frontier) {
        let (pending_tx, mut pending_rx) = mpsc::unbounded_channel();

        let provisioned = self
            .provision(pending_tx)
            .and_then(|(collector, hand_off)| Ok((collector, hand_off, self.seed_sources()?)));
        let (collector, hand_off, sources) = match provisioned {
            Ok(provisioned) => provisioned,
            Err(e) => {
                warn!("Session not started: {}", e);
                let _ = self.error_tx.send(e).await;
                self.set_phase(Phase::Closed);
                return;
            }
        };

        self.set_phase(Phase::Running);
        let mut seeding = tokio::spawn(seed_frontier(
            frontier,
            Arc::clone(&collector),
            sources,
            Arc::clone(&self.filter),
            hand_off.clone(),
            self.cancel.clone(),
        ));

        let mut seeding_done = false;
        let mut cancelled = false;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    info!("Crawl cancelled, waiting for {} in-flight tasks", collector.in_flight());
                    self.set_phase(Phase::Cancelled);
                }
                Some(pending) = pending_rx.recv() => {
                    self.process(pending, &collector, &hand_off).await;
                }
                result = &mut seeding, if !seeding_done => {
                    seeding_done = true;
                    if let Err(e) = result {
                        warn!("Seeding task failed: {}", e);
                    }
                    self.set_phase(Phase::Draining);
                }
                _ = collector.wait(), if seeding_done => break,
            }
        }

        // Every queued event holds a tracker token, so nothing is left here
        pending_rx.close();
        self.set_phase(Phase::Closed);
        info!(
            "Crawl finished: {} outputs, {} follow-ups checked, {} URLs scheduled",
            self.filter.emitted_count(),
            self.filter.visit_count(),
            collector.visited_count()
        );
    }

    /// Apply every configuration step, then register the hooks.
    fn provision(
        &self,
        pending_tx: mpsc::UnboundedSender<Pending>,
    ) -> Result<(Arc<Collector>, HandOff)> {
        let mut collector = self.config.collector_builder()?.build().map_err(|e| {
            CrawlError::Configuration(e.to_string())
        })?;

        let hand_off = HandOff {
            tx: pending_tx,
            tracker: collector.tracker(),
            cancel: self.cancel.clone(),
            filter_length: Arc::new(self.config.filter_length.clone()),
        };

        let hooks: [(&str, Category, Option<&'static str>); 4] = [
            ("[href]", Category::Reference, Some("href")),
            ("[src]", Category::ScriptOrDataAsset, Some("src")),
            ("form[action]", Category::Form, None),
            (r#"input[type="file"]"#, Category::UploadForm, None),
        ];
        for (selector, category, attr) in hooks {
            let h = hand_off.clone();
            collector
                .on_html(selector, move |element| match attr {
                    Some(attr) => h.element(element, category, attr),
                    None => h.page(element, category),
                })
                .map_err(|e| CrawlError::Configuration(e.to_string()))?;
        }

        let h = hand_off.clone();
        collector.on_response(move |response| h.response(response));
        let h = hand_off.clone();
        collector.on_error(move |response, err| h.failure(response, err));

        let cancel = self.cancel.clone();
        collector.on_request(move |request| {
            if cancel.is_cancelled() {
                debug!("Cancelled, aborting request to {}", request.url);
                request.abort();
            }
        });

        Ok((Arc::new(collector), hand_off))
    }

    fn seed_sources(&self) -> Result<Vec<Arc<dyn SeedSource>>> {
        let mut sources: Vec<Arc<dyn SeedSource>> = Vec::new();
        if self.config.sitemap || self.config.robots || self.config.other_sources {
            let client = self.config.source_client()?;
            if self.config.sitemap {
                sources.push(Arc::new(SitemapSource::new(client.clone())));
            }
            if self.config.robots {
                sources.push(Arc::new(RobotsSource::new(client.clone())));
            }
            if self.config.other_sources {
                sources.push(Arc::new(HistoricalSource::new(
                    client,
                    self.config.include_subdomains,
                )));
            }
        }
        sources.extend(self.extra_sources.iter().cloned());
        Ok(sources)
    }

    async fn process(&self, pending: Pending, collector: &Arc<Collector>, hand_off: &HandOff) {
        if self.cancel.is_cancelled() {
            return;
        }
        match pending.event {
            Event::Error(err) => {
                debug!("Reporting error: {}", err);
                let sent = tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    sent = self.error_tx.send(err) => sent,
                };
                if sent.is_err() {
                    debug!("Error receiver dropped");
                }
            }
            Event::Report(report) => self.emit(report, collector, hand_off).await,
        }
    }

    /// Normalize, derive, dedup, emit, then schedule follow-ups.
    async fn emit(&self, report: Report, collector: &Arc<Collector>, hand_off: &HandOff) {
        let report = report.normalized();
        if report.output().is_empty() {
            return;
        }

        if self.config.derive && report.is_derivable() {
            derive(report.clone(), collector, hand_off.clone());
        }

        if self.filter.test_and_insert(report.output()) {
            debug!("Already emitted {}", report.output());
            return;
        }

        let follow_ups = report.follow_ups();
        let depth = report.depth() + 1;
        let sent = tokio::select! {
            _ = self.cancel.cancelled() => return,
            sent = self.report_tx.send(report) => sent,
        };
        if sent.is_err() {
            info!("Report receiver dropped, cancelling crawl");
            self.cancel.cancel();
            return;
        }

        for url in follow_ups {
            if self.filter.test_and_insert_visit(&url) {
                continue;
            }
            match collector.visit_at(&url, depth) {
                Ok(()) => debug!("Scheduled {} at depth {}", url, depth),
                Err(e) if e.is_refusal() => debug!("{}", e),
                Err(e) => debug!("Not visiting {}: {}", url, e),
            }
        }
    }

    /// Cancelled stays cancelled.
    fn set_phase(&self, phase: Phase) {
        self.phase_tx.send_if_modified(|current| {
            if *current == Phase::Cancelled || *current == phase {
                return false;
            }
            debug!("Session phase {:?} -> {:?}", current, phase);
            *current = phase;
            true
        });
    }
}

/// Run derivation off the session loop; its results come back as events.
fn derive(report: Report, collector: &Collector, hand_off: HandOff) {
    let page = report.output().to_string();
    collector.spawn(async move {
        match spawn_derived_values(report).await {
            Ok(derived) => {
                for report in derived.reports {
                    hand_off.send(Event::Report(report));
                }
                if let Some(err) = derived.error {
                    hand_off.send(Event::Error(err));
                }
            }
            Err(e) => warn!("Derivation for {} did not finish: {}", page, e),
        }
    });
}

async fn seed_frontier(
    mut frontier: Frontier,
    collector: Arc<Collector>,
    sources: Vec<Arc<dyn SeedSource>>,
    filter: Arc<DedupFilter>,
    hand_off: HandOff,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = frontier.next() => next,
        };
        let Some(raw) = next else {
            debug!("Frontier input exhausted");
            break;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let target = match parse_seed(raw) {
            Ok(target) => target,
            Err(e) => {
                warn!("{}", e);
                hand_off.send(Event::Error(e));
                continue;
            }
        };

        filter.test_and_insert_visit(target.as_str());
        match collector.visit(target.as_str()) {
            Ok(()) => info!("Crawling {}", target),
            Err(e) if e.is_refusal() => debug!("{}", e),
            Err(e) => hand_off.send(Event::Error(e.into())),
        }

        for source in &sources {
            let found = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                found = source.discover(&target) => found,
            };
            match found {
                Ok(urls) => {
                    debug!("{} found {} URLs for {}", source.name(), urls.len(), target);
                    for url in urls {
                        let report = Report::new(Category::Reference, url, source.name(), target.clone());
                        hand_off.send(Event::Report(report));
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
    }
}

fn parse_seed(raw: &str) -> Result<Url> {
    let malformed = |reason: String| CrawlError::MalformedSeed {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| malformed(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(malformed(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(malformed("missing host".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        assert!(parse_seed("https://example.com").is_ok());
        assert!(matches!(
            parse_seed("example.com"),
            Err(CrawlError::MalformedSeed { .. })
        ));
        assert!(matches!(
            parse_seed("ftp://example.com"),
            Err(CrawlError::MalformedSeed { .. })
        ));
        assert!(parse_seed("http://").is_err());
    }

    #[tokio::test]
    async fn test_cancelled_is_absorbing() {
        let (phase_tx, phase) = watch::channel(Phase::Provisioning);
        let (report_tx, _reports) = mpsc::channel(1);
        let (error_tx, _errors) = mpsc::channel(1);
        let session = Session {
            config: CrawlerConfig::default(),
            extra_sources: Vec::new(),
            filter: Arc::new(DedupFilter::new()),
            report_tx,
            error_tx,
            phase_tx,
            cancel: CancellationToken::new(),
        };

        session.set_phase(Phase::Running);
        assert_eq!(*phase.borrow(), Phase::Running);
        session.set_phase(Phase::Cancelled);
        session.set_phase(Phase::Draining);
        session.set_phase(Phase::Closed);
        assert_eq!(*phase.borrow(), Phase::Cancelled);
    }
}
