use async_trait::async_trait;
use skitter_core::error::Result as CrawlResult;
use skitter_core::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

async fn mount(server: &MockServer, at: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(response)
        .mount(server)
        .await;
}

fn outputs(reports: &[Report], category: Category) -> Vec<String> {
    reports
        .iter()
        .filter(|r| r.category() == category)
        .map(|r| r.output().to_string())
        .collect()
}

fn transport_statuses(errors: &[CrawlError]) -> Vec<u16> {
    errors
        .iter()
        .filter_map(|e| match e {
            CrawlError::Transport { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

async fn requested_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

// ============================================================================
// Batch crawl
// ============================================================================

#[tokio::test]
async fn test_batch_crawl_end_to_end() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount(
        &server,
        "/",
        html(
            r#"<html><body>
                <a href="/a">A</a>
                <a href="mailto:admin@example.com">mail</a>
                <a href="javascript:void(0)">js</a>
                <script src="/static/app.min.js"></script>
                <img src="/logo.png">
                <form action="/login"><input type="file" name="upload"></form>
                <p>assets live in backup.s3.amazonaws.com</p>
            </body></html>"#,
        ),
    )
    .await;
    mount(
        &server,
        "/a",
        html(r#"<a href="/">home</a><a href="/forbidden">f</a><a href="/limited">l</a>"#),
    )
    .await;
    mount(
        &server,
        "/static/app.min.js",
        ResponseTemplate::new(200)
            .set_body_raw("fetch('/api/v1/users')", "application/javascript"),
    )
    .await;
    mount(&server, "/forbidden", ResponseTemplate::new(403).set_body_string("no")).await;
    mount(&server, "/limited", ResponseTemplate::new(429)).await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let crawler = Crawler::new(CrawlerConfig::default());
    let session = crawler.start([base.clone()]);
    let phase = session.phase_changes();
    let (reports, errors) = session.collect().await;

    assert_eq!(*phase.borrow(), Phase::Closed);

    // Every output appears once
    let unique: HashSet<&str> = reports.iter().map(|r| r.output()).collect();
    assert_eq!(unique.len(), reports.len());
    assert!(reports.iter().all(|r| !r.output().is_empty()));

    assert_eq!(outputs(&reports, Category::FetchedPage), vec![format!("{}/", base)]);
    let refs = outputs(&reports, Category::Reference);
    assert!(refs.contains(&format!("{}/a", base)));
    assert!(refs.contains(&format!("{}/forbidden", base)));
    assert!(refs.contains(&format!("{}/limited", base)));
    assert!(!refs.iter().any(|r| r.starts_with("mailto") || r.starts_with("javascript")));

    let srcs = outputs(&reports, Category::ScriptOrDataAsset);
    assert!(srcs.contains(&format!("{}/static/app.min.js", base)));
    assert!(srcs.contains(&format!("{}/logo.png", base)));

    assert_eq!(
        outputs(&reports, Category::CloudBucket),
        vec!["backup.s3.amazonaws.com".to_string()]
    );

    // The unminified sibling is tried even though it does not exist
    let paths = requested_paths(&server).await;
    assert!(paths.contains(&"/static/app.min.js".to_string()));
    assert!(paths.contains(&"/static/app.js".to_string()));
    assert!(paths.contains(&"/forbidden".to_string()));
    assert!(paths.contains(&"/limited".to_string()));

    // 403 is reported; 404 and 429 are not
    let statuses = transport_statuses(&errors);
    assert_eq!(statuses, vec![403]);

    // 127.0.0.1 has no registrable domain
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, CrawlError::DomainResolution { .. }))
    );
}

#[tokio::test]
async fn test_records_serialize_without_body() {
    let server = MockServer::start().await;
    mount(&server, "/", html("<html>hello</html>")).await;

    let crawler = Crawler::new(CrawlerConfig::default().with_derive(false));
    let (reports, errors) = crawler.start([server.uri()]).collect().await;
    assert!(errors.is_empty());
    assert_eq!(reports.len(), 1);

    let value = serde_json::to_value(&reports[0]).unwrap();
    assert_eq!(value["type"], "url");
    assert_eq!(value["status"], 200);
    assert_eq!(value["source"], "body");
    assert_eq!(value["length"], "<html>hello</html>".len());
    assert_eq!(value["input"], format!("{}/", server.uri()));
    assert!(value.get("body").is_none());
    assert!(value.get("err").is_none());
}

#[tokio::test]
async fn test_malformed_seed_is_reported_and_skipped() {
    let server = MockServer::start().await;
    mount(&server, "/", html("<html>ok</html>")).await;

    let crawler = Crawler::new(CrawlerConfig::default().with_derive(false));
    let (reports, errors) = crawler
        .start(["not a url", "ftp://files.test/", server.uri().as_str()])
        .collect()
        .await;

    let malformed: Vec<_> = errors
        .iter()
        .filter(|e| matches!(e, CrawlError::MalformedSeed { .. }))
        .collect();
    assert_eq!(malformed.len(), 2);
    assert!(malformed.iter().all(|e| !e.is_fatal()));
    assert_eq!(outputs(&reports, Category::FetchedPage).len(), 1);
}

#[tokio::test]
async fn test_configuration_error_closes_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let crawler = Crawler::new(CrawlerConfig::default().with_scope("(unclosed"));
    let session = crawler.start([server.uri()]);
    let phase = session.phase_changes();
    let (reports, errors) = session.collect().await;

    assert!(reports.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_fatal());
    assert_eq!(*phase.borrow(), Phase::Closed);
}

#[tokio::test]
async fn test_max_depth_stops_follow_ups() {
    let server = MockServer::start().await;
    mount(&server, "/", html(r#"<a href="/next">next</a>"#)).await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let crawler = Crawler::new(CrawlerConfig::default().with_max_depth(1).with_derive(false));
    let (reports, _) = crawler.start([server.uri()]).collect().await;

    // Still reported, never fetched
    assert_eq!(
        outputs(&reports, Category::Reference),
        vec![format!("{}/next", server.uri())]
    );
}

#[tokio::test]
async fn test_filtered_length_is_dropped() {
    let server = MockServer::start().await;
    let body = r#"<html><a href="/kept">k</a></html>"#;
    mount(&server, "/", html(body)).await;
    mount(&server, "/kept", html("<html>different size</html>")).await;

    let config = CrawlerConfig::default()
        .with_derive(false)
        .with_filter_length(vec![body.len()]);
    let (reports, _) = Crawler::new(config).start([server.uri()]).collect().await;

    assert!(outputs(&reports, Category::FetchedPage).is_empty());
    assert_eq!(
        outputs(&reports, Category::Reference),
        vec![format!("{}/kept", server.uri())]
    );
    assert!(requested_paths(&server).await.contains(&"/kept".to_string()));
}

#[tokio::test]
async fn test_length_filter_uses_decoded_body() {
    let server = MockServer::start().await;
    let raw = "<html>next=https%3A%2F%2Fapp.example.com</html>";
    let decoded = "<html>next=https://app.example.com</html>";
    mount(&server, "/", html(raw)).await;

    let by_raw = CrawlerConfig::default()
        .with_derive(false)
        .with_filter_length(vec![raw.len()]);
    let (reports, _) = Crawler::new(by_raw).start([server.uri()]).collect().await;
    let pages: Vec<_> = reports
        .iter()
        .filter(|r| r.category() == Category::FetchedPage)
        .collect();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].length(), decoded.len());

    let by_decoded = CrawlerConfig::default()
        .with_derive(false)
        .with_filter_length(vec![decoded.len()]);
    let (reports, _) = Crawler::new(by_decoded).start([server.uri()]).collect().await;
    assert!(outputs(&reports, Category::FetchedPage).is_empty());
}

// ============================================================================
// Streaming mode and cancellation
// ============================================================================

#[tokio::test]
async fn test_stream_crawl_consumes_until_closed() {
    let server = MockServer::start().await;
    mount(&server, "/one", html("<html>1</html>")).await;
    mount(&server, "/two", html("<html>2</html>")).await;

    let (tx, rx) = mpsc::channel(4);
    let crawler = Crawler::new(CrawlerConfig::default().with_derive(false));
    let session = crawler.stream_crawl(CancellationToken::new(), rx);

    let base = server.uri();
    tokio::spawn(async move {
        tx.send(format!("{}/one", base)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(format!("{}/two", base)).await.unwrap();
        // Dropping the sender ends the input
    });

    let (reports, errors) = tokio::time::timeout(Duration::from_secs(10), session.collect())
        .await
        .expect("session should close after input ends");
    assert!(errors.is_empty());

    let mut pages = outputs(&reports, Category::FetchedPage);
    pages.sort();
    assert_eq!(
        pages,
        vec![format!("{}/one", server.uri()), format!("{}/two", server.uri())]
    );
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let server = MockServer::start().await;
    mount(&server, "/", html("<html></html>")).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (tx, rx) = mpsc::channel(1);
    tx.send(server.uri()).await.unwrap();
    drop(tx);

    let session = Crawler::new(CrawlerConfig::default()).stream_crawl(cancel, rx);
    let phase = session.phase_changes();
    let (reports, errors) = tokio::time::timeout(Duration::from_secs(5), session.collect())
        .await
        .expect("cancelled session should close");

    assert!(reports.is_empty());
    assert!(errors.is_empty());
    assert_eq!(*phase.borrow(), Phase::Cancelled);
    assert!(requested_paths(&server).await.is_empty());
}

#[tokio::test]
async fn test_cancel_mid_crawl_stops_new_requests() {
    let server = MockServer::start().await;
    let mut root = String::from("<html><body>");
    for i in 0..20 {
        root.push_str(&format!(r#"<a href="/slow/{}">{}</a>"#, i, i));
    }
    root.push_str("</body></html>");
    mount(&server, "/", html(&root)).await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>").set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let config = CrawlerConfig::default()
        .with_parallelism(1)
        .with_derive(false);
    let mut session = Crawler::new(config).start([server.uri()]);

    while let Some(report) = session.reports.recv().await {
        if report.category() == Category::Reference {
            break;
        }
    }
    session.cancel();
    let mut phase = session.phase_changes();
    phase.wait_for(|p| *p == Phase::Cancelled).await.unwrap();

    let _ = tokio::time::timeout(Duration::from_secs(10), session.collect())
        .await
        .expect("streams should close once in-flight requests finish");

    // The root plus at most the one request already in flight
    let requested = requested_paths(&server).await;
    assert!(requested.len() <= 2, "requests after cancel: {:?}", requested);
}

#[tokio::test]
async fn test_parent_token_cancels_stream_session() {
    let server = MockServer::start().await;
    mount(&server, "/", html("<html></html>")).await;

    let parent = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<String>(1);
    let session = Crawler::new(CrawlerConfig::default()).stream_crawl(parent.clone(), rx);

    // Input never ends on its own
    parent.cancel();
    let (reports, _) = tokio::time::timeout(Duration::from_secs(5), session.collect())
        .await
        .expect("parent cancellation should close the session");
    assert!(reports.is_empty());
    drop(tx);
}

// ============================================================================
// Seed sources
// ============================================================================

struct FixedSource(Vec<String>);

#[async_trait]
impl SeedSource for FixedSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn discover(&self, _target: &Url) -> CrawlResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_custom_source_urls_are_followed() {
    let server = MockServer::start().await;
    mount(&server, "/", html("<html></html>")).await;
    mount(&server, "/hidden", html(r#"<a href="/deeper">d</a>"#)).await;
    mount(&server, "/deeper", html("<html></html>")).await;

    let source = Arc::new(FixedSource(vec!["/hidden".to_string(), "mailto:x@y.z".to_string()]));
    let crawler = Crawler::new(CrawlerConfig::default().with_derive(false)).with_source(source);
    let (reports, _) = crawler.start([server.uri()]).collect().await;

    let from_source: Vec<_> = reports.iter().filter(|r| r.source() == "fixed").collect();
    assert_eq!(from_source.len(), 1);
    assert_eq!(from_source[0].category(), Category::Reference);
    assert_eq!(from_source[0].output(), format!("{}/hidden", server.uri()));

    let paths = requested_paths(&server).await;
    assert!(paths.contains(&"/hidden".to_string()));
    assert!(paths.contains(&"/deeper".to_string()));
}

#[tokio::test]
async fn test_sitemap_and_robots_seeds() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(&server, "/", html("<html></html>")).await;
    mount(
        &server,
        "/sitemap.xml",
        ResponseTemplate::new(200).set_body_string(format!(
            r#"<urlset><url><loc>{}/from-sitemap</loc></url></urlset>"#,
            base
        )),
    )
    .await;
    mount(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"),
    )
    .await;
    mount(&server, "/from-sitemap", html("<html></html>")).await;
    mount(&server, "/private/", html("<html></html>")).await;

    let config = CrawlerConfig::default()
        .with_derive(false)
        .with_sitemap(true)
        .with_robots(true);
    let (reports, _) = Crawler::new(config).start([base.clone()]).collect().await;

    let tagged = |source: &str| -> Vec<String> {
        reports
            .iter()
            .filter(|r| r.source() == source)
            .map(|r| r.output().to_string())
            .collect()
    };
    assert_eq!(tagged("sitemap"), vec![format!("{}/from-sitemap", base)]);
    assert_eq!(tagged("robots"), vec![format!("{}/private/", base)]);

    let paths = requested_paths(&server).await;
    assert!(paths.contains(&"/from-sitemap".to_string()));
    assert!(paths.contains(&"/private/".to_string()));
}

#[tokio::test]
async fn test_sessions_do_not_share_dedup_state() {
    let server = MockServer::start().await;
    mount(&server, "/", html(r#"<a href="/x">x</a>"#)).await;
    mount(&server, "/x", html("<html></html>")).await;

    let crawler = Crawler::new(CrawlerConfig::default().with_derive(false));
    let (first, _) = crawler.start([server.uri()]).collect().await;
    let (second, _) = crawler.start([server.uri()]).collect().await;

    assert!(!first.is_empty());
    assert_eq!(first.len(), second.len());
}
