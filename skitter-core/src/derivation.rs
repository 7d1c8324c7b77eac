use crate::error::{CrawlError, Result};
use crate::report::{Category, Report};
use regex::Regex;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::LazyLock;
use tokio::task::JoinHandle;
use tracing::debug;

/// Object-storage endpoints: virtual-hosted and path-style S3 (global and
/// regional), Google Cloud Storage, and `s3://` / `gs://` URIs.
static BUCKET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)",
        r"[a-z0-9][a-z0-9.\-]*\.s3(?:[.\-](?:website[.\-])?[a-z0-9\-]+)?\.amazonaws\.com(?:\.cn)?",
        r"|s3(?:[.\-](?:website[.\-])?[a-z0-9\-]+)?\.amazonaws\.com(?:\.cn)?/[a-z0-9][a-z0-9.\-_]*",
        r"|[a-z0-9][a-z0-9.\-_]*\.storage\.googleapis\.com",
        r"|storage\.googleapis\.com/[a-z0-9][a-z0-9.\-_]*",
        r"|(?:s3|gs)://[a-z0-9][a-z0-9.\-_]*",
    ))
    .expect("bucket pattern is valid")
});

/// Everything derived from one page.
#[derive(Debug, Default)]
pub struct DerivedValues {
    pub reports: Vec<Report>,
    /// Set when the page host has no registrable domain; buckets are still
    /// extracted in that case.
    pub error: Option<CrawlError>,
}

/// Registrable domain (public suffix plus one label) of `host`.
pub fn base_domain(host: &str) -> Result<String> {
    let host = host
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    let fail = |reason: &str| CrawlError::DomainResolution {
        host: host.clone(),
        reason: reason.to_string(),
    };

    if host.is_empty() {
        return Err(fail("empty host"));
    }
    if host.parse::<IpAddr>().is_ok() {
        return Err(fail("IP addresses have no registrable domain"));
    }

    let domain = psl::domain(host.as_bytes()).ok_or_else(|| fail("no registrable domain"))?;
    if !domain.suffix().is_known() {
        return Err(fail("unknown public suffix"));
    }
    std::str::from_utf8(domain.as_bytes())
        .map(str::to_string)
        .map_err(|_| fail("host is not valid UTF-8"))
}

/// Every host in `body` that sits strictly below `base`, lower-cased, in order
/// of first appearance.
pub fn extract_subdomains(body: &str, base: &str) -> Result<Vec<String>> {
    let pattern = format!(
        r"(?i)\b(?:[a-z0-9_](?:[a-z0-9_\-]{{0,61}}[a-z0-9])?\.)+{}\b",
        regex::escape(base)
    );
    let regex = Regex::new(&pattern).map_err(|e| CrawlError::DomainResolution {
        host: base.to_string(),
        reason: format!("cannot build subdomain pattern: {}", e),
    })?;
    let hosts = regex
        .find_iter(body)
        .filter(|m| !continues_host(&body.as_bytes()[m.end()..]))
        .map(|m| m.as_str());
    Ok(unique_lowercase(hosts))
}

/// True when the text right after a match keeps going as a host name
/// (`-label` or `.label`), so the match is only a prefix of a longer host.
fn continues_host(rest: &[u8]) -> bool {
    match rest {
        [b'-', ..] => true,
        [b'.', next, ..] => next.is_ascii_alphanumeric(),
        _ => false,
    }
}

/// Every storage bucket endpoint in `body`, lower-cased, in order of first
/// appearance.
pub fn extract_buckets(body: &str) -> Vec<String> {
    unique_lowercase(BUCKET_PATTERN.find_iter(body).map(|m| m.as_str()))
}

/// Domain records for subdomains of the page's own registrable domain.
pub fn subdomain_values(report: &Report) -> Result<Vec<Report>> {
    let host = report
        .origin()
        .host_str()
        .ok_or_else(|| CrawlError::DomainResolution {
            host: report.origin().to_string(),
            reason: "URL has no host".to_string(),
        })?;
    let base = base_domain(host)?;
    let found = extract_subdomains(report.body(), &base)?;
    debug!("{} subdomains of {} in {}", found.len(), base, report.output());
    Ok(found
        .into_iter()
        .map(|domain| report.derive(Category::Domain, domain))
        .collect())
}

pub fn bucket_values(report: &Report) -> Vec<Report> {
    extract_buckets(report.body())
        .into_iter()
        .map(|bucket| report.derive(Category::CloudBucket, bucket))
        .collect()
}

/// Subdomains and buckets of a fetched page. Pages that are not derivable
/// (not a FetchedPage, or empty body) yield nothing.
pub fn derived_values(report: &Report) -> DerivedValues {
    if !report.is_derivable() {
        return DerivedValues::default();
    }

    let mut derived = DerivedValues::default();
    match subdomain_values(report) {
        Ok(domains) => derived.reports.extend(domains),
        Err(e) => derived.error = Some(e),
    }
    derived.reports.extend(bucket_values(report));
    derived
}

/// Run [`derived_values`] on the blocking pool; large bodies make the regex
/// scan CPU-bound.
pub fn spawn_derived_values(report: Report) -> JoinHandle<DerivedValues> {
    tokio::task::spawn_blocking(move || derived_values(&report))
}

fn unique_lowercase<'a>(found: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    found
        .map(str::to_ascii_lowercase)
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_domain() {
        assert_eq!(base_domain("www.example.com").unwrap(), "example.com");
        assert_eq!(base_domain("a.b.example.co.uk").unwrap(), "example.co.uk");
        assert_eq!(base_domain("Example.COM.").unwrap(), "example.com");
    }

    #[test]
    fn test_base_domain_failures() {
        assert!(matches!(
            base_domain("127.0.0.1"),
            Err(CrawlError::DomainResolution { .. })
        ));
        assert!(base_domain("[::1]").is_err());
        assert!(base_domain("localhost").is_err());
        assert!(base_domain("").is_err());
    }

    #[test]
    fn test_subdomains_exclude_base_and_strangers() {
        let body = "https://api.example.com/v1 example.com www.other.com \
                    badexample.com dev.API.example.com api.example.com";
        let found = extract_subdomains(body, "example.com").unwrap();
        assert_eq!(found, vec!["api.example.com", "dev.api.example.com"]);
    }

    #[test]
    fn test_subdomain_prefixes_of_longer_hosts_are_skipped() {
        let body = "old.example.com-cdn.net api.example.com.evil.net \
                    end of sentence at dev.example.com. next.example.com";
        let found = extract_subdomains(body, "example.com").unwrap();
        assert_eq!(found, vec!["dev.example.com", "next.example.com"]);
    }

    #[test]
    fn test_bucket_forms() {
        let body = r#"
            <img src="https://assets.s3.amazonaws.com/logo.png">
            <a href="https://s3.us-west-2.amazonaws.com/reports-2024/q1.pdf">
            <script>var b = "media.s3-eu-west-1.amazonaws.com";</script>
            gs://Analytics-Dump and s3://raw-logs
            https://cdn-prod.storage.googleapis.com/app.js
            https://assets.s3.amazonaws.com/other.png
        "#;
        let found = extract_buckets(body);
        assert_eq!(
            found,
            vec![
                "assets.s3.amazonaws.com",
                "s3.us-west-2.amazonaws.com/reports-2024",
                "media.s3-eu-west-1.amazonaws.com",
                "gs://analytics-dump",
                "s3://raw-logs",
                "cdn-prod.storage.googleapis.com",
            ]
        );
    }

    #[test]
    fn test_no_buckets() {
        assert!(extract_buckets("<html>plain page, amazon.com</html>").is_empty());
    }
}
