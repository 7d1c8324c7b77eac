use clap::ArgMatches;
use colored::Colorize;
use skitter_core::config::{DEFAULT_PARALLELISM, parse_lengths};
use skitter_core::{Category, CrawlError, CrawlSession, Crawler, CrawlerConfig, Report, UserAgent};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("One of --url, --hosts-file or --stdin must be provided".to_string())
    }
}

/// Load and parse URLs from a file
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let content = fs::read_to_string(&expanded)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_url_line(line.trim()))
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    // "host:port" parses with the host as scheme
    if Url::parse(line).is_ok_and(|url| url.has_host()) {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    warn!("Skipping invalid URL '{}'", line);
    None
}

/// Turn `crawl` arguments into a session configuration.
pub fn build_config(args: &ArgMatches) -> Result<CrawlerConfig, String> {
    let seconds = |name: &str| Duration::from_secs(args.get_one::<u64>(name).copied().unwrap_or(0));
    let strings = |name: &str| -> Vec<String> {
        args.get_many::<String>(name)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };

    let user_agent = args
        .get_one::<String>("user-agent")
        .map(|agent| agent.parse::<UserAgent>().unwrap_or_default())
        .unwrap_or_default();

    let mut config = CrawlerConfig::new()
        .with_parallelism(
            args.get_one::<usize>("threads")
                .copied()
                .unwrap_or(DEFAULT_PARALLELISM),
        )
        .with_max_depth(args.get_one::<usize>("depth").copied().unwrap_or(1))
        .with_delay(seconds("delay"), seconds("random-delay"))
        .with_timeout(seconds("timeout"))
        .with_user_agent(user_agent)
        .with_default_disallow(!args.get_flag("no-default-blacklist"))
        .with_sitemap(args.get_flag("sitemap"))
        .with_robots(args.get_flag("robots"))
        .with_other_sources(args.get_flag("other-source"), args.get_flag("include-subs"))
        .with_derive(!args.get_flag("no-derive"));

    config.scope = strings("scope");
    config.disallow = strings("blacklist");
    config.headers = strings("header");
    config.whitelist_domain = args.get_one::<String>("whitelist-domain").cloned();
    config.proxy = args.get_one::<String>("proxy").cloned();
    config.cookie = args.get_one::<String>("cookie").cloned();
    config.raw_request = args.get_one::<String>("burp").cloned();

    if let Some(lengths) = args.get_one::<String>("filter-length") {
        let parsed = parse_lengths(lengths);
        if parsed.is_empty() {
            return Err(format!("No valid lengths in '{}'", lengths));
        }
        config.filter_length = parsed;
    }

    if config.parallelism == 0 {
        return Err("--threads must be at least 1".to_string());
    }

    Ok(config)
}

/// One output line for a record.
pub fn format_report(report: &Report, json: bool) -> String {
    if json {
        return match serde_json::to_string(report) {
            Ok(line) => line,
            Err(e) => format!("{{\"error\":\"{}\"}}", e),
        };
    }

    let tag = format!("[{}]", report.category());
    let tag = match report.category() {
        Category::FetchedPage => tag.bright_green(),
        Category::Reference => tag.bright_blue(),
        Category::ScriptOrDataAsset => tag.cyan(),
        Category::Form | Category::UploadForm => tag.yellow(),
        Category::CloudBucket => tag.bright_magenta(),
        Category::Domain => tag.magenta(),
    };

    if report.status_code() > 0 {
        let code = format!("[code-{}]", report.status_code());
        let code = match report.status_code() {
            200..=299 => code.green(),
            300..=399 => code.yellow(),
            _ => code.red(),
        };
        format!("{} - {} - {}", tag, code, report.output())
    } else {
        format!("{} - {}", tag, report.output())
    }
}

pub fn format_error(err: &CrawlError) -> String {
    format!("{} {}", "✗".red().bold(), err)
}

/// Forward non-empty stdin lines as seed URLs until stdin closes.
fn stdin_urls() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(url) = parse_url_line(line) else {
                continue;
            };
            if tx.send(url).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Cancel the session on Ctrl-C or once the deadline passes.
fn install_cancellation(cancel: CancellationToken, deadline: Option<Duration>) {
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for in-flight requests");
            on_interrupt.cancel();
        }
    });

    if let Some(deadline) = deadline {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    info!("Deadline of {}s reached, stopping", deadline.as_secs());
                    cancel.cancel();
                }
            }
        });
    }
}

/// Print both streams until the session closes. Returns (records, errors).
pub async fn print_session(mut session: CrawlSession, json: bool) -> (usize, usize) {
    let mut records = 0;
    let mut errors = 0;
    let mut reports_open = true;
    let mut errors_open = true;

    while reports_open || errors_open {
        tokio::select! {
            report = session.reports.recv(), if reports_open => match report {
                Some(report) => {
                    records += 1;
                    println!("{}", format_report(&report, json));
                }
                None => reports_open = false,
            },
            err = session.errors.recv(), if errors_open => match err {
                Some(err) => {
                    errors += 1;
                    eprintln!("{}", format_error(&err));
                }
                None => errors_open = false,
            },
        }
    }
    (records, errors)
}

pub async fn handle_crawl(args: &ArgMatches, quiet: bool) -> Result<(), String> {
    let config = build_config(args)?;
    let json = args.get_flag("json");
    let deadline = args.get_one::<u64>("deadline").map(|s| Duration::from_secs(*s));

    let crawler = Crawler::new(config);
    let session = if args.get_flag("stdin") {
        crawler.stream_crawl(CancellationToken::new(), stdin_urls())
    } else {
        let urls = load_urls_from_source(
            args.get_one::<Url>("url"),
            args.get_one::<PathBuf>("hosts-file"),
        )?;
        if !quiet {
            eprintln!("{} Crawling {} host(s)", "→".blue(), urls.len());
        }
        crawler.start(urls)
    };
    install_cancellation(session.cancellation_token(), deadline);

    let (records, errors) = print_session(session, json).await;
    if !quiet {
        eprintln!(
            "{} Crawl complete: {} records, {} errors",
            "✓".green().bold(),
            records.to_string().bright_white(),
            errors.to_string().bright_white()
        );
    }
    Ok(())
}
