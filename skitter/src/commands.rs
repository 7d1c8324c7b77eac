use clap::{arg, command};
use url::Url;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("skitter")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("skitter")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Only print records and errors").required(false))
        .arg(
            arg!(-v --"verbose" "Log every request and dedup decision")
                .required(false)
                .conflicts_with("quiet"),
        )
        .subcommand_required(true)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl one or more sites and stream every discovered URL, script, form, \
                subdomain and storage bucket.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The URL to crawl")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with_all(["hosts-file", "stdin"]),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to crawl")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("stdin"),
                )
                .arg(
                    arg!(--"stdin")
                        .required(false)
                        .help("Read URLs from standard input until it is closed")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-t --"threads" <NUM>)
                        .required(false)
                        .help("Maximum concurrent requests")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Maximum recursion depth; 0 for unlimited")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    arg!(-k --"delay" <SECONDS>)
                        .required(false)
                        .help("Pause after each request")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("0"),
                )
                .arg(
                    arg!(-K --"random-delay" <SECONDS>)
                        .required(false)
                        .help("Extra random pause of up to this many seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("0"),
                )
                .arg(
                    arg!(-m --"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout; 0 uses the default of 10")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(-p --"proxy" <URL>)
                        .required(false)
                        .help("Proxy for every request, e.g. http://127.0.0.1:8080"),
                )
                .arg(
                    arg!(-a --"user-agent" <AGENT>)
                        .required(false)
                        .help("'web', 'mobi' or a literal User-Agent string")
                        .default_value("web"),
                )
                .arg(
                    arg!(--"header" <HEADER>)
                        .required(false)
                        .help("Extra header as 'Name: value' (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"cookie" <COOKIE>)
                        .required(false)
                        .help("Cookie string sent with every request")
                        .conflicts_with("burp"),
                )
                .arg(
                    arg!(-B --"burp" <PATH>)
                        .required(false)
                        .help("Replay headers and cookies from a saved raw HTTP request"),
                )
                .arg(
                    arg!(-s --"scope" <REGEX>)
                        .required(false)
                        .help("Only visit URLs matching this regex (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(-w --"whitelist-domain" <DOMAIN>)
                        .required(false)
                        .help("Only visit URLs on this domain"),
                )
                .arg(
                    arg!(--"blacklist" <REGEX>)
                        .required(false)
                        .help("Never visit URLs matching this regex (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"no-default-blacklist")
                        .required(false)
                        .help("Also visit images, fonts, media and stylesheets")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"sitemap")
                        .required(false)
                        .help("Seed from well-known sitemap files")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"robots")
                        .required(false)
                        .help("Seed from robots.txt Allow/Disallow entries")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"other-source")
                        .required(false)
                        .help("Seed from the Wayback Machine and AlienVault OTX")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"include-subs")
                        .required(false)
                        .help("Include subdomains in historical lookups")
                        .action(clap::ArgAction::SetTrue)
                        .requires("other-source"),
                )
                .arg(
                    arg!(--"no-derive")
                        .required(false)
                        .help("Do not extract subdomains and buckets from page bodies")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-L --"filter-length" <LENGTHS>)
                        .required(false)
                        .help("Comma separated response lengths to ignore"),
                )
                .arg(
                    arg!(--"deadline" <SECONDS>)
                        .required(false)
                        .help("Cancel the crawl after this many seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print one JSON object per record")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}
