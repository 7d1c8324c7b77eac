pub mod commands;
pub mod handlers;

pub use handlers::{
    build_config, format_report, load_urls_from_file, load_urls_from_source, parse_url_line,
};
