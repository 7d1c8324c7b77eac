pub mod agents;
pub mod collector;
pub mod error;
pub mod raw_request;
pub mod request;
pub mod response;
pub mod settings;

pub use agents::UserAgent;
pub use collector::{Collector, ErrorCallback, HtmlCallback, RequestCallback, ResponseCallback};
pub use error::ScanError;
pub use request::Request;
pub use response::{HtmlElement, Response};
pub use settings::{CollectorBuilder, DEFAULT_TIMEOUT, LimitRule};
