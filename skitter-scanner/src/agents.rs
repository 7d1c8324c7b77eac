use rand::seq::IndexedRandom;
use std::convert::Infallible;
use std::str::FromStr;

pub const DEFAULT_USER_AGENT: &str = "Skitter/0.1 (https://github.com/trapdoorsec/skitter)";

const WEB_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

const MOBILE_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-S911B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPad; CPU OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// How the `User-Agent` header is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgent {
    /// Random desktop browser string per request.
    Web,
    /// Random mobile browser string per request.
    Mobile,
    Custom(String),
}

impl UserAgent {
    pub fn rotates(&self) -> bool {
        !matches!(self, UserAgent::Custom(_))
    }

    /// The string to send for the next request.
    pub fn pick(&self) -> &str {
        let pool = match self {
            UserAgent::Web => WEB_AGENTS,
            UserAgent::Mobile => MOBILE_AGENTS,
            UserAgent::Custom(agent) => return agent,
        };
        pool.choose(&mut rand::rng()).copied().unwrap_or(DEFAULT_USER_AGENT)
    }
}

impl FromStr for UserAgent {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "web" => UserAgent::Web,
            "mobi" => UserAgent::Mobile,
            _ => UserAgent::Custom(s.to_string()),
        })
    }
}

impl Default for UserAgent {
    fn default() -> Self {
        UserAgent::Custom(DEFAULT_USER_AGENT.to_string())
    }
}
