use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::RenewVizError;

/// Largest page the EIA API will return for a single request.
pub const MAX_PAGE_SIZE: usize = 5000;

const DEFAULT_BASE_URL: &str = "https://api.eia.gov/v2";
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Application configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential forwarded as the `api_key` query parameter.
    pub api_key: String,
    /// Root of the EIA v2 API, without a trailing slash.
    pub base_url: String,
    /// Timeout for a single page request.
    pub timeout: Duration,
    /// Attempts per request, including the first one.
    pub max_retries: u32,
    /// Records requested per page, at most [`MAX_PAGE_SIZE`].
    pub page_size: usize,
    /// Address to bind the HTTP server to.
    pub bind_address: String,
}

impl Config {
    /// Creates a config with defaults around the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            page_size: MAX_PAGE_SIZE,
            bind_address: DEFAULT_BIND_ADDRESS.into(),
        }
    }

    /// Creates Config from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns `RenewVizError::Config` when `EIA_API_KEY` is missing or empty.
    pub fn from_env() -> Result<Self, RenewVizError> {
        let api_key = env::var("EIA_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RenewVizError::Config(
                "EIA_API_KEY environment variable is required \
                 (get one at https://www.eia.gov/opendata/)"
                    .into(),
            ));
        }

        let mut config = Self::new(api_key.trim());
        if let Ok(base_url) = env::var("EIA_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        config.timeout = Duration::from_secs(parse_var("EIA_TIMEOUT", 30u64));
        config.max_retries = parse_var("EIA_MAX_RETRIES", 3u32).max(1);
        config.page_size = parse_var("EIA_PAGE_SIZE", MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        config.bind_address =
            env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.into());
        Ok(config)
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {}={:?}, using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
