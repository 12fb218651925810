//! Store configuration.
//!
//! The dashboard talks to one remote database; its base URL (and an
//! optional auth token) arrive either from the embedder or from the
//! environment. URLs are normalised the same way regardless of source so
//! the REST layer can build node paths without re-checking.

use std::env;
use std::time::Duration;

use crate::error::BoardError;

/// Environment variable holding the store's base URL.
pub const DATABASE_URL_ENV: &str = "ORDERBOARD_DATABASE_URL";
/// Optional environment variable holding the store auth token.
pub const AUTH_TOKEN_ENV: &str = "ORDERBOARD_AUTH_TOKEN";

/// Default timeout for store requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used specifically for the lightweight connectivity probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalise the store base URL:
/// - strip surrounding whitespace and trailing slashes
/// - strip a trailing `.json` segment (a common paste-from-browser slip)
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_database_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip a trailing /.json or .json
    if url.ends_with(".json") {
        url.truncate(url.len() - 5);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

/// Connection settings for the remote order store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Normalised base URL of the database, no trailing slash.
    pub database_url: String,
    /// Optional auth token appended to every request.
    pub auth_token: Option<String>,
    /// Timeout for regular store requests.
    pub timeout: Duration,
    /// Timeout for the connectivity probe.
    pub probe_timeout: Duration,
}

impl StoreConfig {
    pub fn new(database_url: &str) -> Result<Self, BoardError> {
        let database_url = normalize_database_url(database_url);
        if database_url.is_empty() {
            return Err(BoardError::StoreUnavailable(
                "store not configured: empty database URL".into(),
            ));
        }
        Ok(StoreConfig {
            database_url,
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
        })
    }

    pub fn with_auth_token(mut self, token: &str) -> Self {
        let token = token.trim();
        self.auth_token = if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the configuration from the environment. A missing database
    /// URL is a configuration failure, reported as the same "unavailable"
    /// condition the UI shows for an unreachable store.
    pub fn from_env() -> Result<Self, BoardError> {
        let url = env::var(DATABASE_URL_ENV).map_err(|_| {
            BoardError::StoreUnavailable(format!(
                "store not configured: missing {DATABASE_URL_ENV}"
            ))
        })?;
        let mut config = StoreConfig::new(&url)?;
        if let Ok(token) = env::var(AUTH_TOKEN_ENV) {
            config = config.with_auth_token(&token);
        }
        Ok(config)
    }
}
