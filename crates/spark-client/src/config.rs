use std::time::Duration;

use crate::errors::ClientError;

pub const DEFAULT_PORT: u16 = 4173;

/// Connection settings for the local PrivateSpark service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the service, for example `http://localhost:4173`.
    pub base_url: String,
    /// Timeout for plain JSON calls. Chat streams are not bounded by it.
    pub timeout: Duration,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: format!("http://localhost:{DEFAULT_PORT}"),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Creates a config pointing at `base_url` with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().base_url(base_url)
    }

    /// Builds a config from the environment.
    ///
    /// - `PRIVATESPARK_URL`: full base URL.
    /// - `PRIVATESPARK_PORT`: port on localhost, used when no URL is set.
    /// - `PRIVATESPARK_TIMEOUT_SECS`: timeout for JSON calls.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("PRIVATESPARK_URL") {
            config.base_url = url.trim().to_string();
        } else if let Some(port) = non_empty("PRIVATESPARK_PORT") {
            let port: u16 = port.trim().parse().map_err(|e| {
                ClientError::Config(format!("invalid PRIVATESPARK_PORT {port:?}: {e}"))
            })?;
            config.base_url = format!("http://localhost:{port}");
        }
        if let Some(secs) = non_empty("PRIVATESPARK_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                ClientError::Config(format!("invalid PRIVATESPARK_TIMEOUT_SECS {secs:?}: {e}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the JSON call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https://, got {url:?}"
            )));
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
