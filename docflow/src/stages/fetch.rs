//! Fetch stage: source descriptor in, raw page out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::Stage;
use crate::cancellation::CancellationObserver;
use crate::core::{RawPage, Source};
use crate::errors::ItemError;

/// Configuration for HTTP fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_size")]
    pub max_response_size: usize,
    /// Additional headers to include.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    concat!("docflow/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            max_response_size: default_max_size(),
            headers: HashMap::new(),
        }
    }
}

impl FetchConfig {
    /// Creates a new fetch configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// What a [`PageClient`] returns for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Final URL after redirects.
    pub final_url: String,
    /// Response body as text.
    pub body: String,
}

impl PageResponse {
    /// Whether the fetch was successful (2xx status).
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Retrieves the content behind a source identifier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageClient: Send + Sync {
    /// Fetches one URL.
    async fn get(&self, url: &str) -> Result<PageResponse, ItemError>;
}

/// reqwest-backed [`PageClient`].
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_response_size: usize,
}

#[cfg(feature = "http")]
impl HttpClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a header is invalid or the TLS backend fails to initialise.
    pub fn new(config: &FetchConfig) -> Result<Self, crate::errors::DocflowError> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

        let setup = |e: &dyn std::fmt::Display| crate::errors::DocflowError::HttpClient(e.to_string());

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| setup(&e))?;
            let value = HeaderValue::from_str(value).map_err(|e| setup(&e))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .default_headers(headers)
            .build()
            .map_err(|e| setup(&e))?;

        Ok(Self {
            client,
            max_response_size: config.max_response_size,
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl PageClient for HttpClient {
    async fn get(&self, url: &str) -> Result<PageResponse, ItemError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ItemError::Transport(e.to_string()))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        if let Some(length) = response.content_length() {
            if usize::try_from(length).map_or(true, |len| len > self.max_response_size) {
                return Err(ItemError::Transport(format!(
                    "response of {length} bytes exceeds limit of {}",
                    self.max_response_size
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| ItemError::Transport(e.to_string()))?;

        Ok(PageResponse {
            status_code,
            final_url,
            body,
        })
    }
}

/// Fetches the raw page for each source.
///
/// The request races the cancellation token, so a closed token abandons
/// in-flight network I/O instead of waiting for the client timeout.
pub struct FetchStage<C> {
    client: Arc<C>,
}

impl<C: PageClient> FetchStage<C> {
    /// Creates a fetch stage around a client.
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Creates a fetch stage around a shared client.
    pub fn from_arc(client: Arc<C>) -> Self {
        Self { client }
    }
}

impl<C> std::fmt::Debug for FetchStage<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl<C: PageClient + 'static> Stage for FetchStage<C> {
    type Input = Source;
    type Output = RawPage;

    fn name(&self) -> &str {
        "fetch"
    }

    async fn process(
        &self,
        source: Source,
        cancel: &CancellationObserver,
    ) -> Result<RawPage, ItemError> {
        debug!(source = %source, "Fetching");

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(ItemError::other("fetch abandoned: pipeline cancelled"));
            }
            response = self.client.get(&source.id) => response?,
        };

        if !response.is_success() {
            return Err(ItemError::Status {
                status: response.status_code,
                url: response.final_url,
            });
        }

        Ok(RawPage::new(
            &source,
            response.final_url,
            response.status_code,
            response.body,
        ))
    }
}
