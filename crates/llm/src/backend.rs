//! Shared plumbing for HTTP providers
//!
//! Both providers speak JSON over HTTP, share the same timeout handling and
//! retry transient failures with exponential backoff.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use roleplay_config::ProviderSettings;

use crate::LlmError;

/// Connection settings of one HTTP provider
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Registry name reported as `provider_name()`
    pub name: String,
    /// Base URL, without trailing slash
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl HttpProviderConfig {
    /// Build from settings. The API key is read from the configured
    /// environment variable; a missing variable leaves the key unset.
    pub fn from_settings(name: impl Into<String>, settings: &ProviderSettings) -> Self {
        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());

        Self {
            name: name.into(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            timeout: Duration::from_secs(settings.timeout_secs),
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            },
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// HTTP client honouring the request timeout
    pub(crate) fn build_client(&self) -> Result<Client, LlmError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))
    }
}

/// Retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled afterwards
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn run<T, F, Fut>(&self, provider: &str, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut last_error = None;
        let mut backoff = self.initial_backoff;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    provider,
                    ?backoff,
                    attempt,
                    max_retries = self.max_retries,
                    "LLM request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }
}

/// Map a non-success HTTP status to an error. 5xx is retryable, 4xx is not.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Err(LlmError::Network(format!("Server error {}: {}", status, body)))
    } else {
        Err(LlmError::Api(format!("HTTP {}: {}", status, body)))
    }
}

/// Milliseconds since `start`, as reported in responses
pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
