use std::time::Duration;

use futures_util::StreamExt;
use relay_core::FetchRequest;
use relay_logging::{relay_debug, relay_info, relay_warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput};

// Roughly 30 years; stands in for budgets too large to add to an Instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before retry `i` (0-based) is `backoff_base * 2^i`.
    pub backoff_base: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, FetchError>;
}

/// GET with bounded retries under one execution budget.
///
/// The budget is a single deadline covering every attempt and every backoff
/// sleep. A retry whose backoff would end past the deadline is not attempted.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self::with_client(settings, client))
    }

    /// Share an existing connection pool.
    pub fn with_client(settings: FetchSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError> {
        let url = request.target();
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.settings.user_agent.as_str())
            .header(ACCEPT, "*/*")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, content_len));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchOutput {
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url,
                content_type,
                byte_len: bytes.len() as u64,
                attempts: 0,
                elapsed: Duration::ZERO,
            },
            bytes,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, FetchError> {
        let url = request.target().as_str();
        let budget = request.execution_budget();
        let started = Instant::now();
        let deadline = started
            .checked_add(budget)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let max_attempts = self.settings.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            relay_debug!("Fetch attempt {}/{} url={}", attempt, max_attempts, url);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(url)),
                result = tokio::time::timeout_at(deadline, self.attempt(request)) => match result {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(budget_exhausted(url, budget, None)),
                },
            };

            let err = match outcome {
                Ok(mut output) => {
                    output.metadata.attempts = attempt;
                    output.metadata.elapsed = started.elapsed();
                    relay_info!(
                        "Fetched {} bytes from {} in {} attempt(s)",
                        output.metadata.byte_len,
                        url,
                        attempt
                    );
                    return Ok(output);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                relay_warn!("Fetch of {} failed without retry: {}", url, err);
                return Err(err);
            }
            if attempt >= max_attempts {
                relay_warn!("Fetch of {} failed after {} attempts: {}", url, attempt, err);
                return Err(FetchError::new(
                    err.kind,
                    format!("{} (after {attempt} attempts)", err.message),
                ));
            }

            let delay = backoff_delay(self.settings.backoff_base, attempt - 1);
            let resume_at = Instant::now().checked_add(delay);
            if resume_at.map_or(true, |at| at >= deadline) {
                relay_warn!(
                    "Fetch of {} abandoned: backoff of {}ms exceeds the remaining budget",
                    url,
                    delay.as_millis()
                );
                return Err(budget_exhausted(url, budget, Some(&err)));
            }

            relay_info!(
                "Fetch attempt {} of {} failed ({}); retrying in {}ms",
                attempt,
                url,
                err,
                delay.as_millis()
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(url)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// `base * 2^retry`, saturating instead of overflowing.
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(retry))
}

fn budget_exhausted(url: &str, budget: Duration, last: Option<&FetchError>) -> FetchError {
    let mut message = format!(
        "request to {url} timed out after {}ms",
        budget.as_millis()
    );
    if let Some(last) = last {
        message.push_str(&format!(" (last error: {last})"));
    }
    FetchError::new(FailureKind::Timeout, message)
}

fn cancelled(url: &str) -> FetchError {
    FetchError::new(FailureKind::Cancelled, format!("fetch of {url} was cancelled"))
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
