//! Rate-limited Alpha Vantage statement client.

use async_trait::async_trait;
use finetl_core::{
    EtlError, RawPayload, Result, StatementKind, StatementSource, StopSignal, Symbol,
};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::quota::{QuotaTracker, pause};
use crate::retry::RetryPolicy;

/// Production endpoint of the Alpha Vantage query API.
pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Body keys the API uses for notices on an otherwise successful response.
const NOTICE_KEYS: &[&str] = &["Note", "Information"];

/// Wording that marks a notice as a rate limit rather than, say, a premium
/// endpoint or demo key message.
const RATE_WORDS: &[&str] = &[
    "rate limit",
    "frequency",
    "per minute",
    "per day",
    "requests per",
    "calls per",
];

/// Why one HTTP attempt failed.
#[derive(Debug)]
enum AttemptError {
    /// Worth retrying. `throttled` means the server reported rate exhaustion.
    Transient { reason: String, throttled: bool },
    /// The server answered definitively; retrying cannot help.
    Remote(String),
}

/// Alpha Vantage client for statement endpoints.
///
/// Every HTTP request takes one slot from the shared [`QuotaTracker`] before
/// it is sent, retries included. Transient failures are retried per the
/// [`RetryPolicy`].
#[derive(Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    quota: Arc<QuotaTracker>,
    retry: RetryPolicy,
}

impl fmt::Debug for AlphaVantageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlphaVantageClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl AlphaVantageClient {
    /// Create a client drawing from `quota`.
    #[must_use]
    pub fn new(api_key: impl Into<String>, quota: Arc<QuotaTracker>) -> Self {
        Self::with_client(Client::new(), api_key, quota)
    }

    /// Create a client with a custom HTTP client (timeouts, proxies).
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>, quota: Arc<QuotaTracker>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            quota,
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at another endpoint.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The endpoint requests go to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The quota tracker this client draws from.
    #[must_use]
    pub const fn quota(&self) -> &Arc<QuotaTracker> {
        &self.quota
    }

    async fn attempt(
        &self,
        symbol: &Symbol,
        kind: StatementKind,
    ) -> std::result::Result<RawPayload, AttemptError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", kind.api_function()),
                ("symbol", symbol.as_str()),
                ("apikey", self.api_key.as_str()),
                ("datatype", "json"),
            ])
            .send()
            .await
            .map_err(|e| AttemptError::Transient {
                // The URL carries the API key.
                reason: e.without_url().to_string(),
                throttled: false,
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Transient {
                reason: format!("HTTP {status}"),
                throttled: true,
            });
        }
        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            return Err(AttemptError::Transient {
                reason: format!("HTTP {status}"),
                throttled: false,
            });
        }
        if !status.is_success() {
            return Err(AttemptError::Remote(format!("HTTP {status}")));
        }

        let text = response.text().await.map_err(|e| AttemptError::Transient {
            reason: e.without_url().to_string(),
            throttled: false,
        })?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| AttemptError::Remote(format!("Invalid JSON body: {e}")))?;

        let Some(object) = body.as_object() else {
            return Err(AttemptError::Remote(
                "Response body is not a JSON object".to_string(),
            ));
        };

        if let Some(message) = object.get("Error Message") {
            return Err(AttemptError::Remote(message_text(message)));
        }

        if let Some(notice) = NOTICE_KEYS.iter().find_map(|key| object.get(*key)) {
            let notice = message_text(notice);
            if !is_rate_notice(&notice) {
                return Err(AttemptError::Remote(notice));
            }
            if is_daily_limit(&notice) {
                if let Err(e) = self.quota.mark_day_exhausted(self.quota.now()).await {
                    warn!(error = %e, "Failed to record daily quota exhaustion");
                }
            }
            return Err(AttemptError::Transient {
                reason: notice,
                throttled: true,
            });
        }

        Ok(body)
    }
}

fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_rate_notice(notice: &str) -> bool {
    let notice = notice.to_ascii_lowercase();
    RATE_WORDS.iter().any(|word| notice.contains(word))
}

fn is_daily_limit(notice: &str) -> bool {
    let notice = notice.to_ascii_lowercase();
    notice.contains("per day") || notice.contains("daily")
}

#[async_trait]
impl StatementSource for AlphaVantageClient {
    fn name(&self) -> &str {
        "Alpha Vantage"
    }

    async fn fetch(&self, symbol: &Symbol, kind: StatementKind) -> Result<RawPayload> {
        self.fetch_until(symbol, kind, &StopSignal::never()).await
    }

    #[instrument(skip(self, stop), fields(symbol = %symbol, kind = %kind))]
    async fn fetch_until(
        &self,
        symbol: &Symbol,
        kind: StatementKind,
        stop: &StopSignal,
    ) -> Result<RawPayload> {
        let max_attempts = self.retry.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let permit = self.quota.acquire_until(stop).await?;
            debug!(attempt, day_count = permit.day_count, "Requesting statement");

            match self.attempt(symbol, kind).await {
                Ok(payload) => return Ok(payload),
                Err(AttemptError::Remote(message)) => {
                    return Err(EtlError::RemoteData {
                        symbol: symbol.to_string(),
                        kind,
                        message,
                    });
                }
                Err(AttemptError::Transient { reason, throttled }) => {
                    if throttled {
                        self.quota.mark_exhausted(self.quota.now()).await?;
                    }
                    if attempt >= max_attempts {
                        return Err(EtlError::TransientFetch {
                            symbol: symbol.to_string(),
                            kind,
                            attempts: attempt,
                            reason,
                        });
                    }
                    let delay = self.retry.backoff(attempt - 1);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Transient fetch failure, backing off"
                    );
                    pause(delay, stop).await?;
                }
            }
        }
    }
}
