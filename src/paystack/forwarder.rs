//! Cross-tenant webhook forwarding.
//!
//! Deliveries owned by the forward tenant are relayed byte-for-byte to the
//! downstream app. The downstream verifies the original Paystack signature
//! itself, so the body must arrive exactly as received; nothing here
//! re-serializes it.
//!
//! Retries are bounded and run inside the dispatch: attempt n waits
//! `base * 2^(n-1)` before attempt n+1, each attempt is cancelled at the
//! configured timeout, and exactly one outcome row is written per series.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::timeout;
use uuid::Uuid;

use super::config::RouterConfig;
use super::error::WebhookResult;

/// Header naming this router on forwarded requests.
pub const ROUTER_SOURCE_HEADER: &str = "x-router-source";

/// Terminal outcome of one forward series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardResult {
    /// True when some attempt received a 2xx
    pub ok: bool,
    /// Last HTTP status observed, if any response arrived
    pub status: Option<u16>,
    /// Attempts consumed
    pub attempts: u32,
    /// Last transport, timeout, or status error when `ok` is false
    pub error: Option<String>,
}

/// One log row per forward series, written after the series completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardAttemptLog {
    /// Row id
    pub id: Uuid,
    /// Transaction reference the forwarded delivery belongs to
    pub reference: String,
    /// Downstream endpoint
    pub target_url: String,
    /// Whether the series ended in a 2xx
    pub ok: bool,
    /// Last HTTP status observed
    pub status: Option<u16>,
    /// Attempts consumed
    pub attempts: u32,
    /// Last error when the series failed
    pub error: Option<String>,
    /// Wall-clock time the series took, including backoff
    pub elapsed_ms: u64,
    /// When the series completed
    pub completed_at: DateTime<Utc>,
}

impl ForwardAttemptLog {
    /// Build the single log row for a completed series.
    pub fn from_result(
        reference: &str,
        target_url: &str,
        result: &ForwardResult,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference: reference.to_string(),
            target_url: target_url.to_string(),
            ok: result.ok,
            status: result.status,
            attempts: result.attempts,
            error: result.error.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
            completed_at: Utc::now(),
        }
    }
}

/// Storage seam for forward outcome rows.
#[async_trait]
pub trait ForwardLogStore: Send + Sync {
    /// Append one row for a completed forward series.
    async fn append_forward_log(&self, entry: ForwardAttemptLog) -> WebhookResult<()>;
}

/// In-memory reference implementation.
#[derive(Debug, Default)]
pub struct InMemoryForwardLog {
    entries: RwLock<Vec<ForwardAttemptLog>>,
}

impl InMemoryForwardLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows, oldest first.
    pub async fn entries(&self) -> Vec<ForwardAttemptLog> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ForwardLogStore for InMemoryForwardLog {
    async fn append_forward_log(&self, entry: ForwardAttemptLog) -> WebhookResult<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

/// Relays raw webhook bodies downstream with bounded retries.
pub struct Forwarder {
    client: reqwest::Client,
    config: RouterConfig,
}

impl Forwarder {
    /// Build a forwarder with its own connection pool.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Relay `raw_body` to `target_url`, retrying on failure.
    ///
    /// Never returns an error: every outcome, including exhaustion, is a
    /// [`ForwardResult`]. The per-attempt budget is enforced by dropping
    /// the in-flight request future, so a hung downstream cannot pin a
    /// dispatch past the timeout.
    pub async fn forward(&self, target_url: &str, raw_body: &[u8], reference: &str) -> ForwardResult {
        let mut last_status = None;
        let mut last_error = None;

        for attempt in 0..self.config.forward_max_attempts {
            if attempt > 0 {
                let delay = self.config.backoff_delay(attempt - 1);
                tracing::info!(
                    reference = %reference,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying forward after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match timeout(self.config.forward_timeout, self.send_once(target_url, raw_body)).await {
                Ok(Ok(status)) if status.is_success() => {
                    tracing::info!(
                        reference = %reference,
                        status = status.as_u16(),
                        attempts = attempt + 1,
                        "forward succeeded"
                    );
                    return ForwardResult {
                        ok: true,
                        status: Some(status.as_u16()),
                        attempts: attempt + 1,
                        error: None,
                    };
                }
                Ok(Ok(status)) => {
                    tracing::warn!(
                        reference = %reference,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        "downstream answered non-2xx"
                    );
                    last_status = Some(status.as_u16());
                    last_error = Some(format!("downstream answered {}", status.as_u16()));
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        reference = %reference,
                        attempt = attempt + 1,
                        error = %e,
                        "forward attempt failed"
                    );
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    tracing::warn!(
                        reference = %reference,
                        attempt = attempt + 1,
                        timeout_ms = self.config.forward_timeout.as_millis() as u64,
                        "forward attempt timed out"
                    );
                    last_error = Some(format!(
                        "attempt timed out after {}ms",
                        self.config.forward_timeout.as_millis()
                    ));
                }
            }
        }

        ForwardResult {
            ok: false,
            status: last_status,
            attempts: self.config.forward_max_attempts,
            error: last_error,
        }
    }

    async fn send_once(
        &self,
        target_url: &str,
        raw_body: &[u8],
    ) -> reqwest::Result<reqwest::StatusCode> {
        let response = self
            .client
            .post(target_url)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(ROUTER_SOURCE_HEADER, crate::NAME)
            .body(raw_body.to_vec())
            .send()
            .await?;
        Ok(response.status())
    }
}
