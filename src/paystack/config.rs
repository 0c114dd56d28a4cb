//! Configuration for the webhook router.
//!
//! Everything is sourced from the environment at startup. The Paystack
//! secret and the downstream forward URL are required; the rest has
//! production defaults that match Paystack's delivery behavior.

use std::env;
use std::time::Duration;

use url::Url;

use super::events::TenantTag;
use crate::error::ConfigError;

/// Tenant tag deliveries resolve to when `metadata.app` is absent.
pub const DEFAULT_PRIMARY_TENANT: &str = "main";

/// Tenant tag whose deliveries are forwarded downstream.
pub const DEFAULT_FORWARD_TENANT: &str = "elevenone";

const DEFAULT_FORWARD_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 6;
const DEFAULT_FORWARD_BACKOFF_BASE_MS: u64 = 300;

/// Ceiling on any single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Runtime configuration for webhook processing and forwarding.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Paystack secret key used for signature verification (kept private)
    paystack_secret: String,
    /// Tenant assumed when a delivery carries no `metadata.app`
    pub primary_tenant: TenantTag,
    /// Tenant whose deliveries are relayed to `forward_url`
    pub forward_tenant: TenantTag,
    /// Downstream endpoint receiving forwarded deliveries
    pub forward_url: Url,
    /// Attempts per forward series
    pub forward_max_attempts: u32,
    /// Budget for a single forward attempt
    pub forward_timeout: Duration,
    /// Base delay for the exponential backoff between attempts
    pub forward_backoff_base: Duration,
    /// Log raw payloads at debug level (off by default, bodies carry PII)
    pub log_payloads: bool,
}

impl RouterConfig {
    /// Load configuration from environment variables.
    ///
    /// `PAYSTACK_SECRET_KEY` and `FORWARD_URL` are required. Optional:
    /// `PRIMARY_TENANT`, `FORWARD_TENANT`, `FORWARD_MAX_ATTEMPTS`,
    /// `FORWARD_TIMEOUT_SECS`, `FORWARD_BACKOFF_BASE_MS`,
    /// `WEBHOOK_LOG_PAYLOADS`.
    pub fn from_env() -> crate::error::Result<Self> {
        let paystack_secret =
            env::var("PAYSTACK_SECRET_KEY").map_err(|_| ConfigError::MissingSecret)?;
        Self::validate_secret(&paystack_secret)?;

        let forward_url = env::var("FORWARD_URL").map_err(|_| ConfigError::MissingForwardUrl)?;
        let forward_url = Url::parse(&forward_url).map_err(|source| ConfigError::InvalidForwardUrl {
            url: forward_url.clone(),
            source,
        })?;

        Ok(Self {
            paystack_secret,
            primary_tenant: TenantTag::new(
                env::var("PRIMARY_TENANT").unwrap_or_else(|_| DEFAULT_PRIMARY_TENANT.to_string()),
            ),
            forward_tenant: TenantTag::new(
                env::var("FORWARD_TENANT").unwrap_or_else(|_| DEFAULT_FORWARD_TENANT.to_string()),
            ),
            forward_url,
            forward_max_attempts: env::var("FORWARD_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FORWARD_MAX_ATTEMPTS),
            forward_timeout: env::var("FORWARD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_FORWARD_TIMEOUT_SECS)),
            forward_backoff_base: env::var("FORWARD_BACKOFF_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(DEFAULT_FORWARD_BACKOFF_BASE_MS)),
            log_payloads: env::var("WEBHOOK_LOG_PAYLOADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        })
    }

    /// Build a config programmatically with the production defaults.
    ///
    /// Used by tests and embedders; fields other than the secret are public
    /// and can be adjusted after construction.
    pub fn with_secret(paystack_secret: impl Into<String>, forward_url: Url) -> Self {
        Self {
            paystack_secret: paystack_secret.into(),
            primary_tenant: TenantTag::new(DEFAULT_PRIMARY_TENANT),
            forward_tenant: TenantTag::new(DEFAULT_FORWARD_TENANT),
            forward_url,
            forward_max_attempts: DEFAULT_FORWARD_MAX_ATTEMPTS,
            forward_timeout: Duration::from_secs(DEFAULT_FORWARD_TIMEOUT_SECS),
            forward_backoff_base: Duration::from_millis(DEFAULT_FORWARD_BACKOFF_BASE_MS),
            log_payloads: false,
        }
    }

    /// Validate the secret key format.
    fn validate_secret(secret: &str) -> Result<(), ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::InvalidSecret("secret is empty".to_string()));
        }
        if !secret.starts_with("sk_") {
            tracing::warn!(
                "PAYSTACK_SECRET_KEY does not start with 'sk_', this may not be a valid Paystack secret key"
            );
        }
        Ok(())
    }

    /// The Paystack secret key.
    pub fn paystack_secret(&self) -> &str {
        &self.paystack_secret
    }

    /// Backoff delay after `attempt + 1` attempts have failed:
    /// `base * 2^attempt`, capped at 30 seconds.
    ///
    /// With the default 300 ms base the sequence is 300, 600, 1200 ms.
    /// No jitter: downstream receivers rely on the exact sequence.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.forward_backoff_base.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms).min(MAX_BACKOFF)
    }

    /// Config for unit tests.
    #[cfg(test)]
    pub fn test_config() -> Self {
        let mut config = Self::with_secret(
            "sk_test_webhook_secret",
            Url::parse("http://127.0.0.1:9/forward").expect("static test url"),
        );
        config.forward_max_attempts = 2;
        config.forward_timeout = Duration::from_millis(250);
        config.forward_backoff_base = Duration::from_millis(1);
        config
    }
}
