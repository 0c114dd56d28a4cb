//! Error types for the Paystack webhook router
//!
//! This module provides the crate-level error hierarchy using `thiserror`.
//! Pipeline-stage errors live in [`crate::paystack::error`]; this type wraps
//! them together with startup configuration failures so callers can work
//! against a single error surface.

use thiserror::Error;

pub use crate::paystack::error::WebhookError;

/// The main error type for router operations
#[derive(Error, Debug)]
pub enum Error {
    /// Startup configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Webhook pipeline errors
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),
}

/// Errors raised while loading configuration at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The Paystack secret is not configured
    #[error("PAYSTACK_SECRET_KEY environment variable is not set")]
    MissingSecret,

    /// The configured secret cannot be used
    #[error("Invalid webhook secret: {0}")]
    InvalidSecret(String),

    /// The downstream forward target is not configured
    #[error("FORWARD_URL environment variable is not set")]
    MissingForwardUrl,

    /// The downstream forward target does not parse as a URL
    #[error("Invalid forward URL {url:?}: {source}")]
    InvalidForwardUrl {
        /// The rejected value
        url: String,
        /// Parser failure
        #[source]
        source: url::ParseError,
    },
}

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingSecret;
        assert!(err.to_string().contains("PAYSTACK_SECRET_KEY"));

        let err = ConfigError::InvalidSecret("secret is empty".to_string());
        assert!(err.to_string().contains("secret is empty"));
    }

    #[test]
    fn test_invalid_forward_url_carries_source() {
        let source = url::Url::parse("not a url").unwrap_err();
        let err = ConfigError::InvalidForwardUrl {
            url: "not a url".to_string(),
            source,
        };
        assert!(err.to_string().contains("not a url"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_converts_into_crate_error() {
        let err: Error = ConfigError::MissingForwardUrl.into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_webhook_error_converts_into_crate_error() {
        let err: Error = WebhookError::SignatureMismatch.into();
        assert!(matches!(err, Error::Webhook(_)));
        assert!(err.to_string().contains("Webhook error"));
    }
}
