//! Error types for Paystack webhook processing.
//!
//! The delivery-path taxonomy is deliberately small. Only a signature
//! failure may surface as an HTTP error; classification failures and store
//! failures are logged and the delivery is still acknowledged, so this enum
//! exists mainly to give every failure a stable code for logs, metrics, and
//! test assertions.

use serde::Serialize;
use thiserror::Error;

/// Result alias for webhook pipeline operations.
pub type WebhookResult<T> = std::result::Result<T, WebhookError>;

/// Errors raised while handling a single webhook delivery.
#[derive(Error, Debug)]
pub enum WebhookError {
    // ===== Rejected deliveries (the only 400 path) =====
    /// No `x-paystack-signature` header on the request
    #[error("missing x-paystack-signature header")]
    MissingSignature,

    /// Signature did not match the raw body
    #[error("signature verification failed")]
    SignatureMismatch,

    // ===== Unprocessable payloads (acknowledged, then dropped) =====
    /// Body was not valid JSON
    #[error("malformed JSON payload: {0}")]
    MalformedPayload(String),

    /// Envelope parsed but `data` is missing or not an object
    #[error("payload has no data object")]
    MissingData,

    /// No idempotency reference could be derived from the payload
    #[error("payload has no transaction reference")]
    MissingReference,

    // ===== Soft failures (logged, pipeline proceeds) =====
    /// A transaction store operation failed
    #[error("transaction store error: {0}")]
    TransactionStore(String),

    /// An account store operation failed
    #[error("account store error: {0}")]
    AccountStore(String),

    /// Appending the forward outcome log failed
    #[error("forward log error: {0}")]
    ForwardLog(String),
}

impl WebhookError {
    /// Stable code attached to log events and metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingSignature => "missing_signature",
            Self::SignatureMismatch => "signature_mismatch",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::MissingData => "missing_data",
            Self::MissingReference => "missing_reference",
            Self::TransactionStore(_) => "transaction_store",
            Self::AccountStore(_) => "account_store",
            Self::ForwardLog(_) => "forward_log",
        }
    }
}

/// Pipeline stage that produced a soft failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftStage {
    /// Transaction upsert in the recorder
    Recording,
    /// Account lookup or update in the state mutator
    StateMutation,
    /// Forward outcome log append
    ForwardLogging,
}

impl SoftStage {
    /// Stable tag used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::StateMutation => "state_mutation",
            Self::ForwardLogging => "forward_logging",
        }
    }
}

/// One soft failure observed during a dispatch.
///
/// Carried on the dispatch outcome so tests and callers can assert which
/// stages failed without parsing log output.
#[derive(Debug, Clone, Serialize)]
pub struct SoftFailure {
    /// Stage that failed
    pub stage: SoftStage,
    /// Stable code from the underlying error
    pub code: &'static str,
    /// Human-readable detail
    pub message: String,
}
