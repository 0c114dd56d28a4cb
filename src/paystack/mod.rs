// Allow missing docs in this module - webhook internals are documented selectively
#![allow(missing_docs)]

//! Paystack Webhook Routing Module
//!
//! This module provides secure webhook handling for Paystack payment events
//! across multiple tenant applications behind one endpoint. It implements:
//!
//! - **Signature Verification**: HMAC-SHA512 validation of the `x-paystack-signature` header
//! - **Event Classification**: Typed dispatch for charge, subscription, and invoice events
//! - **Idempotent Recording**: Last-write-wins transaction upsert keyed by (tenant, reference)
//! - **State Mutation**: Absolute-set subscription updates that converge under redelivery
//! - **Forwarding**: Verbatim byte relay to a peer application with bounded retries
//!
//! # Architecture
//!
//! ```text
//! POST /webhooks/paystack -> Verify -> Classify -> Record -> Mutate -> Forward? -> Ack (200)
//!              |                |
//!              v                v
//!         400 (reject)    200 (unprocessable, dropped)
//! ```
//!
//! # Security
//!
//! - Webhook signing secret loaded from environment, never logged
//! - Constant-time signature comparison to prevent timing attacks
//! - Raw body verification before any parsing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use paystack_router::handlers::AppState;
//! use paystack_router::paystack::{
//!     webhook_router, Dispatcher, InMemoryAccountStore, InMemoryForwardLog,
//!     InMemoryTransactionStore, RouterConfig, WebhookState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RouterConfig::from_env()?;
//!     let dispatcher = Dispatcher::new(
//!         config,
//!         Arc::new(InMemoryTransactionStore::new()),
//!         Arc::new(InMemoryAccountStore::new()),
//!         Arc::new(InMemoryForwardLog::new()),
//!     );
//!     let state = WebhookState::new(Arc::new(dispatcher), Arc::new(AppState::new()));
//!
//!     let app = webhook_router(state);
//!     // ... serve with axum
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod forwarder;
pub mod handler;
pub mod mutator;
pub mod recorder;
pub mod signature;

// Re-export commonly used items
pub use config::RouterConfig;
pub use dispatcher::{DispatchOutcome, DispatchState, Dispatcher};
pub use error::{SoftFailure, SoftStage, WebhookError, WebhookResult};
pub use events::{classify, EventKind, ParsedEvent, PaystackEvent, TenantTag};
pub use forwarder::{
    ForwardAttemptLog, ForwardLogStore, ForwardResult, Forwarder, InMemoryForwardLog,
};
pub use handler::{
    webhook_handler, webhook_health, webhook_router, WebhookState, SIGNATURE_HEADER,
    WEBHOOK_HEALTH_PATH, WEBHOOK_PATH,
};
pub use mutator::{
    Account, AccountStore, AccountUpdate, InMemoryAccountStore, StateMutator, SubscriptionState,
    SubscriptionStatus,
};
pub use recorder::{InMemoryTransactionStore, TransactionRecord, TransactionStore};
pub use signature::SignatureVerifier;
