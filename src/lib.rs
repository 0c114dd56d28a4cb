//! Paystack Router - Multi-Tenant Payment Webhook Ingestion & Forwarding
//!
//! This crate provides a production-ready HTTP service that receives Paystack
//! payment webhooks on behalf of several tenant applications, verifies and
//! records them, applies subscription state, and relays selected deliveries
//! to a peer application.
//!
//! # Features
//!
//! - **Signature Gate**: HMAC-SHA512 verification of raw delivery bytes
//! - **Event Classification**: Typed handling of charge, subscription, and invoice events
//! - **Idempotent Recording**: Redelivery-safe transaction upserts per tenant
//! - **Subscription Mutation**: Absolute-set plan updates that converge under retries
//! - **Forwarding**: Verbatim byte relay with bounded retries and per-attempt timeouts
//!
//! # Architecture
//!
//! ```text
//! Paystack ──▶ POST /webhooks/paystack ──▶ Signature Gate ──▶ Classifier
//!                                               │                 │
//!                                               ▼                 ▼
//!                                         400 (reject)     ┌─────────────┐
//!                                                          │  Recorder   │
//!                                                          │  Mutator    │
//!                                                          │  Forwarder  │
//!                                                          └──────┬──────┘
//!                                                                 │
//!                                                                 ▼
//!                                                          200 acknowledged
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use paystack_router::handlers::AppState;
//! use paystack_router::paystack::{
//!     webhook_router, Dispatcher, InMemoryAccountStore, InMemoryForwardLog,
//!     InMemoryTransactionStore, RouterConfig, WebhookState,
//! };
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Requires PAYSTACK_SECRET_KEY and FORWARD_URL in the environment
//!     let config = RouterConfig::from_env()?;
//!     let dispatcher = Arc::new(Dispatcher::new(
//!         config,
//!         Arc::new(InMemoryTransactionStore::new()),
//!         Arc::new(InMemoryAccountStore::new()),
//!         Arc::new(InMemoryForwardLog::new()),
//!     ));
//!     let app = webhook_router(WebhookState::new(dispatcher, Arc::new(AppState::new())));
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod paystack;

// Re-exports for convenience
pub use error::{Error, Result};
pub use paystack::{
    Dispatcher, EventKind, ParsedEvent, RouterConfig, SignatureVerifier, TenantTag, WebhookState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
