//! Delivery dispatch pipeline.
//!
//! One dispatcher drives every webhook delivery through a fixed sequence:
//!
//! ```text
//! Received ──> Verified ──> Classified ──> Recorded ──> StateApplied ──> (Forwarded) ──> Acknowledged
//!     │             │
//!     └> Rejected   └> AcceptedUnprocessable
//!        (400)         (200, dropped)
//! ```
//!
//! Only a signature failure produces an HTTP error. Everything after
//! verification fails soft: the failure is logged with a typed stage tag
//! and the delivery is still acknowledged, because Paystack keeps
//! redelivering unacknowledged webhooks and a flaky store must not amplify
//! into an endless redelivery storm.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use super::config::RouterConfig;
use super::error::{SoftFailure, SoftStage, WebhookError};
use super::events::{classify, ParsedEvent};
use super::forwarder::{ForwardAttemptLog, ForwardLogStore, ForwardResult, Forwarder};
use super::mutator::{AccountStore, StateMutator};
use super::recorder::TransactionStore;
use super::signature::SignatureVerifier;
use crate::metrics::global_metrics;

/// Stages of the delivery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Raw delivery received, nothing checked yet
    Received,
    /// Signature matched the raw body
    Verified,
    /// Payload classified into a typed event
    Classified,
    /// Transaction upsert ran (possibly failing soft)
    Recorded,
    /// State mutation ran (possibly failing soft or as a no-op)
    StateApplied,
    /// Forward series completed for a forward-tenant delivery
    Forwarded,
    /// Terminal: processor owed a 200
    Acknowledged,
    /// Terminal: signature failure, processor owed a 400
    Rejected,
    /// Terminal: unparseable payload, acknowledged and dropped
    AcceptedUnprocessable,
}

impl DispatchState {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Verified => "verified",
            Self::Classified => "classified",
            Self::Recorded => "recorded",
            Self::StateApplied => "state_applied",
            Self::Forwarded => "forwarded",
            Self::Acknowledged => "acknowledged",
            Self::Rejected => "rejected",
            Self::AcceptedUnprocessable => "accepted_unprocessable",
        }
    }

    /// Whether a dispatch may end in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Acknowledged | Self::Rejected | Self::AcceptedUnprocessable
        )
    }

    /// HTTP status owed to the processor for a delivery ending here.
    ///
    /// Every signature-valid path answers 200; only rejection answers 400.
    pub fn http_status(&self) -> http::StatusCode {
        match self {
            Self::Rejected => http::StatusCode::BAD_REQUEST,
            _ => http::StatusCode::OK,
        }
    }
}

/// Everything observable about one dispatched delivery.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Correlation id attached to every log event for this delivery
    pub delivery_id: Uuid,
    /// Terminal state
    pub state: DispatchState,
    /// Classified event, when classification succeeded
    pub event: Option<ParsedEvent>,
    /// Soft failures observed, in pipeline order
    pub soft_failures: Vec<SoftFailure>,
    /// Accounts touched by the state mutator
    pub accounts_updated: usize,
    /// Forward series outcome, when forwarding was triggered
    pub forward: Option<ForwardResult>,
}

/// Drives deliveries through verification, classification, recording,
/// state mutation, and forwarding.
///
/// All collaborators are injected at construction; the dispatcher owns no
/// global clients or stores.
pub struct Dispatcher {
    config: RouterConfig,
    verifier: SignatureVerifier,
    transactions: Arc<dyn TransactionStore>,
    mutator: StateMutator,
    forwarder: Forwarder,
    forward_log: Arc<dyn ForwardLogStore>,
}

impl Dispatcher {
    /// Wire up a dispatcher from its collaborators.
    pub fn new(
        config: RouterConfig,
        transactions: Arc<dyn TransactionStore>,
        accounts: Arc<dyn AccountStore>,
        forward_log: Arc<dyn ForwardLogStore>,
    ) -> Self {
        let verifier = SignatureVerifier::new(&config);
        let forwarder = Forwarder::new(config.clone());
        Self {
            config,
            verifier,
            transactions,
            mutator: StateMutator::new(accounts),
            forwarder,
            forward_log,
        }
    }

    /// Process one delivery end to end.
    ///
    /// `signature` is the `x-paystack-signature` header value, if present.
    /// The outcome is total: no input makes this function fail.
    pub async fn dispatch(&self, raw_body: &[u8], signature: Option<&str>) -> DispatchOutcome {
        let started = Instant::now();
        let delivery_id = Uuid::new_v4();
        let mut outcome = DispatchOutcome {
            delivery_id,
            state: DispatchState::Received,
            event: None,
            soft_failures: Vec::new(),
            accounts_updated: 0,
            forward: None,
        };

        if self.config.log_payloads {
            tracing::debug!(
                delivery_id = %delivery_id,
                payload = %String::from_utf8_lossy(raw_body),
                "received webhook payload"
            );
        }

        // Received -> Verified | Rejected
        let verified = signature
            .map(|signature| self.verifier.verify(raw_body, signature))
            .unwrap_or(false);
        if !verified {
            let err = match signature {
                None => WebhookError::MissingSignature,
                Some(_) => WebhookError::SignatureMismatch,
            };
            tracing::warn!(delivery_id = %delivery_id, code = err.error_code(), "rejected delivery");
            global_metrics().record_rejected();
            outcome.state = DispatchState::Rejected;
            return outcome;
        }
        outcome.state = DispatchState::Verified;

        // Verified -> Classified | AcceptedUnprocessable
        let event = match classify(raw_body, &self.config.primary_tenant) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    delivery_id = %delivery_id,
                    code = err.error_code(),
                    error = %err,
                    "unprocessable payload, acknowledging and dropping"
                );
                global_metrics().record_unprocessable();
                outcome.state = DispatchState::AcceptedUnprocessable;
                return outcome;
            }
        };
        outcome.state = DispatchState::Classified;
        tracing::info!(
            delivery_id = %delivery_id,
            kind = %event.kind,
            event = %event.event_name,
            tenant = %event.tenant,
            reference = %event.reference,
            "classified delivery"
        );

        // Classified -> Recorded (upsert failures are soft)
        if let Err(err) = self.transactions.upsert_transaction(&event).await {
            self.note_soft_failure(&mut outcome, SoftStage::Recording, &event.reference, err);
        }
        outcome.state = DispatchState::Recorded;

        // Recorded -> StateApplied ("other" kinds never reach the mutator)
        if event.kind.mutates_state() {
            match self.mutator.apply(&event).await {
                Ok(count) => outcome.accounts_updated = count,
                Err(err) => {
                    self.note_soft_failure(
                        &mut outcome,
                        SoftStage::StateMutation,
                        &event.reference,
                        err,
                    );
                }
            }
        }
        outcome.state = DispatchState::StateApplied;

        // StateApplied -> Forwarded, only for the forward tenant
        if event.tenant == self.config.forward_tenant {
            let target = self.config.forward_url.as_str();
            let series_started = Instant::now();
            let result = self
                .forwarder
                .forward(target, raw_body, &event.reference)
                .await;
            let series_elapsed = series_started.elapsed();
            global_metrics().record_forward(result.ok, result.attempts, series_elapsed);
            if !result.ok {
                tracing::warn!(
                    delivery_id = %delivery_id,
                    reference = %event.reference,
                    attempts = result.attempts,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "forward series exhausted"
                );
            }

            let entry =
                ForwardAttemptLog::from_result(&event.reference, target, &result, series_elapsed);
            if let Err(err) = self.forward_log.append_forward_log(entry).await {
                self.note_soft_failure(
                    &mut outcome,
                    SoftStage::ForwardLogging,
                    &event.reference,
                    err,
                );
            }
            outcome.forward = Some(result);
            outcome.state = DispatchState::Forwarded;
        }

        // -> Acknowledged
        outcome.state = DispatchState::Acknowledged;
        global_metrics().record_delivery(event.kind.as_str(), started.elapsed());
        tracing::info!(
            delivery_id = %delivery_id,
            reference = %event.reference,
            accounts_updated = outcome.accounts_updated,
            forwarded = outcome.forward.is_some(),
            soft_failures = outcome.soft_failures.len(),
            "delivery acknowledged"
        );
        outcome.event = Some(event);
        outcome
    }

    /// The single soft-failure path: log with a typed stage tag, count it,
    /// keep going. Tests assert on the recorded tags, not on log text.
    fn note_soft_failure(
        &self,
        outcome: &mut DispatchOutcome,
        stage: SoftStage,
        reference: &str,
        err: WebhookError,
    ) {
        tracing::warn!(
            delivery_id = %outcome.delivery_id,
            stage = stage.as_str(),
            code = err.error_code(),
            reference = %reference,
            error = %err,
            "soft failure, continuing pipeline"
        );
        global_metrics().record_soft_failure(stage.as_str());
        outcome.soft_failures.push(SoftFailure {
            stage,
            code: err.error_code(),
            message: err.to_string(),
        });
    }
}
