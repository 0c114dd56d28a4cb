//! Paystack event classification.
//!
//! Turns a raw webhook body into a typed [`ParsedEvent`]: the event kind,
//! the tenant that owns the delivery, the idempotency reference, and the
//! normalized payment fields the rest of the pipeline consumes. The raw
//! body itself stays untouched for signature checks and forwarding; this
//! module is the only place that parses it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{WebhookError, WebhookResult};

/// Paystack event kinds this router distinguishes.
///
/// Wire names are Paystack's own. Anything unrecognized maps to
/// [`Other`](Self::Other) and is still recorded, but never touches
/// subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `charge.success`: a charge settled (one-off or subscription renewal)
    #[serde(rename = "charge.success")]
    ChargeSucceeded,
    /// `subscription.create`: a subscription was set up for a customer
    #[serde(rename = "subscription.create")]
    SubscriptionCreated,
    /// `subscription.disable`: a subscription was cancelled or expired
    #[serde(rename = "subscription.disable")]
    SubscriptionDisabled,
    /// `invoice.create`: a renewal invoice was raised
    #[serde(rename = "invoice.create")]
    InvoiceCreated,
    /// `invoice.payment_failed`: a renewal charge could not be collected
    #[serde(rename = "invoice.payment_failed")]
    PaymentFailed,
    /// Any other event string
    #[serde(rename = "other")]
    #[serde(other)]
    Other,
}

impl EventKind {
    /// Wire name for known kinds, `"other"` otherwise.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargeSucceeded => "charge.success",
            Self::SubscriptionCreated => "subscription.create",
            Self::SubscriptionDisabled => "subscription.disable",
            Self::InvoiceCreated => "invoice.create",
            Self::PaymentFailed => "invoice.payment_failed",
            Self::Other => "other",
        }
    }

    /// Whether this kind drives a subscription state change.
    pub fn mutates_state(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "charge.success" => Self::ChargeSucceeded,
            "subscription.create" => Self::SubscriptionCreated,
            "subscription.disable" => Self::SubscriptionDisabled,
            "invoice.create" => Self::InvoiceCreated,
            "invoice.payment_failed" => Self::PaymentFailed,
            _ => Self::Other,
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-normalized tenant identifier.
///
/// Deliveries name their tenant in `data.metadata.app` and the comparison
/// is case-insensitive, so tags normalize to lowercase at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantTag(String);

impl TenantTag {
    /// Build a tag, trimming and lowercasing the input.
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_lowercase())
    }

    /// The normalized tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Raw Paystack webhook envelope: the event name plus its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackEvent {
    /// Wire event name, e.g. `charge.success`
    pub event: String,
    /// Event payload; shape varies per event kind
    #[serde(default)]
    pub data: Value,
}

impl PaystackEvent {
    /// Parse an envelope from raw body bytes.
    pub fn from_bytes(raw: &[u8]) -> WebhookResult<Self> {
        serde_json::from_slice(raw).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }

    /// Typed kind for the wire event name.
    pub fn kind(&self) -> EventKind {
        self.event.parse().unwrap_or(EventKind::Other)
    }
}

/// A classified delivery: typed kind plus the normalized fields the
/// recorder, mutator, and forwarder consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEvent {
    /// Typed event kind
    pub kind: EventKind,
    /// Wire event name as delivered (kept so `other` kinds stay observable)
    pub event_name: String,
    /// Tenant owning this delivery
    pub tenant: TenantTag,
    /// Idempotency key, unique per logical transaction
    pub reference: String,
    /// Subscriber account id from `metadata.user_id`, when present
    pub account_id: Option<String>,
    /// Charge amount in the currency's subunit
    pub amount: Option<i64>,
    /// Provider-reported status string
    pub status: Option<String>,
    /// Paystack customer code from `data.customer.customer_code`
    pub customer_code: Option<String>,
    /// Opaque metadata map from `data.metadata`
    pub metadata: Map<String, Value>,
}

/// Classify a raw webhook body.
///
/// Fails only on malformed JSON, a missing or non-object `data` member, or
/// a payload with no derivable idempotency reference. Unknown event names
/// are not errors; they classify as [`EventKind::Other`].
pub fn classify(raw: &[u8], primary_tenant: &TenantTag) -> WebhookResult<ParsedEvent> {
    let envelope = PaystackEvent::from_bytes(raw)?;
    let data = envelope.data.as_object().ok_or(WebhookError::MissingData)?;

    let metadata = metadata_map(data.get("metadata"));
    let reference = extract_reference(data)?;

    Ok(ParsedEvent {
        kind: envelope.kind(),
        event_name: envelope.event.clone(),
        tenant: resolve_tenant(&metadata, primary_tenant),
        reference,
        account_id: metadata_string(metadata.get("user_id")),
        amount: data.get("amount").and_then(Value::as_i64),
        status: data.get("status").and_then(Value::as_str).map(str::to_owned),
        customer_code: data
            .get("customer")
            .and_then(|c| c.get("customer_code"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        metadata,
    })
}

/// Paystack sends `metadata` as `""` or `null` when a charge carries none;
/// only a JSON object contributes fields.
fn metadata_map(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

fn resolve_tenant(metadata: &Map<String, Value>, primary: &TenantTag) -> TenantTag {
    metadata
        .get("app")
        .and_then(Value::as_str)
        .filter(|app| !app.trim().is_empty())
        .map(TenantTag::new)
        .unwrap_or_else(|| primary.clone())
}

/// Idempotency key: `reference` for charges, falling back to the
/// subscription or invoice code for lifecycle events.
fn extract_reference(data: &Map<String, Value>) -> WebhookResult<String> {
    for key in ["reference", "subscription_code", "invoice_code"] {
        if let Some(reference) = data.get(key).and_then(Value::as_str) {
            if !reference.is_empty() {
                return Ok(reference.to_owned());
            }
        }
    }
    Err(WebhookError::MissingReference)
}

/// Metadata values like `user_id` arrive as strings or bare numbers.
pub(crate) fn metadata_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
