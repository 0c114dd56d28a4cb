//! Idempotent transaction recording.
//!
//! Paystack redelivers webhooks, sometimes many times, so every classified
//! delivery is upserted into the transaction store keyed by `(tenant,
//! reference)`. One row per logical transaction; field values converge to
//! the latest delivery's values instead of accumulating.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::error::WebhookResult;
use super::events::{EventKind, ParsedEvent, TenantTag};

/// Durable record of one logical Paystack transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Tenant namespace the record lives in
    pub tenant: TenantTag,
    /// Idempotency key
    pub reference: String,
    /// Typed kind from the latest delivery
    pub kind: EventKind,
    /// Wire event name from the latest delivery
    pub event_name: String,
    /// Amount from the latest delivery
    pub amount: Option<i64>,
    /// Status from the latest delivery
    pub status: Option<String>,
    /// Customer code from the latest delivery
    pub customer_code: Option<String>,
    /// Account id from the latest delivery
    pub account_id: Option<String>,
    /// When this reference was first seen
    pub first_seen_at: DateTime<Utc>,
    /// When the latest delivery arrived
    pub updated_at: DateTime<Utc>,
    /// Deliveries observed for this reference
    pub deliveries: u32,
}

/// Storage seam for transaction records.
///
/// `upsert_transaction` must be an atomic insert-or-update: under
/// concurrent redelivery of one reference, implementations may not read
/// and then write in separate steps.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert or update the record keyed by `(event.tenant,
    /// event.reference)`, overwriting event fields with this delivery's
    /// values. Returns the record as stored.
    async fn upsert_transaction(&self, event: &ParsedEvent) -> WebhookResult<TransactionRecord>;

    /// Fetch a record, if present.
    async fn get_transaction(
        &self,
        tenant: &TenantTag,
        reference: &str,
    ) -> WebhookResult<Option<TransactionRecord>>;
}

/// In-memory reference implementation.
///
/// The write guard spans the whole read-modify-write, so concurrent
/// deliveries of the same reference serialize instead of racing.
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    rows: RwLock<HashMap<(TenantTag, String), TransactionRecord>>,
}

impl InMemoryTransactionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for one tenant.
    pub async fn count_for_tenant(&self, tenant: &TenantTag) -> usize {
        self.rows
            .read()
            .await
            .keys()
            .filter(|(t, _)| t == tenant)
            .count()
    }

    /// Total records across all tenants.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn upsert_transaction(&self, event: &ParsedEvent) -> WebhookResult<TransactionRecord> {
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        let record = rows
            .entry((event.tenant.clone(), event.reference.clone()))
            .and_modify(|record| {
                record.kind = event.kind;
                record.event_name = event.event_name.clone();
                record.amount = event.amount;
                record.status = event.status.clone();
                record.customer_code = event.customer_code.clone();
                record.account_id = event.account_id.clone();
                record.updated_at = now;
                record.deliveries += 1;
            })
            .or_insert_with(|| TransactionRecord {
                tenant: event.tenant.clone(),
                reference: event.reference.clone(),
                kind: event.kind,
                event_name: event.event_name.clone(),
                amount: event.amount,
                status: event.status.clone(),
                customer_code: event.customer_code.clone(),
                account_id: event.account_id.clone(),
                first_seen_at: now,
                updated_at: now,
                deliveries: 1,
            });
        Ok(record.clone())
    }

    async fn get_transaction(
        &self,
        tenant: &TenantTag,
        reference: &str,
    ) -> WebhookResult<Option<TransactionRecord>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(tenant.clone(), reference.to_owned())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::sync::Arc;
    use tokio_test::assert_ok;

    fn event(tenant: &str, reference: &str, amount: Option<i64>) -> ParsedEvent {
        ParsedEvent {
            kind: EventKind::ChargeSucceeded,
            event_name: "charge.success".to_string(),
            tenant: TenantTag::new(tenant),
            reference: reference.to_string(),
            account_id: Some("acct_1".to_string()),
            amount,
            status: Some("success".to_string()),
            customer_code: Some("CUS_1".to_string()),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_redelivery_converges_to_one_row() {
        let store = InMemoryTransactionStore::new();
        let tenant = TenantTag::new("main");

        store.upsert_transaction(&event("main", "ref_1", Some(1000))).await.unwrap();
        store.upsert_transaction(&event("main", "ref_1", Some(2000))).await.unwrap();
        let last = store.upsert_transaction(&event("main", "ref_1", Some(3000))).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(last.deliveries, 3);
        assert_eq!(last.amount, Some(3000));

        let stored = store.get_transaction(&tenant, "ref_1").await.unwrap().unwrap();
        assert_eq!(stored.amount, Some(3000));
        assert_eq!(stored.deliveries, 3);
        assert!(stored.updated_at >= stored.first_seen_at);
    }

    #[tokio::test]
    async fn test_first_seen_survives_redelivery() {
        let store = InMemoryTransactionStore::new();
        let first = store.upsert_transaction(&event("main", "ref_1", Some(1))).await.unwrap();
        let second = store.upsert_transaction(&event("main", "ref_1", Some(2))).await.unwrap();
        assert_eq!(first.first_seen_at, second.first_seen_at);
    }

    #[tokio::test]
    async fn test_tenants_namespace_references() {
        let store = InMemoryTransactionStore::new();
        store.upsert_transaction(&event("main", "ref_1", Some(1))).await.unwrap();
        store.upsert_transaction(&event("elevenone", "ref_1", Some(2))).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.count_for_tenant(&TenantTag::new("main")).await, 1);
        assert_eq!(store.count_for_tenant(&TenantTag::new("elevenone")).await, 1);

        let main_row = store
            .get_transaction(&TenantTag::new("main"), "ref_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(main_row.amount, Some(1));
    }

    #[tokio::test]
    async fn test_missing_reference_reads_none() {
        let store = InMemoryTransactionStore::new();
        let found = store
            .get_transaction(&TenantTag::new("main"), "ref_missing")
            .await
            .unwrap();
        assert!(found.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_redelivery_stays_single_row() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let mut handles = Vec::new();
        for i in 0..16i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_transaction(&event("main", "ref_race", Some(i)))
                    .await
            }));
        }
        for handle in handles {
            tokio_test::assert_ok!(handle.await.unwrap());
        }

        assert_eq!(store.len().await, 1);
        let row = store
            .get_transaction(&TenantTag::new("main"), "ref_race")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.deliveries, 16);
    }
}
