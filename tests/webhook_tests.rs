//! End-to-end webhook pipeline tests
//!
//! These tests drive the full Axum router with signed deliveries and verify
//! the response contract together with the pipeline's side effects: recorded
//! transactions, mutated accounts, and forward log rows.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tower::ServiceExt;
use url::Url;

use paystack_router::handlers::AppState;
use paystack_router::paystack::{
    webhook_router, Account, Dispatcher, InMemoryAccountStore, InMemoryForwardLog,
    InMemoryTransactionStore, RouterConfig, SignatureVerifier, SubscriptionState,
    SubscriptionStatus, TenantTag, TransactionStore, WebhookState, SIGNATURE_HEADER, WEBHOOK_PATH,
};

const TEST_SECRET: &str = "sk_test_integration_secret";

struct Pipeline {
    state: WebhookState,
    transactions: Arc<InMemoryTransactionStore>,
    accounts: Arc<InMemoryAccountStore>,
    forward_log: Arc<InMemoryForwardLog>,
}

fn pipeline() -> Pipeline {
    // Forward target points at an unroutable loopback port; forwarder wire
    // behavior has its own test file
    let mut config = RouterConfig::with_secret(
        TEST_SECRET,
        Url::parse("http://127.0.0.1:9/forward").unwrap(),
    );
    config.forward_max_attempts = 1;
    config.forward_timeout = Duration::from_millis(200);
    config.forward_backoff_base = Duration::from_millis(1);

    let transactions = Arc::new(InMemoryTransactionStore::new());
    let accounts = Arc::new(InMemoryAccountStore::new());
    let forward_log = Arc::new(InMemoryForwardLog::new());
    let dispatcher = Arc::new(Dispatcher::new(
        config,
        transactions.clone(),
        accounts.clone(),
        forward_log.clone(),
    ));

    Pipeline {
        state: WebhookState::new(dispatcher, Arc::new(AppState::new())),
        transactions,
        accounts,
        forward_log,
    }
}

fn sign(body: &[u8]) -> String {
    SignatureVerifier::from_secret(TEST_SECRET).sign(body)
}

/// POST a delivery through a fresh router and return status plus body text.
async fn deliver(
    state: &WebhookState,
    body: Vec<u8>,
    signature: Option<String>,
) -> (StatusCode, String) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    let request = builder.body(Body::from(body)).unwrap();

    let response = webhook_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn deliver_signed(state: &WebhookState, body: Vec<u8>) -> (StatusCode, String) {
    let signature = sign(&body);
    deliver(state, body, Some(signature)).await
}

fn charge_payload(reference: &str, amount: i64, app: Option<&str>) -> Vec<u8> {
    let mut metadata = json!({ "user_id": "acct_1", "plan": "pro" });
    if let Some(app) = app {
        metadata["app"] = json!(app);
    }
    json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": amount,
            "status": "success",
            "customer": { "customer_code": "CUS_main" },
            "metadata": metadata
        }
    })
    .to_string()
    .into_bytes()
}

fn subscription_payload(event: &str, customer_code: &str, subscription_code: &str) -> Vec<u8> {
    json!({
        "event": event,
        "data": {
            "subscription_code": subscription_code,
            "customer": { "customer_code": customer_code },
            "metadata": {}
        }
    })
    .to_string()
    .into_bytes()
}

fn paid_account(id: &str, customer_code: &str) -> Account {
    Account {
        id: id.to_string(),
        customer_code: Some(customer_code.to_string()),
        subscription: SubscriptionState {
            plan: "pro".to_string(),
            status: SubscriptionStatus::Active,
            expires_at: Some(Utc::now() + ChronoDuration::days(10)),
            chat_count: 12,
            video_count: 4,
            voice_count: 7,
        },
    }
}

// ============================================================================
// Response Contract
// ============================================================================

#[tokio::test]
async fn test_charge_is_acknowledged_with_success_body() {
    let pipeline = pipeline();
    let (status, body) =
        deliver_signed(&pipeline.state, charge_payload("ref_ack", 500_000, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"success"}"#);
}

#[tokio::test]
async fn test_bad_signature_is_rejected_with_error_body() {
    let pipeline = pipeline();
    let (status, body) = deliver(
        &pipeline.state,
        charge_payload("ref_rej", 500_000, None),
        Some("0badc0de".to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid signature"}"#);
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let pipeline = pipeline();
    let (status, body) =
        deliver(&pipeline.state, charge_payload("ref_no_sig", 1_000, None), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid signature"}"#);
}

#[tokio::test]
async fn test_rejected_delivery_leaves_no_trace() {
    let pipeline = pipeline();
    pipeline
        .accounts
        .insert_account(paid_account("acct_1", "CUS_main"))
        .await;

    deliver(
        &pipeline.state,
        charge_payload("ref_rej", 500_000, None),
        Some("0badc0de".to_string()),
    )
    .await;

    assert!(pipeline.transactions.is_empty().await);
    assert!(pipeline.forward_log.entries().await.is_empty());
    let account = pipeline.accounts.get_account("acct_1").await.unwrap();
    assert_eq!(account.subscription.chat_count, 12);
}

#[tokio::test]
async fn test_unparseable_payload_is_acknowledged_and_dropped() {
    let pipeline = pipeline();
    let (status, body) = deliver_signed(&pipeline.state, b"not json at all".to_vec()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"success"}"#);
    assert!(pipeline.transactions.is_empty().await);
}

#[tokio::test]
async fn test_payload_without_reference_is_acknowledged_and_dropped() {
    let pipeline = pipeline();
    let payload = json!({
        "event": "charge.success",
        "data": { "amount": 1000, "metadata": {} }
    })
    .to_string()
    .into_bytes();

    let (status, _) = deliver_signed(&pipeline.state, payload).await;

    assert_eq!(status, StatusCode::OK);
    assert!(pipeline.transactions.is_empty().await);
}

// ============================================================================
// Recording and State Mutation
// ============================================================================

#[tokio::test]
async fn test_charge_records_transaction_and_activates_account() {
    let pipeline = pipeline();
    pipeline
        .accounts
        .insert_account(Account {
            id: "acct_1".to_string(),
            customer_code: Some("CUS_main".to_string()),
            subscription: SubscriptionState {
                chat_count: 42,
                ..SubscriptionState::default()
            },
        })
        .await;

    let before = Utc::now();
    deliver_signed(&pipeline.state, charge_payload("ref_full", 500_000, None)).await;

    let record = pipeline
        .transactions
        .get_transaction(&TenantTag::new("main"), "ref_full")
        .await
        .unwrap()
        .expect("transaction should be recorded");
    assert_eq!(record.amount, Some(500_000));
    assert_eq!(record.event_name, "charge.success");
    assert_eq!(record.deliveries, 1);

    let account = pipeline.accounts.get_account("acct_1").await.unwrap();
    assert_eq!(account.subscription.plan, "pro");
    assert_eq!(account.subscription.status, SubscriptionStatus::Active);
    assert_eq!(account.subscription.chat_count, 0);

    let expires_at = account.subscription.expires_at.expect("expiry must be set");
    let expected = before + ChronoDuration::days(30);
    let drift = (expires_at - expected).num_seconds().abs();
    assert!(drift < 10, "expiry should land 30 days out, drift {drift}s");
}

#[tokio::test]
async fn test_redelivery_converges_to_one_row() {
    let pipeline = pipeline();
    pipeline
        .accounts
        .insert_account(paid_account("acct_1", "CUS_main"))
        .await;

    for _ in 0..3 {
        let (status, _) =
            deliver_signed(&pipeline.state, charge_payload("ref_dup", 9_900, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(pipeline.transactions.len().await, 1);
    let record = pipeline
        .transactions
        .get_transaction(&TenantTag::new("main"), "ref_dup")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.deliveries, 3);
    assert_eq!(record.amount, Some(9_900));
}

#[tokio::test]
async fn test_subscription_create_bulk_activates_by_customer_code() {
    let pipeline = pipeline();
    for id in ["acct_a", "acct_b"] {
        pipeline
            .accounts
            .insert_account(Account {
                id: id.to_string(),
                customer_code: Some("CUS_9".to_string()),
                subscription: SubscriptionState::default(),
            })
            .await;
    }
    pipeline
        .accounts
        .insert_account(Account {
            id: "acct_other".to_string(),
            customer_code: Some("CUS_other".to_string()),
            subscription: SubscriptionState::default(),
        })
        .await;

    deliver_signed(
        &pipeline.state,
        subscription_payload("subscription.create", "CUS_9", "SUB_1"),
    )
    .await;

    for id in ["acct_a", "acct_b"] {
        let account = pipeline.accounts.get_account(id).await.unwrap();
        assert_eq!(account.subscription.status, SubscriptionStatus::Active);
        // Bulk activation leaves plan and counters untouched
        assert_eq!(account.subscription.plan, "free");
    }
    let untouched = pipeline.accounts.get_account("acct_other").await.unwrap();
    assert_eq!(untouched.subscription.status, SubscriptionStatus::Inactive);
}

#[tokio::test]
async fn test_subscription_disable_downgrades_all_matching_accounts() {
    let pipeline = pipeline();
    pipeline
        .accounts
        .insert_account(paid_account("acct_a", "CUS_9"))
        .await;
    pipeline
        .accounts
        .insert_account(paid_account("acct_b", "CUS_9"))
        .await;
    pipeline
        .accounts
        .insert_account(paid_account("acct_other", "CUS_other"))
        .await;

    deliver_signed(
        &pipeline.state,
        subscription_payload("subscription.disable", "CUS_9", "SUB_1"),
    )
    .await;

    for id in ["acct_a", "acct_b"] {
        let account = pipeline.accounts.get_account(id).await.unwrap();
        assert_eq!(account.subscription.plan, "free");
        assert_eq!(account.subscription.status, SubscriptionStatus::Inactive);
        assert!(account.subscription.expires_at.is_none());
        // Usage counters survive a downgrade
        assert_eq!(account.subscription.chat_count, 12);
    }
    let untouched = pipeline.accounts.get_account("acct_other").await.unwrap();
    assert_eq!(untouched.subscription.plan, "pro");
}

#[tokio::test]
async fn test_invoice_payment_failed_downgrades() {
    let pipeline = pipeline();
    pipeline
        .accounts
        .insert_account(paid_account("acct_a", "CUS_9"))
        .await;

    let payload = json!({
        "event": "invoice.payment_failed",
        "data": {
            "invoice_code": "INV_77",
            "customer": { "customer_code": "CUS_9" },
            "metadata": {}
        }
    })
    .to_string()
    .into_bytes();
    deliver_signed(&pipeline.state, payload).await;

    let account = pipeline.accounts.get_account("acct_a").await.unwrap();
    assert_eq!(account.subscription.plan, "free");
    assert_eq!(account.subscription.status, SubscriptionStatus::Inactive);

    // Reference fell back to the invoice code
    let record = pipeline
        .transactions
        .get_transaction(&TenantTag::new("main"), "INV_77")
        .await
        .unwrap();
    assert!(record.is_some());
}

#[tokio::test]
async fn test_unknown_event_is_recorded_but_mutates_nothing() {
    let pipeline = pipeline();
    pipeline
        .accounts
        .insert_account(paid_account("acct_a", "CUS_9"))
        .await;

    let payload = json!({
        "event": "transfer.success",
        "data": {
            "reference": "TRF_1",
            "customer": { "customer_code": "CUS_9" }
        }
    })
    .to_string()
    .into_bytes();
    let (status, _) = deliver_signed(&pipeline.state, payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(pipeline.transactions.len().await, 1);
    let account = pipeline.accounts.get_account("acct_a").await.unwrap();
    assert_eq!(account.subscription.plan, "pro");
}

// ============================================================================
// Tenant Routing
// ============================================================================

#[tokio::test]
async fn test_same_reference_is_namespaced_per_tenant() {
    let pipeline = pipeline();

    deliver_signed(&pipeline.state, charge_payload("ref_x", 1_000, None)).await;
    deliver_signed(&pipeline.state, charge_payload("ref_x", 2_000, Some("Zoe"))).await;

    assert_eq!(pipeline.transactions.len().await, 2);
    let main_row = pipeline
        .transactions
        .get_transaction(&TenantTag::new("main"), "ref_x")
        .await
        .unwrap()
        .unwrap();
    let zoe_row = pipeline
        .transactions
        .get_transaction(&TenantTag::new("zoe"), "ref_x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(main_row.amount, Some(1_000));
    assert_eq!(zoe_row.amount, Some(2_000));
}

#[tokio::test]
async fn test_tenant_tag_is_case_insensitive() {
    let pipeline = pipeline();

    deliver_signed(&pipeline.state, charge_payload("ref_a", 100, Some("ZOE"))).await;
    deliver_signed(&pipeline.state, charge_payload("ref_a", 200, Some("zoe"))).await;

    assert_eq!(pipeline.transactions.len().await, 1);
    let record = pipeline
        .transactions
        .get_transaction(&TenantTag::new("zoe"), "ref_a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.deliveries, 2);
}

#[tokio::test]
async fn test_forward_tenant_gets_exactly_one_log_row() {
    let pipeline = pipeline();

    let (status, body) = deliver_signed(
        &pipeline.state,
        charge_payload("ref_fwd", 3_000, Some("elevenone")),
    )
    .await;

    // Downstream is unreachable, but the delivery is still acknowledged
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"success"}"#);

    let entries = pipeline.forward_log.entries().await;
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].ok);
    assert_eq!(entries[0].reference, "ref_fwd");

    // The transaction was still recorded for the forward tenant
    let record = pipeline
        .transactions
        .get_transaction(&TenantTag::new("elevenone"), "ref_fwd")
        .await
        .unwrap();
    assert!(record.is_some());
}

#[tokio::test]
async fn test_forward_routing_ignores_tenant_case() {
    let pipeline = pipeline();

    let (status, _) = deliver_signed(
        &pipeline.state,
        charge_payload("ref_mixed", 3_000, Some("ElevenOne")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let entries = pipeline.forward_log.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reference, "ref_mixed");

    // The record lands under the normalized tenant tag
    let record = pipeline
        .transactions
        .get_transaction(&TenantTag::new("elevenone"), "ref_mixed")
        .await
        .unwrap();
    assert!(record.is_some());
}

#[tokio::test]
async fn test_primary_tenant_is_never_forwarded() {
    let pipeline = pipeline();

    deliver_signed(&pipeline.state, charge_payload("ref_main", 1_000, None)).await;
    deliver_signed(&pipeline.state, charge_payload("ref_zoe", 1_000, Some("zoe"))).await;

    assert!(pipeline.forward_log.entries().await.is_empty());
}
