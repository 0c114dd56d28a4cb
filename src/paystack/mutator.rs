//! Subscription state application.
//!
//! Maps classified events onto subscriber account state. Every write is an
//! absolute set (plan, status, expiry, counter values), never an increment,
//! so a redelivered event converges to the same account state instead of
//! compounding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::error::WebhookResult;
use super::events::{metadata_string, EventKind, ParsedEvent};

/// Plan tag accounts fall back to when a subscription lapses.
pub const FREE_PLAN: &str = "free";

/// Days of access granted by a successful charge.
pub const PLAN_PERIOD_DAYS: i64 = 30;

/// Whether a subscription is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Paid access in effect
    Active,
    /// Lapsed, cancelled, or never subscribed
    Inactive,
}

/// Subscription state carried by each account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    /// Current plan tag
    pub plan: String,
    /// Active or inactive
    pub status: SubscriptionStatus,
    /// When paid access runs out; `None` for the free tier
    pub expires_at: Option<DateTime<Utc>>,
    /// Chat messages used this period
    pub chat_count: u32,
    /// Video minutes used this period
    pub video_count: u32,
    /// Voice minutes used this period
    pub voice_count: u32,
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self {
            plan: FREE_PLAN.to_string(),
            status: SubscriptionStatus::Inactive,
            expires_at: None,
            chat_count: 0,
            video_count: 0,
            voice_count: 0,
        }
    }
}

/// One subscriber account as the router sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account id (`metadata.user_id` on charge events)
    pub id: String,
    /// Paystack customer code bound to this account
    pub customer_code: Option<String>,
    /// Subscription state
    pub subscription: SubscriptionState,
}

/// Absolute-value updates applied to an account.
///
/// `None` leaves a field untouched. `expires_at` distinguishes leaving the
/// expiry alone (`None`) from clearing it (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    /// New plan tag
    pub plan: Option<String>,
    /// New subscription status
    pub status: Option<SubscriptionStatus>,
    /// New expiry, or `Some(None)` to clear it
    pub expires_at: Option<Option<DateTime<Utc>>>,
    /// Zero the chat/video/voice usage counters
    pub reset_usage: bool,
}

impl AccountUpdate {
    /// Full activation after a successful charge: new plan, active status,
    /// a fresh expiry, and zeroed usage counters.
    pub fn activation(plan: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            plan: Some(plan.into()),
            status: Some(SubscriptionStatus::Active),
            expires_at: Some(Some(expires_at)),
            reset_usage: true,
        }
    }

    /// Mark active without touching plan, expiry, or counters.
    pub fn bulk_activation() -> Self {
        Self {
            status: Some(SubscriptionStatus::Active),
            ..Self::default()
        }
    }

    /// Downgrade to the free tier and clear the expiry.
    pub fn downgrade() -> Self {
        Self {
            plan: Some(FREE_PLAN.to_string()),
            status: Some(SubscriptionStatus::Inactive),
            expires_at: Some(None),
            ..Self::default()
        }
    }

    /// Apply this update to a subscription state in place.
    pub fn apply_to(&self, state: &mut SubscriptionState) {
        if let Some(plan) = &self.plan {
            state.plan = plan.clone();
        }
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(expires_at) = self.expires_at {
            state.expires_at = expires_at;
        }
        if self.reset_usage {
            state.chat_count = 0;
            state.video_count = 0;
            state.voice_count = 0;
        }
    }
}

/// Storage seam for subscriber accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Ids of every account bound to a Paystack customer code.
    async fn find_accounts_by_customer_code(
        &self,
        customer_code: &str,
    ) -> WebhookResult<Vec<String>>;

    /// Apply an absolute-value update. Returns `false` when the account is
    /// unknown.
    async fn update_account(&self, account_id: &str, update: AccountUpdate)
        -> WebhookResult<bool>;
}

/// In-memory reference implementation.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account.
    pub async fn insert_account(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account);
    }

    /// Fetch an account by id.
    pub async fn get_account(&self, account_id: &str) -> Option<Account> {
        self.accounts.read().await.get(account_id).cloned()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_accounts_by_customer_code(
        &self,
        customer_code: &str,
    ) -> WebhookResult<Vec<String>> {
        let accounts = self.accounts.read().await;
        let mut ids: Vec<String> = accounts
            .values()
            .filter(|account| account.customer_code.as_deref() == Some(customer_code))
            .map(|account| account.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn update_account(
        &self,
        account_id: &str,
        update: AccountUpdate,
    ) -> WebhookResult<bool> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(account_id) {
            Some(account) => {
                update.apply_to(&mut account.subscription);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Applies classified events to account subscription state.
pub struct StateMutator {
    accounts: Arc<dyn AccountStore>,
}

impl StateMutator {
    /// Wrap an account store.
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// Apply one event. Returns the number of accounts updated.
    ///
    /// Missing prerequisites (account id, plan, customer code) are logged
    /// warnings and no-ops, never errors. Store failures bubble up for the
    /// dispatcher's soft-failure handling.
    pub async fn apply(&self, event: &ParsedEvent) -> WebhookResult<usize> {
        match event.kind {
            EventKind::ChargeSucceeded => self.apply_charge(event).await,
            EventKind::SubscriptionCreated | EventKind::InvoiceCreated => {
                self.activate_by_customer(event).await
            }
            EventKind::SubscriptionDisabled | EventKind::PaymentFailed => {
                self.downgrade_by_customer(event).await
            }
            EventKind::Other => Ok(0),
        }
    }

    async fn apply_charge(&self, event: &ParsedEvent) -> WebhookResult<usize> {
        let Some(account_id) = &event.account_id else {
            tracing::warn!(
                reference = %event.reference,
                "charge carries no user_id metadata, skipping state update"
            );
            return Ok(0);
        };
        let Some(plan) = metadata_string(event.metadata.get("plan")) else {
            tracing::warn!(
                reference = %event.reference,
                account_id = %account_id,
                "charge carries no plan metadata, skipping state update"
            );
            return Ok(0);
        };

        let expires_at = Utc::now() + Duration::days(PLAN_PERIOD_DAYS);
        let updated = self
            .accounts
            .update_account(account_id, AccountUpdate::activation(plan.clone(), expires_at))
            .await?;
        if updated {
            tracing::info!(
                account_id = %account_id,
                plan = %plan,
                expires_at = %expires_at,
                "activated plan from charge"
            );
            Ok(1)
        } else {
            tracing::warn!(
                account_id = %account_id,
                reference = %event.reference,
                "charge referenced an unknown account"
            );
            Ok(0)
        }
    }

    async fn activate_by_customer(&self, event: &ParsedEvent) -> WebhookResult<usize> {
        let Some(customer_code) = &event.customer_code else {
            tracing::warn!(
                kind = %event.kind,
                reference = %event.reference,
                "event carries no customer code, skipping state update"
            );
            return Ok(0);
        };
        let ids = self
            .accounts
            .find_accounts_by_customer_code(customer_code)
            .await?;
        for id in &ids {
            self.accounts
                .update_account(id, AccountUpdate::bulk_activation())
                .await?;
        }
        tracing::info!(
            kind = %event.kind,
            customer_code = %customer_code,
            accounts = ids.len(),
            "marked accounts active"
        );
        Ok(ids.len())
    }

    async fn downgrade_by_customer(&self, event: &ParsedEvent) -> WebhookResult<usize> {
        let Some(customer_code) = &event.customer_code else {
            tracing::warn!(
                kind = %event.kind,
                reference = %event.reference,
                "event carries no customer code, skipping downgrade"
            );
            return Ok(0);
        };
        let ids = self
            .accounts
            .find_accounts_by_customer_code(customer_code)
            .await?;
        for id in &ids {
            self.accounts
                .update_account(id, AccountUpdate::downgrade())
                .await?;
        }
        tracing::info!(
            kind = %event.kind,
            customer_code = %customer_code,
            accounts = ids.len(),
            "downgraded accounts to the free tier"
        );
        Ok(ids.len())
    }
}
