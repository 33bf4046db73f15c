use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::plan_catalog::PlanRepoTrait;
use crate::application::use_cases::user_binding::UserBindingResolver;
use crate::domain::entities::{
    billing_interval::BillingInterval,
    stripe_objects::{StripeSubscription, timestamp_to_naive},
    subscription_status::SubscriptionStatus,
};

pub const METADATA_PLAN_CODE: &str = "plan_code";
pub const METADATA_INTERVAL: &str = "interval";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct VpsSubscriptionProfile {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub stripe_price_id: String,
    pub interval: BillingInterval,
    pub currency: String,
    pub unit_amount: Option<i64>,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub billing_cycle_anchor: Option<NaiveDateTime>,
    pub current_period_start: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    pub canceled_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Local projection of a remote subscription, written as one upsert.
///
/// `user_id` and `plan_id` only fill an empty column. Anchor and period
/// boundaries keep the stored value when the remote object omits them.
/// Everything else is overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSnapshot {
    pub user_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub stripe_price_id: String,
    pub interval: BillingInterval,
    pub currency: String,
    pub unit_amount: Option<i64>,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub billing_cycle_anchor: Option<NaiveDateTime>,
    pub current_period_start: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    pub canceled_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
}

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait VpsSubscriptionRepoTrait: Send + Sync {
    async fn upsert(&self, snapshot: &SubscriptionSnapshot) -> AppResult<VpsSubscriptionProfile>;

    async fn get_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<VpsSubscriptionProfile>>;
}

// ============================================================================
// Synchronizer
// ============================================================================

#[derive(Clone)]
pub struct SubscriptionSynchronizer {
    subscriptions: Arc<dyn VpsSubscriptionRepoTrait>,
    plans: Arc<dyn PlanRepoTrait>,
    binding: UserBindingResolver,
}

impl SubscriptionSynchronizer {
    pub fn new(
        subscriptions: Arc<dyn VpsSubscriptionRepoTrait>,
        plans: Arc<dyn PlanRepoTrait>,
        binding: UserBindingResolver,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            binding,
        }
    }

    /// Align the local row for this subscription with the remote object.
    ///
    /// A `deleted` lifecycle event lands here too: the terminal status is
    /// recorded and the row is kept.
    ///
    /// Returns `None` when the price bills on an interval the panel does not
    /// sell. Redelivery cannot change that, so it is skipped rather than
    /// failed.
    #[instrument(skip(self, remote), fields(subscription_id = %remote.id))]
    pub async fn upsert(
        &self,
        remote: &StripeSubscription,
    ) -> AppResult<Option<VpsSubscriptionProfile>> {
        let customer_id = remote.customer_id().ok_or_else(|| {
            AppError::InvalidInput(format!("Subscription {} has no customer", remote.id))
        })?;

        let item = remote.first_item().ok_or_else(|| {
            AppError::InvalidInput(format!("Subscription {} has no line items", remote.id))
        })?;
        let price = item.price.as_ref().ok_or_else(|| {
            AppError::InvalidInput(format!("Subscription {} item has no price", remote.id))
        })?;

        let interval = price
            .recurring
            .as_ref()
            .and_then(|r| BillingInterval::parse(&r.interval))
            .or_else(|| {
                remote
                    .metadata_value(METADATA_INTERVAL)
                    .and_then(BillingInterval::parse)
            });
        let Some(interval) = interval else {
            warn!(
                price_id = %price.id,
                recurring = ?price.recurring.as_ref().map(|r| r.interval.as_str()),
                "Subscription price has no supported interval, skipping sync"
            );
            return Ok(None);
        };

        let user = self
            .binding
            .resolve(Some(customer_id), None, &remote.metadata)
            .await?;
        if user.is_none() {
            warn!(customer_id, "No local user for subscription, syncing without owner");
        }

        let plan_id = match remote.metadata_value(METADATA_PLAN_CODE) {
            Some(plan_code) => {
                let plan = self.plans.get_active_by_code(plan_code).await?;
                if plan.is_none() {
                    warn!(plan_code, "Subscription references unknown or inactive plan");
                }
                plan.map(|p| p.id)
            }
            None => None,
        };

        let status = SubscriptionStatus::from_stripe(remote.status.as_deref().unwrap_or_default());

        let snapshot = SubscriptionSnapshot {
            user_id: user.map(|u| u.id),
            plan_id,
            stripe_customer_id: customer_id.to_string(),
            stripe_subscription_id: remote.id.clone(),
            stripe_price_id: price.id.clone(),
            interval,
            currency: price.currency.clone().unwrap_or_default().to_lowercase(),
            unit_amount: price.unit_amount,
            status,
            cancel_at_period_end: remote.cancel_at_period_end,
            billing_cycle_anchor: remote.billing_cycle_anchor.and_then(timestamp_to_naive),
            current_period_start: remote.period_start().and_then(timestamp_to_naive),
            current_period_end: remote.period_end().and_then(timestamp_to_naive),
            canceled_at: remote.canceled_at.and_then(timestamp_to_naive),
            ended_at: remote.ended_at.and_then(timestamp_to_naive),
        };

        let stored = self.subscriptions.upsert(&snapshot).await?;

        info!(
            status = %stored.status,
            user_id = ?stored.user_id,
            plan_id = ?stored.plan_id,
            "Synchronized VPS subscription"
        );

        Ok(Some(stored))
    }
}
