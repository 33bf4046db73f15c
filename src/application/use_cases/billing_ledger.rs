use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::application::ports::payment_processor::PaymentProcessor;
use crate::application::use_cases::subscription_sync::{METADATA_INTERVAL, METADATA_PLAN_CODE};
use crate::application::use_cases::user_binding::{UserBindingResolver, UserProfile};
use crate::domain::entities::{
    billing_record::{BillingRecordKind, LivemodeFilter},
    stripe_objects::{
        Expandable, Metadata, StripeCheckoutSession, StripeInvoice, StripeSubscription,
        timestamp_to_naive,
    },
};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingRecordProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub kind: BillingRecordKind,
    pub stripe_id: String,
    pub stripe_invoice_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub livemode: bool,
    pub description: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf_url: Option<String>,
    pub period_start: Option<NaiveDateTime>,
    pub period_end: Option<NaiveDateTime>,
    #[serde(skip)]
    pub raw: JsonValue,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Values written for one ledger row, keyed on `stripe_id`.
///
/// On update the owning user is kept, linked ids and optional value fields
/// only overwrite when present, and `created_at` only moves when the
/// source object carries its own creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingRecordUpsert {
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub kind: BillingRecordKind,
    pub stripe_id: String,
    pub stripe_invoice_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub livemode: bool,
    pub description: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf_url: Option<String>,
    pub period_start: Option<NaiveDateTime>,
    pub period_end: Option<NaiveDateTime>,
    pub raw: JsonValue,
    pub created_at: Option<NaiveDateTime>,
}

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait BillingRecordRepoTrait: Send + Sync {
    async fn upsert(&self, record: &BillingRecordUpsert) -> AppResult<BillingRecordProfile>;

    async fn get_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<BillingRecordProfile>>;

    /// Newest first by billing chronology.
    async fn list_by_user(
        &self,
        user_id: Uuid,
        livemode: Option<bool>,
    ) -> AppResult<Vec<BillingRecordProfile>>;
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Clone)]
pub struct BillingLedger {
    records: Arc<dyn BillingRecordRepoTrait>,
    binding: UserBindingResolver,
    processor: Arc<dyn PaymentProcessor>,
}

impl BillingLedger {
    pub fn new(
        records: Arc<dyn BillingRecordRepoTrait>,
        binding: UserBindingResolver,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            records,
            binding,
            processor,
        }
    }

    // ========================================================================
    // Invoices
    // ========================================================================

    /// Record an invoice. Returns `None` when no owner can be found.
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id))]
    pub async fn upsert_invoice(
        &self,
        invoice: &StripeInvoice,
    ) -> AppResult<Option<BillingRecordProfile>> {
        let customer_id = invoice.customer_id();

        let mut user = self
            .binding
            .resolve(customer_id, None, &invoice.metadata)
            .await?;

        if user.is_none() {
            user = self.owner_from_subscription(invoice).await?;
        }

        let Some(user) = user else {
            warn!(customer_id = ?customer_id, "No local user for invoice, skipping ledger entry");
            return Ok(None);
        };

        let (period_start, period_end) = invoice.line_period();

        let record = BillingRecordUpsert {
            user_id: user.id,
            stripe_customer_id: customer_id.map(str::to_string),
            kind: BillingRecordKind::Invoice,
            stripe_id: invoice.id.clone(),
            stripe_invoice_id: Some(invoice.id.clone()),
            stripe_subscription_id: invoice.subscription_id().map(str::to_string),
            stripe_payment_intent_id: invoice.payment_intent_id().map(str::to_string),
            amount_cents: invoice.amount_minor_units(),
            currency: invoice.currency.as_deref().map(str::to_lowercase),
            status: invoice.status.clone(),
            livemode: invoice.livemode,
            description: invoice.line_description().map(str::to_string),
            hosted_invoice_url: invoice.hosted_invoice_url.clone(),
            invoice_pdf_url: invoice.invoice_pdf.clone(),
            period_start: period_start.and_then(timestamp_to_naive),
            period_end: period_end.and_then(timestamp_to_naive),
            raw: to_raw(invoice),
            created_at: invoice.created.and_then(timestamp_to_naive),
        };

        self.records.upsert(&record).await.map(Some)
    }

    /// One extra lookup of the invoice's subscription, only to read the
    /// user id embedded at checkout. A failed lookup is not fatal.
    async fn owner_from_subscription(
        &self,
        invoice: &StripeInvoice,
    ) -> AppResult<Option<UserProfile>> {
        let metadata: Metadata = match invoice.subscription.as_ref() {
            None => return Ok(None),
            Some(Expandable::Object(subscription)) => subscription.metadata.clone(),
            Some(Expandable::Id(subscription_id)) => {
                match self.processor.retrieve_subscription(subscription_id).await {
                    Ok(subscription) => subscription.metadata,
                    Err(e) => {
                        warn!(
                            error = %e,
                            subscription_id = %subscription_id,
                            "Could not fetch subscription for invoice owner, proceeding without it"
                        );
                        return Ok(None);
                    }
                }
            }
        };

        self.binding
            .resolve(invoice.customer_id(), None, &metadata)
            .await
    }

    // ========================================================================
    // Checkout Sessions
    // ========================================================================

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn upsert_checkout_session(
        &self,
        session: &StripeCheckoutSession,
    ) -> AppResult<Option<BillingRecordProfile>> {
        let customer_id = session.customer_id();
        let Some(user) = self
            .binding
            .resolve(
                customer_id,
                session.client_reference_id.as_deref(),
                &session.metadata,
            )
            .await?
        else {
            warn!(customer_id = ?customer_id, "No local user for checkout session, skipping ledger entry");
            return Ok(None);
        };

        let record = BillingRecordUpsert {
            user_id: user.id,
            stripe_customer_id: customer_id.map(str::to_string),
            kind: BillingRecordKind::CheckoutSession,
            stripe_id: session.id.clone(),
            stripe_invoice_id: session.invoice_id().map(str::to_string),
            stripe_subscription_id: session.subscription_id().map(str::to_string),
            stripe_payment_intent_id: session.payment_intent_id().map(str::to_string),
            amount_cents: session.amount_total,
            currency: session.currency.as_deref().map(str::to_lowercase),
            status: session.payment_status.clone().or_else(|| session.status.clone()),
            livemode: session.livemode,
            description: plan_description(
                session.metadata_value(METADATA_PLAN_CODE),
                session.metadata_value(METADATA_INTERVAL),
            ),
            hosted_invoice_url: None,
            invoice_pdf_url: None,
            period_start: None,
            period_end: None,
            raw: to_raw(session),
            created_at: session.created.and_then(timestamp_to_naive),
        };

        self.records.upsert(&record).await.map(Some)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id))]
    pub async fn upsert_subscription(
        &self,
        subscription: &StripeSubscription,
    ) -> AppResult<Option<BillingRecordProfile>> {
        let customer_id = subscription.customer_id();
        let Some(user) = self
            .binding
            .resolve(customer_id, None, &subscription.metadata)
            .await?
        else {
            warn!(customer_id = ?customer_id, "No local user for subscription, skipping ledger entry");
            return Ok(None);
        };

        let price = subscription.first_item().and_then(|item| item.price.as_ref());
        let interval = price
            .and_then(|p| p.recurring.as_ref())
            .map(|r| r.interval.as_str())
            .or_else(|| subscription.metadata_value(METADATA_INTERVAL));

        let record = BillingRecordUpsert {
            user_id: user.id,
            stripe_customer_id: customer_id.map(str::to_string),
            kind: BillingRecordKind::Subscription,
            stripe_id: subscription.id.clone(),
            stripe_invoice_id: subscription.latest_invoice_id().map(str::to_string),
            stripe_subscription_id: Some(subscription.id.clone()),
            stripe_payment_intent_id: None,
            amount_cents: price.and_then(|p| p.unit_amount),
            currency: price
                .and_then(|p| p.currency.as_deref())
                .map(str::to_lowercase),
            status: subscription.status.clone(),
            livemode: subscription.livemode,
            description: plan_description(subscription.metadata_value(METADATA_PLAN_CODE), interval),
            hosted_invoice_url: None,
            invoice_pdf_url: None,
            period_start: subscription.period_start().and_then(timestamp_to_naive),
            period_end: subscription.period_end().and_then(timestamp_to_naive),
            raw: to_raw(subscription),
            created_at: None,
        };

        self.records.upsert(&record).await.map(Some)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn history_for_user(
        &self,
        user_id: Uuid,
        mode: LivemodeFilter,
    ) -> AppResult<Vec<BillingRecordProfile>> {
        self.records.list_by_user(user_id, mode.as_livemode()).await
    }
}

fn plan_description(plan_code: Option<&str>, interval: Option<&str>) -> Option<String> {
    match (plan_code, interval) {
        (Some(plan), Some(interval)) => Some(format!("VPS {} ({})", plan, interval)),
        (Some(plan), None) => Some(format!("VPS {}", plan)),
        _ => None,
    }
}

fn to_raw<T: Serialize>(object: &T) -> JsonValue {
    serde_json::to_value(object).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize Stripe object for ledger");
        JsonValue::Null
    })
}
