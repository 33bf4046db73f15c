//! Typed views of the Stripe objects the billing engine reads.
//!
//! Only the fields reconciliation needs are modelled. Every field that
//! Stripe may omit or null out is optional, so a partially expanded object
//! still decodes.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Metadata = HashMap<String, String>;

/// Convert a Unix timestamp to NaiveDateTime
pub fn timestamp_to_naive(secs: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

pub trait StripeObject {
    fn id(&self) -> &str;
}

/// A reference that Stripe returns either as a bare id or, when expanded,
/// as the full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T: StripeObject> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.id(),
        }
    }

    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(obj),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

// ============================================================================
// Customers & Prices
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StripeObject for StripeCustomer {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeRecurring {
    pub interval: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub currency: Option<String>,
    pub unit_amount: Option<i64>,
    pub recurring: Option<StripeRecurring>,
    pub lookup_key: Option<String>,
    #[serde(default)]
    pub active: bool,
}

impl StripeObject for StripePrice {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: Option<String>,
    pub price: Option<StripePrice>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<Expandable<StripeCustomer>>,
    pub status: Option<String>,
    pub items: Option<StripeList<StripeSubscriptionItem>>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub billing_cycle_anchor: Option<i64>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub canceled_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub latest_invoice: Option<Expandable<StripeInvoice>>,
    #[serde(default)]
    pub livemode: bool,
}

impl StripeObject for StripeSubscription {
    fn id(&self) -> &str {
        &self.id
    }
}

impl StripeSubscription {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    /// The single priced line item. Additional items are ignored.
    pub fn first_item(&self) -> Option<&StripeSubscriptionItem> {
        self.items.as_ref().and_then(|items| items.data.first())
    }

    pub fn has_items(&self) -> bool {
        self.first_item().is_some()
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        non_empty(self.metadata.get(key))
    }

    /// Period start, falling back to the item level where newer API
    /// versions report it.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| self.first_item().and_then(|i| i.current_period_start))
    }

    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.first_item().and_then(|i| i.current_period_end))
    }

    pub fn latest_invoice_id(&self) -> Option<&str> {
        self.latest_invoice.as_ref().map(Expandable::id)
    }
}

// ============================================================================
// Invoices & Payment Intents
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: Option<String>,
}

impl StripeObject for StripePaymentIntent {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripePeriod {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeInvoiceLine {
    pub description: Option<String>,
    pub period: Option<StripePeriod>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<Expandable<StripeCustomer>>,
    pub subscription: Option<Expandable<StripeSubscription>>,
    pub payment_intent: Option<Expandable<StripePaymentIntent>>,
    pub status: Option<String>,
    pub amount_paid: Option<i64>,
    pub amount_due: Option<i64>,
    pub amount_remaining: Option<i64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
    pub created: Option<i64>,
    pub lines: Option<StripeList<StripeInvoiceLine>>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub livemode: bool,
}

impl StripeObject for StripeInvoice {
    fn id(&self) -> &str {
        &self.id
    }
}

impl StripeInvoice {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(Expandable::id)
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().map(Expandable::id)
    }

    /// Status of the embedded payment intent, when it was expanded.
    pub fn payment_intent_status(&self) -> Option<&str> {
        self.payment_intent
            .as_ref()
            .and_then(Expandable::as_object)
            .and_then(|pi| pi.status.as_deref())
    }

    /// First non-zero of paid, due, then remaining.
    pub fn amount_minor_units(&self) -> Option<i64> {
        let candidates = [self.amount_paid, self.amount_due, self.amount_remaining];
        candidates
            .iter()
            .flatten()
            .copied()
            .find(|amount| *amount != 0)
            .or_else(|| candidates.iter().flatten().copied().next())
    }

    pub fn first_line(&self) -> Option<&StripeInvoiceLine> {
        self.lines.as_ref().and_then(|lines| lines.data.first())
    }

    pub fn line_description(&self) -> Option<&str> {
        self.first_line()
            .and_then(|line| non_empty(line.description.as_ref()))
            .or_else(|| non_empty(self.description.as_ref()))
    }

    pub fn line_period(&self) -> (Option<i64>, Option<i64>) {
        match self.first_line().and_then(|line| line.period.as_ref()) {
            Some(period) => (period.start, period.end),
            None => (None, None),
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        non_empty(self.metadata.get(key))
    }
}

// ============================================================================
// Billing Portal
// ============================================================================

/// A customer portal session. Only the redirect target matters to us.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeBillingPortalSession {
    pub id: String,
    pub url: String,
}

// ============================================================================
// Checkout Sessions
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer: Option<Expandable<StripeCustomer>>,
    pub subscription: Option<Expandable<StripeSubscription>>,
    pub invoice: Option<Expandable<StripeInvoice>>,
    pub payment_intent: Option<Expandable<StripePaymentIntent>>,
    pub client_reference_id: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub url: Option<String>,
    pub created: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub livemode: bool,
}

impl StripeObject for StripeCheckoutSession {
    fn id(&self) -> &str {
        &self.id
    }
}

impl StripeCheckoutSession {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(Expandable::id)
    }

    pub fn invoice_id(&self) -> Option<&str> {
        self.invoice.as_ref().map(Expandable::id)
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().map(Expandable::id)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        non_empty(self.metadata.get(key))
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}
