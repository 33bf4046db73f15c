//! Stripe event envelope decoded into a closed set of variants.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::stripe_objects::{StripeCheckoutSession, StripeInvoice, StripeSubscription};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const SUBSCRIPTION_PAUSED: &str = "customer.subscription.paused";
pub const INVOICE_FINALIZED: &str = "invoice.finalized";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
pub const INVOICE_PAID: &str = "invoice.paid";
pub const INVOICE_VOIDED: &str = "invoice.voided";
pub const INVOICE_MARKED_UNCOLLECTIBLE: &str = "invoice.marked_uncollectible";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    CheckoutCompleted(StripeCheckoutSession),
    Subscription {
        change: SubscriptionChange,
        subscription: StripeSubscription,
    },
    Invoice(StripeInvoice),
    /// Acknowledged, reserved for dunning alerts.
    PaymentFailed { invoice_id: Option<String> },
    /// Acknowledged, reserved for suspension alerts.
    SubscriptionPaused { subscription_id: Option<String> },
    /// A type this engine does not handle.
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StripeEvent {
    pub id: String,
    pub event_type: String,
    pub livemode: bool,
    pub created: Option<i64>,
    pub payload: JsonValue,
    pub kind: BillingEvent,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    livemode: bool,
    created: Option<i64>,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: JsonValue,
}

impl StripeEvent {
    /// Decode a raw event body. Known types must carry a well-formed object;
    /// unknown types only need a valid envelope.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let payload: JsonValue = serde_json::from_slice(body)?;
        let envelope: Envelope = serde_json::from_value(payload.clone())?;
        let object = envelope.data.object;

        let kind = match envelope.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                BillingEvent::CheckoutCompleted(serde_json::from_value(object)?)
            }
            SUBSCRIPTION_CREATED | SUBSCRIPTION_UPDATED | SUBSCRIPTION_DELETED => {
                let change = match envelope.event_type.as_str() {
                    SUBSCRIPTION_CREATED => SubscriptionChange::Created,
                    SUBSCRIPTION_UPDATED => SubscriptionChange::Updated,
                    _ => SubscriptionChange::Deleted,
                };
                BillingEvent::Subscription {
                    change,
                    subscription: serde_json::from_value(object)?,
                }
            }
            INVOICE_FINALIZED | INVOICE_PAYMENT_SUCCEEDED | INVOICE_PAID | INVOICE_VOIDED
            | INVOICE_MARKED_UNCOLLECTIBLE => BillingEvent::Invoice(serde_json::from_value(object)?),
            INVOICE_PAYMENT_FAILED => BillingEvent::PaymentFailed {
                invoice_id: object_id(&object),
            },
            SUBSCRIPTION_PAUSED => BillingEvent::SubscriptionPaused {
                subscription_id: object_id(&object),
            },
            _ => BillingEvent::Unrecognized,
        };

        Ok(StripeEvent {
            id: envelope.id,
            event_type: envelope.event_type,
            livemode: envelope.livemode,
            created: envelope.created,
            payload,
            kind,
        })
    }
}

fn object_id(object: &JsonValue) -> Option<String> {
    object.get("id").and_then(JsonValue::as_str).map(str::to_string)
}
