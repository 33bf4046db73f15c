//! Test data factories.
//!
//! Each factory returns a complete, valid object; the closure overrides
//! individual fields.

use chrono::NaiveDateTime;
use serde_json::json;
use uuid::Uuid;

use crate::{
    application::use_cases::{
        billing_ledger::BillingRecordProfile, plan_catalog::VpsPlanProfile,
        user_binding::UserProfile,
    },
    domain::entities::{
        billing_record::BillingRecordKind,
        stripe_objects::{
            Expandable, Metadata, StripeCheckoutSession, StripeInvoice, StripeInvoiceLine,
            StripeList, StripePeriod, StripePrice, StripeRecurring, StripeSubscription,
            StripeSubscriptionItem,
        },
    },
};

/// Start of the default billing period used across fixtures.
pub const TEST_PERIOD_START: i64 = 1_700_000_000;
/// End of the default monthly period.
pub const TEST_PERIOD_END: i64 = 1_702_592_000;

pub fn test_datetime() -> NaiveDateTime {
    chrono::DateTime::from_timestamp(TEST_PERIOD_START, 0)
        .unwrap()
        .naive_utc()
}

pub fn create_test_user(overrides: impl FnOnce(&mut UserProfile)) -> UserProfile {
    let mut user = UserProfile {
        id: Uuid::new_v4(),
        email: "customer@example.com".to_string(),
        stripe_customer_id: None,
    };
    overrides(&mut user);
    user
}

pub fn create_test_plan(overrides: impl FnOnce(&mut VpsPlanProfile)) -> VpsPlanProfile {
    let mut plan = VpsPlanProfile {
        id: Uuid::new_v4(),
        plan_code: "nebula_one".to_string(),
        name: "Nebula One".to_string(),
        vcpu: 2,
        ram_gb: 4,
        storage_gb: 50,
        bandwidth_tb: 2,
        description: Some("2 vCPU, 4 GB RAM, 50 GB NVMe SSD, 2 TB bandwidth".to_string()),
        currency: "eur".to_string(),
        monthly_price_cents: 865,
        yearly_price_cents: 9300,
        stripe_lookup_key_monthly: None,
        stripe_lookup_key_yearly: None,
        is_active: true,
    };
    overrides(&mut plan);
    plan
}

/// An active monthly subscription for `cus_1` at 16.65 EUR.
pub fn create_test_stripe_subscription(
    id: &str,
    overrides: impl FnOnce(&mut StripeSubscription),
) -> StripeSubscription {
    let mut subscription = StripeSubscription {
        id: id.to_string(),
        customer: Some(Expandable::Id("cus_1".to_string())),
        status: Some("active".to_string()),
        items: Some(StripeList {
            data: vec![StripeSubscriptionItem {
                id: Some("si_1".to_string()),
                price: Some(StripePrice {
                    id: "price_nebula_one_monthly".to_string(),
                    currency: Some("eur".to_string()),
                    unit_amount: Some(1665),
                    recurring: Some(StripeRecurring {
                        interval: "month".to_string(),
                    }),
                    lookup_key: Some("nebula_one_monthly".to_string()),
                    active: true,
                }),
                current_period_start: Some(TEST_PERIOD_START),
                current_period_end: Some(TEST_PERIOD_END),
            }],
        }),
        metadata: Metadata::new(),
        cancel_at_period_end: false,
        billing_cycle_anchor: Some(TEST_PERIOD_START),
        current_period_start: Some(TEST_PERIOD_START),
        current_period_end: Some(TEST_PERIOD_END),
        canceled_at: None,
        ended_at: None,
        latest_invoice: None,
        livemode: false,
    };
    overrides(&mut subscription);
    subscription
}

/// An open invoice for `cus_1` on `sub_1` with one monthly line.
pub fn create_test_invoice(id: &str, overrides: impl FnOnce(&mut StripeInvoice)) -> StripeInvoice {
    let mut invoice = StripeInvoice {
        id: id.to_string(),
        customer: Some(Expandable::Id("cus_1".to_string())),
        subscription: Some(Expandable::Id("sub_1".to_string())),
        payment_intent: None,
        status: Some("open".to_string()),
        amount_paid: Some(0),
        amount_due: Some(1665),
        amount_remaining: Some(1665),
        currency: Some("eur".to_string()),
        description: None,
        hosted_invoice_url: Some(format!("https://invoice.stripe.test/{}", id)),
        invoice_pdf: Some(format!("https://invoice.stripe.test/{}/pdf", id)),
        created: Some(TEST_PERIOD_START),
        lines: Some(StripeList {
            data: vec![StripeInvoiceLine {
                description: Some("Nebula One (monthly)".to_string()),
                period: Some(StripePeriod {
                    start: Some(TEST_PERIOD_START),
                    end: Some(TEST_PERIOD_END),
                }),
            }],
        }),
        metadata: Metadata::new(),
        livemode: false,
    };
    overrides(&mut invoice);
    invoice
}

/// A completed subscription-mode session referencing `sub_1` by id.
pub fn create_test_checkout_session(
    id: &str,
    overrides: impl FnOnce(&mut StripeCheckoutSession),
) -> StripeCheckoutSession {
    let mut session = StripeCheckoutSession {
        id: id.to_string(),
        mode: Some("subscription".to_string()),
        status: Some("complete".to_string()),
        payment_status: Some("paid".to_string()),
        customer: Some(Expandable::Id("cus_1".to_string())),
        subscription: Some(Expandable::Id("sub_1".to_string())),
        invoice: None,
        payment_intent: None,
        client_reference_id: None,
        amount_total: Some(1665),
        currency: Some("eur".to_string()),
        url: Some(format!("https://checkout.stripe.test/{}", id)),
        created: Some(TEST_PERIOD_START),
        metadata: Metadata::new(),
        livemode: false,
    };
    overrides(&mut session);
    session
}

/// A stored invoice ledger row owned by a fresh user id.
pub fn create_test_billing_record(
    stripe_id: &str,
    overrides: impl FnOnce(&mut BillingRecordProfile),
) -> BillingRecordProfile {
    let mut record = BillingRecordProfile {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        stripe_customer_id: Some("cus_1".to_string()),
        kind: BillingRecordKind::Invoice,
        stripe_id: stripe_id.to_string(),
        stripe_invoice_id: Some(stripe_id.to_string()),
        stripe_subscription_id: Some("sub_1".to_string()),
        stripe_payment_intent_id: None,
        amount_cents: Some(1665),
        currency: Some("eur".to_string()),
        status: Some("open".to_string()),
        livemode: false,
        description: Some("Nebula One (monthly)".to_string()),
        hosted_invoice_url: None,
        invoice_pdf_url: None,
        period_start: Some(test_datetime()),
        period_end: None,
        raw: json!({ "id": stripe_id }),
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut record);
    record
}
