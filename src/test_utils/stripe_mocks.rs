//! Scripted stand-ins for the payment processor and the clock.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use crate::{
    application::ports::{
        clock::Clock,
        payment_processor::{CheckoutRequest, LookupError, LookupResult, PaymentProcessor},
    },
    domain::entities::stripe_objects::{
        Expandable, Metadata, StripeBillingPortalSession, StripeCheckoutSession, StripeCustomer,
        StripeInvoice, StripePrice, StripeSubscription,
    },
};

use super::factories::TEST_PERIOD_START;

// ============================================================================
// FakePaymentProcessor
// ============================================================================

/// Parks one lookup until the test releases it.
#[derive(Default)]
pub struct LookupGate {
    pub entered: Notify,
    pub release: Notify,
}

/// Serves objects registered up front and records what was asked of it.
#[derive(Default)]
pub struct FakePaymentProcessor {
    subscriptions: Mutex<HashMap<String, StripeSubscription>>,
    invoices: Mutex<HashMap<String, StripeInvoice>>,
    sessions: Mutex<HashMap<String, StripeCheckoutSession>>,
    prices: Mutex<HashMap<String, StripePrice>>,
    failing_prices: Mutex<HashSet<String>>,
    price_gate: Mutex<Option<Arc<LookupGate>>>,
    fail_subscriptions: AtomicBool,
    fail_invoices: AtomicBool,
    subscription_lookups: AtomicUsize,
    invoice_lookups: AtomicUsize,
    price_lookups: AtomicUsize,
    customers_created: AtomicUsize,
    sessions_created: AtomicUsize,
    portal_sessions_created: AtomicUsize,
    last_checkout: Mutex<Option<CheckoutRequest>>,
    /// `(customer_id, return_url)` of the latest portal session.
    last_portal: Mutex<Option<(String, String)>>,
}

impl FakePaymentProcessor {
    pub fn add_subscription(&self, subscription: StripeSubscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    pub fn add_invoice(&self, invoice: StripeInvoice) {
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.id.clone(), invoice);
    }

    pub fn add_checkout_session(&self, session: StripeCheckoutSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    /// Registers an active price reachable through `lookup_key`.
    pub fn add_price(&self, lookup_key: &str, price_id: &str) {
        let price = StripePrice {
            id: price_id.to_string(),
            currency: Some("eur".into()),
            lookup_key: Some(lookup_key.to_string()),
            active: true,
            ..Default::default()
        };
        self.prices
            .lock()
            .unwrap()
            .insert(lookup_key.to_string(), price);
    }

    pub fn fail_price_lookup(&self, lookup_key: &str) {
        self.failing_prices
            .lock()
            .unwrap()
            .insert(lookup_key.to_string());
    }

    /// The next price lookup signals `entered` and waits for `release`.
    pub fn hold_next_price_lookup(&self) -> Arc<LookupGate> {
        let gate = Arc::new(LookupGate::default());
        *self.price_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fail_subscription_lookups(&self) {
        self.fail_subscriptions.store(true, Ordering::SeqCst);
    }

    pub fn restore_subscription_lookups(&self) {
        self.fail_subscriptions.store(false, Ordering::SeqCst);
    }

    pub fn fail_invoice_lookups(&self) {
        self.fail_invoices.store(true, Ordering::SeqCst);
    }

    pub fn subscription_lookups(&self) -> usize {
        self.subscription_lookups.load(Ordering::SeqCst)
    }

    pub fn invoice_lookups(&self) -> usize {
        self.invoice_lookups.load(Ordering::SeqCst)
    }

    pub fn price_lookups(&self) -> usize {
        self.price_lookups.load(Ordering::SeqCst)
    }

    pub fn customers_created(&self) -> usize {
        self.customers_created.load(Ordering::SeqCst)
    }

    pub fn last_checkout_request(&self) -> Option<CheckoutRequest> {
        self.last_checkout.lock().unwrap().clone()
    }

    pub fn last_portal_request(&self) -> Option<(String, String)> {
        self.last_portal.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProcessor for FakePaymentProcessor {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> LookupResult<StripeSubscription> {
        self.subscription_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(LookupError::Transport("connection reset".into()));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(subscription_id.to_string()))
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> LookupResult<StripeInvoice> {
        self.invoice_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(LookupError::Transport("connection reset".into()));
        }
        self.invoices
            .lock()
            .unwrap()
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(invoice_id.to_string()))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> LookupResult<StripeCheckoutSession> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(session_id.to_string()))
    }

    async fn find_price_by_lookup_key(
        &self,
        lookup_key: &str,
    ) -> LookupResult<Option<StripePrice>> {
        self.price_lookups.fetch_add(1, Ordering::SeqCst);
        let gate = self.price_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.failing_prices.lock().unwrap().contains(lookup_key) {
            return Err(LookupError::Transport("timed out".into()));
        }
        Ok(self.prices.lock().unwrap().get(lookup_key).cloned())
    }

    async fn create_customer(
        &self,
        email: &str,
        metadata: &Metadata,
    ) -> LookupResult<StripeCustomer> {
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StripeCustomer {
            id: format!("cus_test_{n}"),
            email: Some(email.to_string()),
            metadata: metadata.clone(),
        })
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> LookupResult<StripeCheckoutSession> {
        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_checkout.lock().unwrap() = Some(request.clone());

        let id = format!("cs_test_{n}");
        let session = StripeCheckoutSession {
            url: Some(format!("https://checkout.stripe.test/{id}")),
            mode: Some("subscription".into()),
            status: Some("open".into()),
            payment_status: Some("unpaid".into()),
            customer: Some(Expandable::Id(request.customer_id.clone())),
            client_reference_id: Some(request.client_reference_id.clone()),
            id,
            ..Default::default()
        };
        self.add_checkout_session(session.clone());
        Ok(session)
    }

    async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> LookupResult<StripeBillingPortalSession> {
        let n = self.portal_sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_portal.lock().unwrap() = Some((customer_id.to_string(), return_url.to_string()));

        let id = format!("bps_test_{n}");
        Ok(StripeBillingPortalSession {
            url: format!("https://billing.stripe.test/{id}"),
            id,
        })
    }
}

// ============================================================================
// ManualClock
// ============================================================================

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(DateTime::from_timestamp(TEST_PERIOD_START, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
