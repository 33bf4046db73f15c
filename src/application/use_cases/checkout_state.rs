use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::app_error::AppResult;
use crate::application::ports::payment_processor::PaymentProcessor;
use crate::application::use_cases::billing_ledger::BillingRecordRepoTrait;
use crate::domain::entities::{
    billing_record::BillingRecordKind,
    checkout_state::{CheckoutDecision, CheckoutState, IN_PROGRESS_PAYMENT_INTENT_STATUSES},
    stripe_objects::{
        Expandable, StripeCheckoutSession, StripeInvoice, StripeSubscription,
    },
};

const MODE_PAYMENT: &str = "payment";
const MODE_SUBSCRIPTION: &str = "subscription";

/// Decides whether a checkout has settled by combining the local ledger
/// with live Stripe objects.
#[derive(Clone)]
pub struct CheckoutStateResolver {
    processor: Arc<dyn PaymentProcessor>,
    records: Arc<dyn BillingRecordRepoTrait>,
}

impl CheckoutStateResolver {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        records: Arc<dyn BillingRecordRepoTrait>,
    ) -> Self {
        Self { processor, records }
    }

    /// Fetch the session with its nested objects expanded and decide.
    ///
    /// A failed session lookup is an error: without the session there is
    /// nothing to decide on.
    #[instrument(skip(self))]
    pub async fn resolve_session(&self, session_id: &str) -> AppResult<CheckoutDecision> {
        let session = self.processor.retrieve_checkout_session(session_id).await?;
        self.decide(&session).await
    }

    /// Polling variant exposing only the state.
    pub async fn poll_state(&self, session_id: &str) -> AppResult<CheckoutState> {
        self.resolve_session(session_id).await.map(|d| d.state)
    }

    pub async fn decide(&self, session: &StripeCheckoutSession) -> AppResult<CheckoutDecision> {
        let decision = match session.mode.as_deref() {
            Some(MODE_PAYMENT) => decide_payment(session),
            Some(MODE_SUBSCRIPTION) => self.decide_subscription(session).await?,
            other => {
                warn!(session_id = %session.id, mode = ?other, "Unknown checkout mode, failing closed");
                CheckoutDecision::new(CheckoutState::Failed, None)
            }
        };

        debug!(
            session_id = %session.id,
            state = %decision.state,
            invoice_id = ?decision.invoice_id,
            "Checkout state decided"
        );
        Ok(decision)
    }

    async fn decide_subscription(
        &self,
        session: &StripeCheckoutSession,
    ) -> AppResult<CheckoutDecision> {
        let subscription = self.subscription_for(session).await;

        let invoice_ref = subscription
            .as_ref()
            .and_then(|s| s.latest_invoice.clone())
            .or_else(|| session.invoice.clone());

        let Some(invoice_ref) = invoice_ref else {
            return Ok(CheckoutDecision::new(CheckoutState::Pending, None));
        };
        let invoice_id = invoice_ref.id().to_string();

        // Local truth wins once recorded.
        if let Some(record) = self.records.get_by_stripe_id(&invoice_id).await? {
            if record.kind == BillingRecordKind::Invoice
                && record.status.as_deref() == Some("paid")
            {
                return Ok(CheckoutDecision::new(CheckoutState::Paid, Some(invoice_id)));
            }
        }

        let invoice = match invoice_ref {
            Expandable::Object(invoice) => Some(*invoice),
            Expandable::Id(id) => match self.processor.retrieve_invoice(&id).await {
                Ok(invoice) => Some(invoice),
                Err(e) => {
                    warn!(error = %e, invoice_id = %id, "Invoice lookup failed, treating as not yet available");
                    None
                }
            },
        };

        let state = match invoice {
            Some(invoice) => invoice_state(&invoice),
            None => CheckoutState::Pending,
        };

        Ok(CheckoutDecision::new(state, Some(invoice_id)))
    }

    async fn subscription_for(&self, session: &StripeCheckoutSession) -> Option<StripeSubscription> {
        match session.subscription.as_ref()? {
            Expandable::Object(subscription) => Some((**subscription).clone()),
            Expandable::Id(id) => match self.processor.retrieve_subscription(id).await {
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    warn!(error = %e, subscription_id = %id, "Subscription lookup failed during checkout check");
                    None
                }
            },
        }
    }
}

fn decide_payment(session: &StripeCheckoutSession) -> CheckoutDecision {
    let state = match session.payment_status.as_deref() {
        Some("paid") => CheckoutState::Paid,
        Some("unpaid") => CheckoutState::Failed,
        _ => CheckoutState::Pending,
    };
    CheckoutDecision::new(state, session.invoice_id().map(str::to_string))
}

fn invoice_state(invoice: &StripeInvoice) -> CheckoutState {
    let pi_status = invoice.payment_intent_status();

    if invoice.status.as_deref() == Some("paid") || pi_status == Some("succeeded") {
        CheckoutState::Paid
    } else if pi_status.is_some_and(|s| IN_PROGRESS_PAYMENT_INTENT_STATUSES.contains(&s)) {
        CheckoutState::Pending
    } else {
        CheckoutState::Failed
    }
}
