use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::app_error::{AppError, AppResult};
use crate::application::ports::payment_processor::PaymentProcessor;
use crate::application::use_cases::{
    billing_ledger::BillingLedger, event_log::EventLog,
    subscription_sync::SubscriptionSynchronizer,
};
use crate::domain::entities::{
    stripe_event::{BillingEvent, StripeEvent, SubscriptionChange},
    stripe_objects::{Expandable, StripeCheckoutSession, StripeSubscription},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Handlers ran and the event is now marked processed.
    Processed,
    /// The event was already processed by an earlier delivery.
    AlreadyProcessed,
}

/// Orchestrates one verified Stripe event: log, dispatch, mark processed.
#[derive(Clone)]
pub struct BillingWebhookUseCases {
    event_log: EventLog,
    synchronizer: SubscriptionSynchronizer,
    ledger: BillingLedger,
    processor: Arc<dyn PaymentProcessor>,
}

impl BillingWebhookUseCases {
    pub fn new(
        event_log: EventLog,
        synchronizer: SubscriptionSynchronizer,
        ledger: BillingLedger,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            event_log,
            synchronizer,
            ledger,
            processor,
        }
    }

    /// Process a decoded event.
    ///
    /// The log row is committed before any handler runs. If a handler fails
    /// the row stays unprocessed and the error is returned, so Stripe's
    /// redelivery re-runs the (idempotent) handlers.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle(
        &self,
        event: &StripeEvent,
        signature_valid: bool,
    ) -> AppResult<WebhookOutcome> {
        let (entry, is_new) = self.event_log.record(event, signature_valid).await?;

        if entry.processed {
            info!("Stripe event already processed, skipping");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }
        if !is_new {
            info!("Retrying previously unfinished Stripe event");
        }

        self.dispatch(event).await?;

        stage(event, "mark_processed", self.event_log.mark_processed(&event.id)).await?;

        Ok(WebhookOutcome::Processed)
    }

    async fn dispatch(&self, event: &StripeEvent) -> AppResult<()> {
        match &event.kind {
            BillingEvent::CheckoutCompleted(session) => {
                self.on_checkout_completed(event, session).await
            }
            BillingEvent::Subscription {
                change,
                subscription,
            } => self.on_subscription(event, *change, subscription).await,
            BillingEvent::Invoice(invoice) => {
                let record = stage(event, "ledger.invoice", self.ledger.upsert_invoice(invoice)).await?;
                if record.is_none() {
                    info!(invoice_id = %invoice.id, "Invoice has no local owner, nothing recorded");
                }
                Ok(())
            }
            BillingEvent::PaymentFailed { invoice_id } => {
                info!(invoice_id = ?invoice_id, "Invoice payment failed, acknowledged");
                Ok(())
            }
            BillingEvent::SubscriptionPaused { subscription_id } => {
                info!(subscription_id = ?subscription_id, "Subscription paused, acknowledged");
                Ok(())
            }
            BillingEvent::Unrecognized => {
                debug!("Unhandled Stripe event type, acknowledging");
                Ok(())
            }
        }
    }

    async fn on_checkout_completed(
        &self,
        event: &StripeEvent,
        session: &StripeCheckoutSession,
    ) -> AppResult<()> {
        stage(
            event,
            "ledger.checkout_session",
            self.ledger.upsert_checkout_session(session),
        )
        .await?;

        let Some(subscription_ref) = session.subscription.as_ref() else {
            return Ok(());
        };

        let subscription = match subscription_ref {
            Expandable::Object(subscription) if subscription.has_items() => {
                (**subscription).clone()
            }
            other => self.fetch_subscription(event, other.id()).await?,
        };

        self.sync_subscription(event, &subscription).await
    }

    async fn on_subscription(
        &self,
        event: &StripeEvent,
        change: SubscriptionChange,
        subscription: &StripeSubscription,
    ) -> AppResult<()> {
        let fetched;
        let subscription = if subscription.has_items() {
            subscription
        } else {
            fetched = self.fetch_subscription(event, &subscription.id).await?;
            &fetched
        };

        self.sync_subscription(event, subscription).await?;

        if change == SubscriptionChange::Deleted {
            info!(subscription_id = %subscription.id, "Subscription ended, terminal status recorded");
        }
        Ok(())
    }

    async fn sync_subscription(
        &self,
        event: &StripeEvent,
        subscription: &StripeSubscription,
    ) -> AppResult<()> {
        let synced = stage(event, "subscription_sync", self.synchronizer.upsert(subscription)).await?;
        if synced.is_none() {
            info!(subscription_id = %subscription.id, "Subscription left unsynchronized");
        }
        stage(
            event,
            "ledger.subscription",
            self.ledger.upsert_subscription(subscription),
        )
        .await?;
        Ok(())
    }

    async fn fetch_subscription(
        &self,
        event: &StripeEvent,
        subscription_id: &str,
    ) -> AppResult<StripeSubscription> {
        stage(event, "stripe.retrieve_subscription", async {
            self.processor
                .retrieve_subscription(subscription_id)
                .await
                .map_err(AppError::from)
        })
        .await
    }
}

/// Await one handler step, logging the event context if it fails.
async fn stage<T>(
    event: &StripeEvent,
    stage: &'static str,
    step: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    step.await.inspect_err(|e| {
        error!(
            error = %e,
            event_id = %event.id,
            event_type = %event.event_type,
            stage,
            "Webhook handler failed, leaving event unprocessed for retry"
        );
    })
}
