use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::stripe_objects::{
    Metadata, StripeBillingPortalSession, StripeCheckoutSession, StripeCustomer, StripeInvoice,
    StripePrice, StripeSubscription,
};

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single remote lookup. Callers decide whether it is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Stripe request failed: {0}")]
    Transport(String),

    #[error("Failed to decode Stripe response: {0}")]
    Decode(String),
}

pub type LookupResult<T> = Result<T, LookupError>;

// ============================================================================
// Port Types
// ============================================================================

/// Parameters for a subscription-mode hosted checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: String,
    /// Copied onto the created subscription so webhooks can bind it.
    pub subscription_metadata: Metadata,
}

// ============================================================================
// Port
// ============================================================================

/// The remote payment processor, as seen by the reconciliation engine.
///
/// Lookups return the expanded shapes the engine needs: invoices carry their
/// payment intent and checkout sessions carry subscription, latest invoice
/// and payment intent.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn retrieve_subscription(&self, subscription_id: &str)
    -> LookupResult<StripeSubscription>;

    async fn retrieve_invoice(&self, invoice_id: &str) -> LookupResult<StripeInvoice>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> LookupResult<StripeCheckoutSession>;

    /// Returns `Ok(None)` when no active price carries the lookup key.
    async fn find_price_by_lookup_key(&self, lookup_key: &str)
    -> LookupResult<Option<StripePrice>>;

    async fn create_customer(
        &self,
        email: &str,
        metadata: &Metadata,
    ) -> LookupResult<StripeCustomer>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> LookupResult<StripeCheckoutSession>;

    /// Opens the hosted portal where a customer manages payment methods,
    /// invoices and cancellations.
    async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> LookupResult<StripeBillingPortalSession>;
}
