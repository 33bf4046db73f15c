use std::sync::Arc;

use crate::{
    infra::{config::AppConfig, stripe_signature::WebhookVerifier},
    use_cases::{
        billing_ledger::BillingLedger, checkout::CheckoutUseCases,
        checkout_state::CheckoutStateResolver, price_cache::PriceCache,
        webhook::BillingWebhookUseCases,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub webhook_verifier: Arc<WebhookVerifier>,
    pub webhook_use_cases: Arc<BillingWebhookUseCases>,
    pub checkout_state: Arc<CheckoutStateResolver>,
    pub checkout_use_cases: Arc<CheckoutUseCases>,
    pub price_cache: Arc<PriceCache>,
    pub ledger: Arc<BillingLedger>,
}
