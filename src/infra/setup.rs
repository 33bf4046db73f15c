use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::http::app_state::AppState,
    application::ports::{clock::Clock, clock::SystemClock, payment_processor::PaymentProcessor},
    infra::{
        config::{AppConfig, LogFormat},
        error::InfraError,
        postgres_persistence,
        stripe_client::StripeClient,
        stripe_signature::WebhookVerifier,
    },
    use_cases::{
        billing_ledger::{BillingLedger, BillingRecordRepoTrait},
        checkout::CheckoutUseCases,
        checkout_state::CheckoutStateResolver,
        event_log::{EventLog, EventLogRepoTrait},
        plan_catalog::{PlanCatalog, PlanRepoTrait},
        price_cache::PriceCache,
        subscription_sync::{SubscriptionSynchronizer, VpsSubscriptionRepoTrait},
        user_binding::{UserBindingResolver, UserRepoTrait},
        webhook::BillingWebhookUseCases,
    },
};

/// Repositories the billing services are wired against.
pub struct BillingRepos {
    pub users: Arc<dyn UserRepoTrait>,
    pub plans: Arc<dyn PlanRepoTrait>,
    pub subscriptions: Arc<dyn VpsSubscriptionRepoTrait>,
    pub records: Arc<dyn BillingRecordRepoTrait>,
    pub events: Arc<dyn EventLogRepoTrait>,
}

pub async fn init_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    config.validate()?;

    if config.stripe_webhook_secret.is_none() {
        error!("STRIPE_WEBHOOK_SECRET is not set: webhook signatures will NOT be verified");
    }

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    let repos = BillingRepos {
        users: postgres_arc.clone(),
        plans: postgres_arc.clone(),
        subscriptions: postgres_arc.clone(),
        records: postgres_arc.clone(),
        events: postgres_arc,
    };

    if config.seed_vps_plans {
        let seeded = PlanCatalog::new(repos.plans.clone())
            .seed_default_plans()
            .await
            .map_err(InfraError::Seed)?;
        info!(plans = seeded, "Seeded VPS plan catalog");
    }

    let processor = Arc::new(StripeClient::new(config.stripe_secret_key.clone()));

    Ok(build_app_state(config, repos, processor, Arc::new(SystemClock)))
}

/// Wire the use cases from their collaborators.
pub fn build_app_state(
    config: AppConfig,
    repos: BillingRepos,
    processor: Arc<dyn PaymentProcessor>,
    clock: Arc<dyn Clock>,
) -> AppState {
    let binding = UserBindingResolver::new(repos.users.clone());

    let ledger = BillingLedger::new(repos.records.clone(), binding.clone(), processor.clone());
    let synchronizer =
        SubscriptionSynchronizer::new(repos.subscriptions, repos.plans.clone(), binding);
    let webhook_use_cases = BillingWebhookUseCases::new(
        EventLog::new(repos.events),
        synchronizer,
        ledger.clone(),
        processor.clone(),
    );

    let price_cache = Arc::new(PriceCache::new(
        repos.plans.clone(),
        processor.clone(),
        clock.clone(),
        chrono::Duration::seconds(config.price_cache_ttl_secs),
    ));
    let checkout_use_cases = CheckoutUseCases::new(
        repos.plans,
        repos.users,
        price_cache.clone(),
        processor.clone(),
        config.public_base_url.as_str(),
    );
    let checkout_state = CheckoutStateResolver::new(processor, repos.records);

    let webhook_verifier = WebhookVerifier::new(
        config.stripe_webhook_secret.clone(),
        config.stripe_webhook_tolerance_secs,
        clock,
    );

    AppState {
        config: Arc::new(config),
        webhook_verifier: Arc::new(webhook_verifier),
        webhook_use_cases: Arc::new(webhook_use_cases),
        checkout_state: Arc::new(checkout_state),
        checkout_use_cases: Arc::new(checkout_use_cases),
        price_cache,
        ledger: Arc::new(ledger),
    }
}

pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vps_billing=debug,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_level(true).pretty())
            .try_init()
            .ok(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .ok(),
    };
}
