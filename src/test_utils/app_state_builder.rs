//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` wires the real use cases against in-memory
//! repositories and a scripted payment processor. Repositories are created
//! up front so tests can keep a handle on them and inspect state after
//! requests.

use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::ports::clock::SystemClock,
    application::use_cases::{
        billing_ledger::BillingRecordProfile, plan_catalog::VpsPlanProfile,
        price_cache::DEFAULT_PRICE_CACHE_TTL_SECS, user_binding::UserProfile,
    },
    infra::{
        config::{AppConfig, AppEnvironment, LogFormat},
        setup::{BillingRepos, build_app_state},
        stripe_signature::DEFAULT_SIGNATURE_TOLERANCE_SECS,
    },
    test_utils::{
        FakePaymentProcessor, InMemoryBillingRecordRepo, InMemoryEventLogRepo, InMemoryPlanRepo,
        InMemoryUserRepo, InMemoryVpsSubscriptionRepo,
    },
};

pub struct TestAppStateBuilder {
    users: Arc<InMemoryUserRepo>,
    plans: Arc<InMemoryPlanRepo>,
    subscriptions: Arc<InMemoryVpsSubscriptionRepo>,
    records: Arc<InMemoryBillingRecordRepo>,
    events: Arc<InMemoryEventLogRepo>,
    processor: Arc<FakePaymentProcessor>,
    app_env: AppEnvironment,
    webhook_secret: Option<String>,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    /// Development environment, no webhook secret.
    pub fn new() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepo::default()),
            plans: Arc::new(InMemoryPlanRepo::default()),
            subscriptions: Arc::new(InMemoryVpsSubscriptionRepo::default()),
            records: Arc::new(InMemoryBillingRecordRepo::default()),
            events: Arc::new(InMemoryEventLogRepo::default()),
            processor: Arc::new(FakePaymentProcessor::default()),
            app_env: AppEnvironment::Development,
            webhook_secret: None,
        }
    }

    pub fn with_webhook_secret(mut self, secret: &str) -> Self {
        self.webhook_secret = Some(secret.to_string());
        self
    }

    pub fn with_app_env(mut self, app_env: AppEnvironment) -> Self {
        self.app_env = app_env;
        self
    }

    pub fn with_user(self, user: UserProfile) -> Self {
        self.users.insert(user);
        self
    }

    pub fn with_plan(self, plan: VpsPlanProfile) -> Self {
        self.plans.insert(plan);
        self
    }

    pub fn with_billing_record(self, record: BillingRecordProfile) -> Self {
        self.records.insert(record);
        self
    }

    pub fn processor(&self) -> Arc<FakePaymentProcessor> {
        self.processor.clone()
    }

    pub fn event_log_repo(&self) -> Arc<InMemoryEventLogRepo> {
        self.events.clone()
    }

    pub fn subscription_repo(&self) -> Arc<InMemoryVpsSubscriptionRepo> {
        self.subscriptions.clone()
    }

    pub fn billing_record_repo(&self) -> Arc<InMemoryBillingRecordRepo> {
        self.records.clone()
    }

    pub fn build(self) -> AppState {
        let config = AppConfig {
            app_env: self.app_env,
            debug: false,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "postgres://unused".to_string(),
            stripe_secret_key: SecretString::new("sk_test_unused".into()),
            stripe_webhook_secret: self.webhook_secret.map(|s| SecretString::new(s.into())),
            stripe_webhook_tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
            price_cache_ttl_secs: DEFAULT_PRICE_CACHE_TTL_SECS,
            public_base_url: Url::parse("http://localhost:3001").unwrap(),
            seed_vps_plans: false,
            log_format: LogFormat::Pretty,
        };

        let repos = BillingRepos {
            users: self.users,
            plans: self.plans,
            subscriptions: self.subscriptions,
            records: self.records,
            events: self.events,
        };

        // Signatures in tests are produced against the wall clock.
        build_app_state(config, repos, self.processor, Arc::new(SystemClock))
    }
}
