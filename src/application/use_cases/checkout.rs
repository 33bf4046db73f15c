use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::ports::payment_processor::{CheckoutRequest, PaymentProcessor};
use crate::application::use_cases::{
    plan_catalog::PlanRepoTrait,
    price_cache::PriceCache,
    subscription_sync::{METADATA_INTERVAL, METADATA_PLAN_CODE},
    user_binding::{METADATA_USER_ID, UserProfile, UserRepoTrait},
};
use crate::domain::entities::{billing_interval::BillingInterval, stripe_objects::Metadata};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutStarted {
    pub session_id: String,
    pub checkout_url: String,
}

/// Starts hosted Stripe checkouts for VPS plans.
#[derive(Clone)]
pub struct CheckoutUseCases {
    plans: Arc<dyn PlanRepoTrait>,
    users: Arc<dyn UserRepoTrait>,
    prices: Arc<PriceCache>,
    processor: Arc<dyn PaymentProcessor>,
    public_base_url: String,
}

impl CheckoutUseCases {
    pub fn new(
        plans: Arc<dyn PlanRepoTrait>,
        users: Arc<dyn UserRepoTrait>,
        prices: Arc<PriceCache>,
        processor: Arc<dyn PaymentProcessor>,
        public_base_url: &str,
    ) -> Self {
        Self {
            plans,
            users,
            prices,
            processor,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self))]
    pub async fn start_checkout(
        &self,
        user_id: Uuid,
        plan_code: &str,
        interval: &str,
    ) -> AppResult<CheckoutStarted> {
        let interval = BillingInterval::parse_exact(interval)
            .ok_or_else(|| AppError::InvalidInput("Interval must be month or year".into()))?;

        let plan = self
            .plans
            .get_active_by_code(plan_code)
            .await?
            .ok_or(AppError::NotFound)?;

        let price_id = self
            .prices
            .get_price_id(&plan.plan_code, interval)
            .await?
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Plan {} has no {} price configured",
                    plan.plan_code,
                    interval.lookup_key_suffix()
                ))
            })?;

        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        let customer_id = self.ensure_customer(user).await?;

        let request = CheckoutRequest {
            customer_id,
            price_id,
            success_url: format!(
                "{}/vps/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.public_base_url
            ),
            cancel_url: format!("{}/vps/cancel", self.public_base_url),
            client_reference_id: user_id.to_string(),
            subscription_metadata: Metadata::from([
                (METADATA_USER_ID.to_string(), user_id.to_string()),
                (METADATA_PLAN_CODE.to_string(), plan.plan_code.clone()),
                (METADATA_INTERVAL.to_string(), interval.as_str().to_string()),
            ]),
        };

        let session = self.processor.create_checkout_session(&request).await?;
        let checkout_url = session.url.ok_or_else(|| {
            AppError::Internal(format!("Checkout session {} has no url", session.id))
        })?;

        info!(session_id = %session.id, "Created VPS checkout session");

        Ok(CheckoutStarted {
            session_id: session.id,
            checkout_url,
        })
    }

    /// A Stripe billing portal URL for the user, returning to the order list.
    #[instrument(skip(self))]
    pub async fn open_billing_portal(&self, user_id: Uuid) -> AppResult<String> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        let customer_id = self.ensure_customer(user).await?;

        let return_url = format!("{}/vps/orders", self.public_base_url);
        let session = self
            .processor
            .create_billing_portal_session(&customer_id, &return_url)
            .await?;

        info!(session_id = %session.id, customer_id = %customer_id, "Opened billing portal");
        Ok(session.url)
    }

    /// The user's Stripe customer id, creating and binding one if absent.
    async fn ensure_customer(&self, user: UserProfile) -> AppResult<String> {
        if let Some(existing) = user.stripe_customer_id {
            return Ok(existing);
        }

        let metadata = Metadata::from([(METADATA_USER_ID.to_string(), user.id.to_string())]);
        let customer = self.processor.create_customer(&user.email, &metadata).await?;

        if self
            .users
            .bind_stripe_customer_id(user.id, &customer.id)
            .await?
        {
            info!(user_id = %user.id, customer_id = %customer.id, "Created Stripe customer");
            return Ok(customer.id);
        }

        // Lost a race with a concurrent checkout; use the winner's binding.
        self.users
            .get_by_id(user.id)
            .await?
            .and_then(|u| u.stripe_customer_id)
            .ok_or_else(|| AppError::Internal("Stripe customer binding vanished".into()))
    }
}
