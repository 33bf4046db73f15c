use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::domain::entities::stripe_objects::Metadata;

/// Metadata key carrying the local user id, set at checkout time.
pub const METADATA_USER_ID: &str = "user_id";

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub stripe_customer_id: Option<String>,
}

#[async_trait]
pub trait UserRepoTrait: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>>;

    async fn get_by_stripe_customer_id(&self, customer_id: &str) -> AppResult<Option<UserProfile>>;

    /// Store the customer id on a user that has none yet. Returns false
    /// when the user already carries a customer id.
    async fn bind_stripe_customer_id(&self, user_id: Uuid, customer_id: &str) -> AppResult<bool>;
}

/// Maps Stripe customers to panel users, binding on first sight.
#[derive(Clone)]
pub struct UserBindingResolver {
    users: Arc<dyn UserRepoTrait>,
}

impl UserBindingResolver {
    pub fn new(users: Arc<dyn UserRepoTrait>) -> Self {
        Self { users }
    }

    /// Resolve the owner of a Stripe object.
    ///
    /// Tries the stored customer binding first, then `metadata.user_id`, then
    /// the caller's fallback reference (a checkout's `client_reference_id`).
    /// Returns `None` when nothing identifies a known user.
    #[instrument(skip(self, metadata))]
    pub async fn resolve(
        &self,
        customer_id: Option<&str>,
        fallback_reference: Option<&str>,
        metadata: &Metadata,
    ) -> AppResult<Option<UserProfile>> {
        if let Some(customer_id) = customer_id {
            if let Some(user) = self.users.get_by_stripe_customer_id(customer_id).await? {
                return Ok(Some(user));
            }
        }

        let candidates = [
            metadata.get(METADATA_USER_ID).map(String::as_str),
            fallback_reference,
        ];

        for reference in candidates.into_iter().flatten() {
            let Ok(user_id) = Uuid::parse_str(reference.trim()) else {
                debug!(reference, "Ignoring non-uuid user reference");
                continue;
            };

            let Some(user) = self.users.get_by_id(user_id).await? else {
                continue;
            };

            return match customer_id {
                Some(customer_id) => self.bind(user, customer_id).await.map(Some),
                None => Ok(Some(user)),
            };
        }

        Ok(None)
    }

    async fn bind(&self, mut user: UserProfile, customer_id: &str) -> AppResult<UserProfile> {
        match user.stripe_customer_id.as_deref() {
            None => {
                if self.users.bind_stripe_customer_id(user.id, customer_id).await? {
                    info!(user_id = %user.id, customer_id, "Bound Stripe customer to user");
                    user.stripe_customer_id = Some(customer_id.to_string());
                }
            }
            Some(existing) if existing != customer_id => {
                warn!(
                    user_id = %user.id,
                    existing_customer_id = existing,
                    customer_id,
                    "User already bound to a different Stripe customer, keeping existing binding"
                );
            }
            Some(_) => {}
        }
        Ok(user)
    }
}
