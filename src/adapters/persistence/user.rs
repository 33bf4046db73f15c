use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::user_binding::{UserProfile, UserRepoTrait},
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        email: row.get("email"),
        stripe_customer_id: row.get("stripe_customer_id"),
    }
}

#[async_trait]
impl UserRepoTrait for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, email, stripe_customer_id FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn get_by_stripe_customer_id(&self, customer_id: &str) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT id, email, stripe_customer_id FROM users WHERE stripe_customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn bind_stripe_customer_id(&self, user_id: Uuid, customer_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET stripe_customer_id = $2 WHERE id = $1 AND stripe_customer_id IS NULL",
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }
}
