use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription_sync::{
        SubscriptionSnapshot, VpsSubscriptionProfile, VpsSubscriptionRepoTrait,
    },
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> VpsSubscriptionProfile {
    VpsSubscriptionProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        stripe_customer_id: row.get("stripe_customer_id"),
        stripe_subscription_id: row.get("stripe_subscription_id"),
        stripe_price_id: row.get("stripe_price_id"),
        interval: row.get("interval"),
        currency: row.get("currency"),
        unit_amount: row.get("unit_amount"),
        status: row.get("status"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        billing_cycle_anchor: row.get("billing_cycle_anchor"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        canceled_at: row.get("canceled_at"),
        ended_at: row.get("ended_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, plan_id, stripe_customer_id, stripe_subscription_id, stripe_price_id,
    interval, currency, unit_amount, status, cancel_at_period_end, billing_cycle_anchor,
    current_period_start, current_period_end, canceled_at, ended_at, created_at, updated_at
"#;

#[async_trait]
impl VpsSubscriptionRepoTrait for PostgresPersistence {
    async fn upsert(&self, snapshot: &SubscriptionSnapshot) -> AppResult<VpsSubscriptionProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO vps_subscriptions (
                id, user_id, plan_id, stripe_customer_id, stripe_subscription_id,
                stripe_price_id, interval, currency, unit_amount, status,
                cancel_at_period_end, billing_cycle_anchor, current_period_start,
                current_period_end, canceled_at, ended_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                user_id = COALESCE(vps_subscriptions.user_id, EXCLUDED.user_id),
                plan_id = COALESCE(vps_subscriptions.plan_id, EXCLUDED.plan_id),
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_price_id = EXCLUDED.stripe_price_id,
                interval = EXCLUDED.interval,
                currency = EXCLUDED.currency,
                unit_amount = EXCLUDED.unit_amount,
                status = EXCLUDED.status,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                billing_cycle_anchor = COALESCE(EXCLUDED.billing_cycle_anchor, vps_subscriptions.billing_cycle_anchor),
                current_period_start = COALESCE(EXCLUDED.current_period_start, vps_subscriptions.current_period_start),
                current_period_end = COALESCE(EXCLUDED.current_period_end, vps_subscriptions.current_period_end),
                canceled_at = EXCLUDED.canceled_at,
                ended_at = EXCLUDED.ended_at,
                updated_at = CURRENT_TIMESTAMP
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(snapshot.user_id)
        .bind(snapshot.plan_id)
        .bind(&snapshot.stripe_customer_id)
        .bind(&snapshot.stripe_subscription_id)
        .bind(&snapshot.stripe_price_id)
        .bind(snapshot.interval)
        .bind(&snapshot.currency)
        .bind(snapshot.unit_amount)
        .bind(snapshot.status)
        .bind(snapshot.cancel_at_period_end)
        .bind(snapshot.billing_cycle_anchor)
        .bind(snapshot.current_period_start)
        .bind(snapshot.current_period_end)
        .bind(snapshot.canceled_at)
        .bind(snapshot.ended_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_profile(&row))
    }

    async fn get_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<VpsSubscriptionProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM vps_subscriptions WHERE stripe_subscription_id = $1",
            SELECT_COLS
        ))
        .bind(stripe_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }
}
