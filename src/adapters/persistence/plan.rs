use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::plan_catalog::{PlanRepoTrait, PlanSeed, SEED_CURRENCY, VpsPlanProfile},
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> VpsPlanProfile {
    VpsPlanProfile {
        id: row.get("id"),
        plan_code: row.get("plan_code"),
        name: row.get("name"),
        vcpu: row.get("vcpu"),
        ram_gb: row.get("ram_gb"),
        storage_gb: row.get("storage_gb"),
        bandwidth_tb: row.get("bandwidth_tb"),
        description: row.get("description"),
        currency: row.get("currency"),
        monthly_price_cents: row.get("monthly_price_cents"),
        yearly_price_cents: row.get("yearly_price_cents"),
        stripe_lookup_key_monthly: row.get("stripe_lookup_key_monthly"),
        stripe_lookup_key_yearly: row.get("stripe_lookup_key_yearly"),
        is_active: row.get("is_active"),
    }
}

const SELECT_COLS: &str = r#"
    id, plan_code, name, vcpu, ram_gb, storage_gb, bandwidth_tb, description, currency,
    monthly_price_cents, yearly_price_cents, stripe_lookup_key_monthly,
    stripe_lookup_key_yearly, is_active
"#;

#[async_trait]
impl PlanRepoTrait for PostgresPersistence {
    async fn list_active(&self) -> AppResult<Vec<VpsPlanProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM vps_plans WHERE is_active = TRUE ORDER BY monthly_price_cents, plan_code",
            SELECT_COLS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_profile).collect())
    }

    async fn get_active_by_code(&self, plan_code: &str) -> AppResult<Option<VpsPlanProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM vps_plans WHERE plan_code = $1 AND is_active = TRUE",
            SELECT_COLS
        ))
        .bind(plan_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn upsert_seed(&self, seed: &PlanSeed) -> AppResult<VpsPlanProfile> {
        // Lookup keys are left alone so operator overrides survive reseeding.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO vps_plans (
                id, plan_code, name, vcpu, ram_gb, storage_gb, bandwidth_tb, description,
                currency, monthly_price_cents, yearly_price_cents, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, TRUE)
            ON CONFLICT (plan_code) DO UPDATE SET
                name = EXCLUDED.name,
                vcpu = EXCLUDED.vcpu,
                ram_gb = EXCLUDED.ram_gb,
                storage_gb = EXCLUDED.storage_gb,
                bandwidth_tb = EXCLUDED.bandwidth_tb,
                description = EXCLUDED.description,
                currency = EXCLUDED.currency,
                monthly_price_cents = EXCLUDED.monthly_price_cents,
                yearly_price_cents = EXCLUDED.yearly_price_cents,
                is_active = TRUE,
                updated_at = CURRENT_TIMESTAMP
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(seed.plan_code)
        .bind(seed.name)
        .bind(seed.vcpu)
        .bind(seed.ram_gb)
        .bind(seed.storage_gb)
        .bind(seed.bandwidth_tb)
        .bind(seed.description())
        .bind(SEED_CURRENCY)
        .bind(seed.monthly_price_cents)
        .bind(seed.yearly_price_cents)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_profile(&row))
    }
}
