use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing_ledger::{
        BillingRecordProfile, BillingRecordRepoTrait, BillingRecordUpsert,
    },
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> BillingRecordProfile {
    BillingRecordProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        stripe_customer_id: row.get("stripe_customer_id"),
        kind: row.get("kind"),
        stripe_id: row.get("stripe_id"),
        stripe_invoice_id: row.get("stripe_invoice_id"),
        stripe_subscription_id: row.get("stripe_subscription_id"),
        stripe_payment_intent_id: row.get("stripe_payment_intent_id"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        status: row.get("status"),
        livemode: row.get("livemode"),
        description: row.get("description"),
        hosted_invoice_url: row.get("hosted_invoice_url"),
        invoice_pdf_url: row.get("invoice_pdf_url"),
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        raw: row.get("raw"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, stripe_customer_id, kind, stripe_id, stripe_invoice_id,
    stripe_subscription_id, stripe_payment_intent_id, amount_cents, currency, status,
    livemode, description, hosted_invoice_url, invoice_pdf_url, period_start, period_end,
    raw, created_at, updated_at
"#;

#[async_trait]
impl BillingRecordRepoTrait for PostgresPersistence {
    async fn upsert(&self, record: &BillingRecordUpsert) -> AppResult<BillingRecordProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO billing_records (
                id, user_id, stripe_customer_id, kind, stripe_id, stripe_invoice_id,
                stripe_subscription_id, stripe_payment_intent_id, amount_cents, currency,
                status, livemode, description, hosted_invoice_url, invoice_pdf_url,
                period_start, period_end, raw, created_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                COALESCE($19, CURRENT_TIMESTAMP)
            )
            ON CONFLICT (stripe_id) DO UPDATE SET
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, billing_records.stripe_customer_id),
                stripe_invoice_id = COALESCE(EXCLUDED.stripe_invoice_id, billing_records.stripe_invoice_id),
                stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id, billing_records.stripe_subscription_id),
                stripe_payment_intent_id = COALESCE(EXCLUDED.stripe_payment_intent_id, billing_records.stripe_payment_intent_id),
                amount_cents = COALESCE(EXCLUDED.amount_cents, billing_records.amount_cents),
                currency = COALESCE(EXCLUDED.currency, billing_records.currency),
                status = COALESCE(EXCLUDED.status, billing_records.status),
                livemode = EXCLUDED.livemode,
                description = COALESCE(EXCLUDED.description, billing_records.description),
                hosted_invoice_url = COALESCE(EXCLUDED.hosted_invoice_url, billing_records.hosted_invoice_url),
                invoice_pdf_url = COALESCE(EXCLUDED.invoice_pdf_url, billing_records.invoice_pdf_url),
                period_start = COALESCE(EXCLUDED.period_start, billing_records.period_start),
                period_end = COALESCE(EXCLUDED.period_end, billing_records.period_end),
                raw = EXCLUDED.raw,
                created_at = COALESCE($19, billing_records.created_at),
                updated_at = CURRENT_TIMESTAMP
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(&record.stripe_customer_id)
        .bind(record.kind)
        .bind(&record.stripe_id)
        .bind(&record.stripe_invoice_id)
        .bind(&record.stripe_subscription_id)
        .bind(&record.stripe_payment_intent_id)
        .bind(record.amount_cents)
        .bind(&record.currency)
        .bind(&record.status)
        .bind(record.livemode)
        .bind(&record.description)
        .bind(&record.hosted_invoice_url)
        .bind(&record.invoice_pdf_url)
        .bind(record.period_start)
        .bind(record.period_end)
        .bind(&record.raw)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_profile(&row))
    }

    async fn get_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<BillingRecordProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM billing_records WHERE stripe_id = $1",
            SELECT_COLS
        ))
        .bind(stripe_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        livemode: Option<bool>,
    ) -> AppResult<Vec<BillingRecordProfile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM billing_records
            WHERE user_id = $1 AND ($2::BOOLEAN IS NULL OR livemode = $2)
            ORDER BY created_at DESC, id
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(livemode)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_profile).collect())
    }
}
