//! In-memory implementations of the repository traits.
//!
//! Upserts mirror the column rules of the Postgres adapters so use-case
//! tests exercise the same merge behaviour.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::use_cases::{
        billing_ledger::{BillingRecordProfile, BillingRecordRepoTrait, BillingRecordUpsert},
        event_log::{EventLogEntry, EventLogRepoTrait},
        plan_catalog::{PlanRepoTrait, PlanSeed, SEED_CURRENCY, VpsPlanProfile},
        subscription_sync::{SubscriptionSnapshot, VpsSubscriptionProfile, VpsSubscriptionRepoTrait},
        user_binding::{UserProfile, UserRepoTrait},
    },
    domain::entities::billing_record::BillingRecordKind,
};

// ============================================================================
// InMemoryUserRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserRepo {
    pub users: Mutex<HashMap<Uuid, UserProfile>>,
}

impl InMemoryUserRepo {
    pub fn with_users(users: Vec<UserProfile>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }

    pub fn insert(&self, user: UserProfile) {
        self.users.lock().unwrap().insert(user.id, user);
    }
}

#[async_trait]
impl UserRepoTrait for InMemoryUserRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_stripe_customer_id(&self, customer_id: &str) -> AppResult<Option<UserProfile>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn bind_stripe_customer_id(&self, user_id: Uuid, customer_id: &str) -> AppResult<bool> {
        let mut users = self.users.lock().unwrap();
        match users.get_mut(&user_id) {
            Some(user) if user.stripe_customer_id.is_none() => {
                user.stripe_customer_id = Some(customer_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// InMemoryPlanRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPlanRepo {
    pub plans: Mutex<HashMap<String, VpsPlanProfile>>,
}

impl InMemoryPlanRepo {
    pub fn with_plans(plans: Vec<VpsPlanProfile>) -> Self {
        Self {
            plans: Mutex::new(plans.into_iter().map(|p| (p.plan_code.clone(), p)).collect()),
        }
    }

    pub fn insert(&self, plan: VpsPlanProfile) {
        self.plans.lock().unwrap().insert(plan.plan_code.clone(), plan);
    }
}

#[async_trait]
impl PlanRepoTrait for InMemoryPlanRepo {
    async fn list_active(&self) -> AppResult<Vec<VpsPlanProfile>> {
        let mut plans: Vec<VpsPlanProfile> = self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| {
            a.monthly_price_cents
                .cmp(&b.monthly_price_cents)
                .then_with(|| a.plan_code.cmp(&b.plan_code))
        });
        Ok(plans)
    }

    async fn get_active_by_code(&self, plan_code: &str) -> AppResult<Option<VpsPlanProfile>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .get(plan_code)
            .filter(|p| p.is_active)
            .cloned())
    }

    async fn upsert_seed(&self, seed: &PlanSeed) -> AppResult<VpsPlanProfile> {
        let mut plans = self.plans.lock().unwrap();
        let existing = plans.get(seed.plan_code);

        let plan = VpsPlanProfile {
            id: existing.map(|p| p.id).unwrap_or_else(Uuid::new_v4),
            plan_code: seed.plan_code.to_string(),
            name: seed.name.to_string(),
            vcpu: seed.vcpu,
            ram_gb: seed.ram_gb,
            storage_gb: seed.storage_gb,
            bandwidth_tb: seed.bandwidth_tb,
            description: Some(seed.description()),
            currency: SEED_CURRENCY.to_string(),
            monthly_price_cents: seed.monthly_price_cents,
            yearly_price_cents: seed.yearly_price_cents,
            stripe_lookup_key_monthly: existing.and_then(|p| p.stripe_lookup_key_monthly.clone()),
            stripe_lookup_key_yearly: existing.and_then(|p| p.stripe_lookup_key_yearly.clone()),
            is_active: true,
        };

        plans.insert(plan.plan_code.clone(), plan.clone());
        Ok(plan)
    }
}

// ============================================================================
// InMemoryVpsSubscriptionRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryVpsSubscriptionRepo {
    pub subscriptions: Mutex<HashMap<String, VpsSubscriptionProfile>>,
}

impl InMemoryVpsSubscriptionRepo {
    pub fn count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

#[async_trait]
impl VpsSubscriptionRepoTrait for InMemoryVpsSubscriptionRepo {
    async fn upsert(&self, snapshot: &SubscriptionSnapshot) -> AppResult<VpsSubscriptionProfile> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let now = Utc::now().naive_utc();
        let existing = subscriptions.get(&snapshot.stripe_subscription_id);

        let profile = VpsSubscriptionProfile {
            id: existing.map(|s| s.id).unwrap_or_else(Uuid::new_v4),
            user_id: existing.and_then(|s| s.user_id).or(snapshot.user_id),
            plan_id: existing.and_then(|s| s.plan_id).or(snapshot.plan_id),
            stripe_customer_id: snapshot.stripe_customer_id.clone(),
            stripe_subscription_id: snapshot.stripe_subscription_id.clone(),
            stripe_price_id: snapshot.stripe_price_id.clone(),
            interval: snapshot.interval,
            currency: snapshot.currency.clone(),
            unit_amount: snapshot.unit_amount,
            status: snapshot.status,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            billing_cycle_anchor: snapshot
                .billing_cycle_anchor
                .or(existing.and_then(|s| s.billing_cycle_anchor)),
            current_period_start: snapshot
                .current_period_start
                .or(existing.and_then(|s| s.current_period_start)),
            current_period_end: snapshot
                .current_period_end
                .or(existing.and_then(|s| s.current_period_end)),
            canceled_at: snapshot.canceled_at,
            ended_at: snapshot.ended_at,
            created_at: existing.map(|s| s.created_at).unwrap_or(now),
            updated_at: now,
        };

        subscriptions.insert(profile.stripe_subscription_id.clone(), profile.clone());
        Ok(profile)
    }

    async fn get_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<VpsSubscriptionProfile>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(stripe_subscription_id)
            .cloned())
    }
}

// ============================================================================
// InMemoryBillingRecordRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryBillingRecordRepo {
    pub records: Mutex<HashMap<String, BillingRecordProfile>>,
}

impl InMemoryBillingRecordRepo {
    pub fn with_records(records: Vec<BillingRecordProfile>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|r| (r.stripe_id.clone(), r)).collect()),
        }
    }

    pub fn insert(&self, record: BillingRecordProfile) {
        self.records
            .lock()
            .unwrap()
            .insert(record.stripe_id.clone(), record);
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn count_kind(&self, kind: BillingRecordKind) -> usize {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.kind == kind)
            .count()
    }
}

#[async_trait]
impl BillingRecordRepoTrait for InMemoryBillingRecordRepo {
    async fn upsert(&self, record: &BillingRecordUpsert) -> AppResult<BillingRecordProfile> {
        let mut records = self.records.lock().unwrap();
        let now = Utc::now().naive_utc();
        let existing = records.get(&record.stripe_id);

        // Present values win, absent ones keep what is stored.
        fn merge<T: Clone>(new: &Option<T>, old: Option<&Option<T>>) -> Option<T> {
            new.clone().or_else(|| old.and_then(|o| o.clone()))
        }

        let profile = BillingRecordProfile {
            id: existing.map(|r| r.id).unwrap_or_else(Uuid::new_v4),
            user_id: existing.map(|r| r.user_id).unwrap_or(record.user_id),
            stripe_customer_id: merge(
                &record.stripe_customer_id,
                existing.map(|r| &r.stripe_customer_id),
            ),
            kind: existing.map(|r| r.kind).unwrap_or(record.kind),
            stripe_id: record.stripe_id.clone(),
            stripe_invoice_id: merge(
                &record.stripe_invoice_id,
                existing.map(|r| &r.stripe_invoice_id),
            ),
            stripe_subscription_id: merge(
                &record.stripe_subscription_id,
                existing.map(|r| &r.stripe_subscription_id),
            ),
            stripe_payment_intent_id: merge(
                &record.stripe_payment_intent_id,
                existing.map(|r| &r.stripe_payment_intent_id),
            ),
            amount_cents: merge(&record.amount_cents, existing.map(|r| &r.amount_cents)),
            currency: merge(&record.currency, existing.map(|r| &r.currency)),
            status: merge(&record.status, existing.map(|r| &r.status)),
            livemode: record.livemode,
            description: merge(&record.description, existing.map(|r| &r.description)),
            hosted_invoice_url: merge(
                &record.hosted_invoice_url,
                existing.map(|r| &r.hosted_invoice_url),
            ),
            invoice_pdf_url: merge(&record.invoice_pdf_url, existing.map(|r| &r.invoice_pdf_url)),
            period_start: merge(&record.period_start, existing.map(|r| &r.period_start)),
            period_end: merge(&record.period_end, existing.map(|r| &r.period_end)),
            raw: record.raw.clone(),
            created_at: record
                .created_at
                .or(existing.map(|r| r.created_at))
                .unwrap_or(now),
            updated_at: now,
        };

        records.insert(profile.stripe_id.clone(), profile.clone());
        Ok(profile)
    }

    async fn get_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<BillingRecordProfile>> {
        Ok(self.records.lock().unwrap().get(stripe_id).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        livemode: Option<bool>,
    ) -> AppResult<Vec<BillingRecordProfile>> {
        let mut rows: Vec<BillingRecordProfile> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| livemode.is_none_or(|mode| r.livemode == mode))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }
}

// ============================================================================
// InMemoryEventLogRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryEventLogRepo {
    pub entries: Mutex<HashMap<String, EventLogEntry>>,
}

impl InMemoryEventLogRepo {
    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn processed_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.processed)
            .count()
    }
}

#[async_trait]
impl EventLogRepoTrait for InMemoryEventLogRepo {
    async fn insert_if_absent(
        &self,
        event_id: &str,
        event_type: &str,
        payload: &JsonValue,
        signature_valid: bool,
    ) -> AppResult<(EventLogEntry, bool)> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(event_id) {
            return Ok((existing.clone(), false));
        }

        let entry = EventLogEntry {
            id: Uuid::new_v4(),
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
            signature_valid,
            processed: false,
            created_at: Utc::now().naive_utc(),
            processed_at: None,
        };
        entries.insert(event_id.to_string(), entry.clone());
        Ok((entry, true))
    }

    async fn mark_processed(&self, event_id: &str) -> AppResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(event_id) {
            Some(entry) if !entry.processed => {
                entry.processed = true;
                entry.processed_at = Some(Utc::now().naive_utc());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_by_event_id(&self, event_id: &str) -> AppResult<Option<EventLogEntry>> {
        Ok(self.entries.lock().unwrap().get(event_id).cloned())
    }
}
