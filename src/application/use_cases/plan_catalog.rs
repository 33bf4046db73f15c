use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::domain::entities::billing_interval::BillingInterval;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct VpsPlanProfile {
    pub id: Uuid,
    pub plan_code: String,
    pub name: String,
    pub vcpu: i32,
    pub ram_gb: i32,
    pub storage_gb: i32,
    pub bandwidth_tb: i32,
    pub description: Option<String>,
    pub currency: String,
    pub monthly_price_cents: i64,
    pub yearly_price_cents: i64,
    pub stripe_lookup_key_monthly: Option<String>,
    pub stripe_lookup_key_yearly: Option<String>,
    pub is_active: bool,
}

impl VpsPlanProfile {
    /// Stripe price lookup key for the interval, defaulting to
    /// `<plan_code>_monthly` / `<plan_code>_yearly`.
    pub fn lookup_key(&self, interval: BillingInterval) -> String {
        let configured = match interval {
            BillingInterval::Month => self.stripe_lookup_key_monthly.as_deref(),
            BillingInterval::Year => self.stripe_lookup_key_yearly.as_deref(),
        };
        configured
            .filter(|key| !key.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", self.plan_code, interval.lookup_key_suffix()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanSeed {
    pub plan_code: &'static str,
    pub name: &'static str,
    pub vcpu: i32,
    pub ram_gb: i32,
    pub storage_gb: i32,
    pub bandwidth_tb: i32,
    pub monthly_price_cents: i64,
    pub yearly_price_cents: i64,
}

impl PlanSeed {
    pub fn description(&self) -> String {
        format!(
            "{} vCPU, {} GB RAM, {} GB NVMe SSD, {} TB bandwidth",
            self.vcpu, self.ram_gb, self.storage_gb, self.bandwidth_tb
        )
    }
}

pub const SEED_CURRENCY: &str = "eur";

pub const NEBULA_PLANS: &[PlanSeed] = &[
    PlanSeed {
        plan_code: "nebula_one",
        name: "Nebula One",
        vcpu: 2,
        ram_gb: 4,
        storage_gb: 50,
        bandwidth_tb: 2,
        monthly_price_cents: 865,
        yearly_price_cents: 9_300,
    },
    PlanSeed {
        plan_code: "nebula_two",
        name: "Nebula Two",
        vcpu: 2,
        ram_gb: 8,
        storage_gb: 100,
        bandwidth_tb: 5,
        monthly_price_cents: 1_670,
        yearly_price_cents: 18_000,
    },
    PlanSeed {
        plan_code: "nebula_four",
        name: "Nebula Four",
        vcpu: 4,
        ram_gb: 16,
        storage_gb: 200,
        bandwidth_tb: 10,
        monthly_price_cents: 3_393,
        yearly_price_cents: 36_600,
    },
    PlanSeed {
        plan_code: "nebula_eight",
        name: "Nebula Eight",
        vcpu: 8,
        ram_gb: 32,
        storage_gb: 400,
        bandwidth_tb: 20,
        monthly_price_cents: 6_843,
        yearly_price_cents: 73_900,
    },
    PlanSeed {
        plan_code: "nebula_sixteen",
        name: "Nebula Sixteen",
        vcpu: 16,
        ram_gb: 64,
        storage_gb: 800,
        bandwidth_tb: 32,
        monthly_price_cents: 13_685,
        yearly_price_cents: 147_800,
    },
    PlanSeed {
        plan_code: "nebula_thirtytwo",
        name: "Nebula Thirty-Two",
        vcpu: 32,
        ram_gb: 128,
        storage_gb: 1_600,
        bandwidth_tb: 32,
        monthly_price_cents: 27_485,
        yearly_price_cents: 296_800,
    },
];

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait PlanRepoTrait: Send + Sync {
    async fn list_active(&self) -> AppResult<Vec<VpsPlanProfile>>;

    async fn get_active_by_code(&self, plan_code: &str) -> AppResult<Option<VpsPlanProfile>>;

    /// Insert or refresh a plan keyed on its plan code.
    async fn upsert_seed(&self, seed: &PlanSeed) -> AppResult<VpsPlanProfile>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct PlanCatalog {
    repo: Arc<dyn PlanRepoTrait>,
}

impl PlanCatalog {
    pub fn new(repo: Arc<dyn PlanRepoTrait>) -> Self {
        Self { repo }
    }

    /// Upsert the built-in plan line. Safe to run on every start.
    pub async fn seed_default_plans(&self) -> AppResult<usize> {
        for seed in NEBULA_PLANS {
            self.repo.upsert_seed(seed).await?;
        }
        info!(count = NEBULA_PLANS.len(), "Seeded VPS plan catalog");
        Ok(NEBULA_PLANS.len())
    }
}
