//! Process-local map of plan code to Stripe price ids.
//!
//! The whole map is one immutable snapshot with a single expiry. A rebuild
//! produces a new snapshot and swaps the pointer, so readers never observe
//! a half-built map.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::app_error::AppResult;
use crate::application::ports::{clock::Clock, payment_processor::PaymentProcessor};
use crate::application::use_cases::plan_catalog::PlanRepoTrait;
use crate::domain::entities::billing_interval::BillingInterval;

pub const DEFAULT_PRICE_CACHE_TTL_SECS: i64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanPrices {
    pub month: Option<String>,
    pub year: Option<String>,
}

impl PlanPrices {
    pub fn get(&self, interval: BillingInterval) -> Option<&str> {
        match interval {
            BillingInterval::Month => self.month.as_deref(),
            BillingInterval::Year => self.year.as_deref(),
        }
    }

    fn set(&mut self, interval: BillingInterval, price_id: String) {
        match interval {
            BillingInterval::Month => self.month = Some(price_id),
            BillingInterval::Year => self.year = Some(price_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceSnapshot {
    pub prices: BTreeMap<String, PlanPrices>,
    pub built_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PriceSnapshot {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub struct PriceCache {
    plans: Arc<dyn PlanRepoTrait>,
    processor: Arc<dyn PaymentProcessor>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    /// Published snapshot, tagged with the generation it was built under.
    current: RwLock<Option<(u64, Arc<PriceSnapshot>)>>,
    /// Bumped by `bust()`; a snapshot from an older generation is stale.
    generation: AtomicU64,
    rebuild_lock: Mutex<()>,
    rebuilds: AtomicU64,
}

impl PriceCache {
    pub fn new(
        plans: Arc<dyn PlanRepoTrait>,
        processor: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            plans,
            processor,
            clock,
            ttl,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            rebuild_lock: Mutex::new(()),
            rebuilds: AtomicU64::new(0),
        }
    }

    pub async fn get_price_id(
        &self,
        plan_code: &str,
        interval: BillingInterval,
    ) -> AppResult<Option<String>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .prices
            .get(plan_code)
            .and_then(|p| p.get(interval))
            .map(str::to_string))
    }

    /// Current snapshot, rebuilding first if it is missing or expired.
    pub async fn snapshot(&self) -> AppResult<Arc<PriceSnapshot>> {
        if let Some(snapshot) = self.fresh_snapshot() {
            return Ok(snapshot);
        }

        let _guard = self.rebuild_lock.lock().await;

        // Another request may have rebuilt while we waited.
        if let Some(snapshot) = self.fresh_snapshot() {
            return Ok(snapshot);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let snapshot = Arc::new(self.rebuild().await?);

        // A bust during the rebuild leaves this snapshot stale on publish, so
        // the next access rebuilds again.
        *self.current.write().unwrap_or_else(|e| e.into_inner()) =
            Some((generation, snapshot.clone()));
        Ok(snapshot)
    }

    /// Force the next access to rebuild, including when a rebuild is
    /// already in flight.
    pub fn bust(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
        debug!("Price cache invalidated");
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    fn fresh_snapshot(&self) -> Option<Arc<PriceSnapshot>> {
        let now = self.clock.now();
        let generation = self.generation.load(Ordering::Acquire);
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|(built_under, s)| *built_under == generation && s.is_fresh(now))
            .map(|(_, s)| s.clone())
    }

    #[instrument(skip(self))]
    async fn rebuild(&self) -> AppResult<PriceSnapshot> {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);

        let plans = self.plans.list_active().await?;
        let mut prices = BTreeMap::new();

        for plan in &plans {
            let mut entry = PlanPrices::default();

            for interval in [BillingInterval::Month, BillingInterval::Year] {
                let lookup_key = plan.lookup_key(interval);
                match self.processor.find_price_by_lookup_key(&lookup_key).await {
                    Ok(Some(price)) => entry.set(interval, price.id),
                    Ok(None) => warn!(
                        plan_code = %plan.plan_code,
                        lookup_key = %lookup_key,
                        "No Stripe price for lookup key"
                    ),
                    Err(e) => warn!(
                        error = %e,
                        plan_code = %plan.plan_code,
                        lookup_key = %lookup_key,
                        "Price lookup failed, leaving interval unresolved"
                    ),
                }
            }

            if entry.month.is_some() || entry.year.is_some() {
                prices.insert(plan.plan_code.clone(), entry);
            }
        }

        let built_at = self.clock.now();
        info!(
            plans = plans.len(),
            resolved = prices.len(),
            "Rebuilt price cache"
        );

        Ok(PriceSnapshot {
            prices,
            built_at,
            expires_at: built_at + self.ttl,
        })
    }
}
