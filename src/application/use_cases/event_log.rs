use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::domain::entities::stripe_event::StripeEvent;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub payload: JsonValue,
    pub signature_valid: bool,
    pub processed: bool,
    pub created_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait EventLogRepoTrait: Send + Sync {
    /// Atomic check-and-insert keyed on the Stripe event id.
    ///
    /// Returns the stored entry and whether this call created it.
    async fn insert_if_absent(
        &self,
        event_id: &str,
        event_type: &str,
        payload: &JsonValue,
        signature_valid: bool,
    ) -> AppResult<(EventLogEntry, bool)>;

    /// Flips `processed` to true. Returns false if it was already set.
    async fn mark_processed(&self, event_id: &str) -> AppResult<bool>;

    async fn get_by_event_id(&self, event_id: &str) -> AppResult<Option<EventLogEntry>>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct EventLog {
    repo: Arc<dyn EventLogRepoTrait>,
}

impl EventLog {
    pub fn new(repo: Arc<dyn EventLogRepoTrait>) -> Self {
        Self { repo }
    }

    /// Record a delivery. A repeat delivery returns the existing entry with
    /// `is_new = false`; the caller checks `processed` to decide whether to
    /// re-run the handler.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn record(
        &self,
        event: &StripeEvent,
        signature_valid: bool,
    ) -> AppResult<(EventLogEntry, bool)> {
        let (entry, is_new) = self
            .repo
            .insert_if_absent(&event.id, &event.event_type, &event.payload, signature_valid)
            .await?;

        if !is_new {
            debug!(processed = entry.processed, "Repeat delivery of Stripe event");
        }

        Ok((entry, is_new))
    }

    pub async fn mark_processed(&self, event_id: &str) -> AppResult<()> {
        if !self.repo.mark_processed(event_id).await? {
            // A concurrent delivery finished first; the flag only moves forward.
            warn!(event_id, "Stripe event was already marked processed");
        }
        Ok(())
    }
}
