use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_record_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingRecordKind {
    Invoice,
    CheckoutSession,
    Subscription,
}

/// Which Stripe mode an order-history query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivemodeFilter {
    #[default]
    All,
    Live,
    Test,
}

impl LivemodeFilter {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "live" => LivemodeFilter::Live,
            "test" => LivemodeFilter::Test,
            _ => LivemodeFilter::All,
        }
    }

    pub fn as_livemode(&self) -> Option<bool> {
        match self {
            LivemodeFilter::All => None,
            LivemodeFilter::Live => Some(true),
            LivemodeFilter::Test => Some(false),
        }
    }
}
