use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_interval", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }

    /// Accepts Stripe's `recurring.interval` values and the checkout metadata hint.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" | "monthly" => Some(BillingInterval::Month),
            "year" | "yearly" | "annual" => Some(BillingInterval::Year),
            _ => None,
        }
    }

    /// Only the canonical `month` and `year`, as submitted by the checkout form.
    pub fn parse_exact(s: &str) -> Option<Self> {
        match s.trim() {
            "month" => Some(BillingInterval::Month),
            "year" => Some(BillingInterval::Year),
            _ => None,
        }
    }

    /// Suffix used by the plan catalog's Stripe price lookup keys.
    pub fn lookup_key_suffix(&self) -> &'static str {
        match self {
            BillingInterval::Month => "monthly",
            BillingInterval::Year => "yearly",
        }
    }
}

impl std::fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
