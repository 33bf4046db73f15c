use serde::{Deserialize, Serialize};

/// Settlement outcome of a checkout session as seen by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    Paid,
    Pending,
    Failed,
}

impl CheckoutState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Paid => "paid",
            CheckoutState::Pending => "pending",
            CheckoutState::Failed => "failed",
        }
    }

    /// Name of the landing view shown after the Stripe redirect.
    pub fn landing_view(&self) -> &'static str {
        match self {
            CheckoutState::Paid => "success",
            CheckoutState::Pending => "pending",
            CheckoutState::Failed => "failure",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutDecision {
    pub state: CheckoutState,
    pub invoice_id: Option<String>,
}

impl CheckoutDecision {
    pub fn new(state: CheckoutState, invoice_id: Option<String>) -> Self {
        Self { state, invoice_id }
    }
}

/// Payment intent statuses that mean the customer is still settling.
pub const IN_PROGRESS_PAYMENT_INTENT_STATUSES: &[&str] = &[
    "requires_action",
    "processing",
    "requires_confirmation",
    "requires_payment_method",
];
