pub mod billing_ledger;
pub mod checkout;
pub mod checkout_state;
pub mod event_log;
pub mod plan_catalog;
pub mod price_cache;
pub mod subscription_sync;
pub mod user_binding;
pub mod webhook;
