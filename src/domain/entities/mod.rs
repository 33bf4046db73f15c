pub mod billing_interval;
pub mod billing_record;
pub mod checkout_state;
pub mod stripe_event;
pub mod stripe_objects;
pub mod subscription_status;
