//! Test utilities.
//!
//! This module provides:
//! - Test data factories for users, plans, ledger rows and Stripe objects
//! - In-memory repository implementations for mocking persistence
//! - A scripted payment processor and a manually advanced clock
//! - `TestAppStateBuilder` for HTTP-level tests

mod app_state_builder;
mod factories;
mod repo_mocks;
mod stripe_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use repo_mocks::*;
pub use stripe_mocks::*;
