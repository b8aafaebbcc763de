//! Core business logic - framework-agnostic accrual, settlement and ledger operations.
//!
//! Nothing in here knows about the chat surface. The [`engine::SettlementEngine`]
//! ties the ledger to the cache, publisher and notifier and is what callers hold.

pub mod accrual;
pub mod activity;
pub mod cache;
pub mod claim;
pub mod engine;
pub mod notify;
pub mod publisher;
pub mod retry;
pub mod settlement;
pub mod slot;
pub mod state;
pub mod sweeper;
pub mod system_state;
pub mod user;
pub mod wallet;

pub use claim::ClaimResult;
pub use engine::SettlementEngine;
pub use state::{CurrentState, SlotState};
pub use sweeper::{SweepReport, spawn_sweeper};
