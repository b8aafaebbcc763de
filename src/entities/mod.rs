//! Entity module - `SeaORM` definitions for the ledger tables.
//! Users own wallets (one per currency) and slots; every balance-affecting
//! operation appends a row to the activity log. Amounts are stored as integer
//! minor units (see [`money`]).

pub mod activity_log;
pub mod money;
pub mod slot;
pub mod system_state;
pub mod user;
pub mod wallet;

// Re-export specific types to avoid conflicts
pub use activity_log::{
    ActivityKind, Column as ActivityLogColumn, Entity as ActivityLog, Model as ActivityLogModel,
};
pub use slot::{Column as SlotColumn, Entity as Slot, Model as SlotModel};
pub use system_state::{
    Column as SystemStateColumn, Entity as SystemState, Model as SystemStateModel,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
pub use wallet::{Column as WalletColumn, Currency, Entity as Wallet, Model as WalletModel};
