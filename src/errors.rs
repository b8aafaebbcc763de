//! Unified error type for the settlement engine.
//!
//! Every fallible operation returns [`Result`]. Variants fall into three groups:
//! validation errors (rejected before any state changes), transient infrastructure
//! errors (retried by the sweeper) and invariant violations (logic bugs that abort
//! only the affected user's settlement).

use rust_decimal::Decimal;
use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong
        message: String,
    },

    /// Amount is zero, negative, or below the product minimum
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Purchase amount is below the minimum investment
    #[error("Amount {amount} is below the minimum investment of {minimum}")]
    BelowMinimum {
        /// The rejected amount
        amount: Decimal,
        /// Configured minimum investment
        minimum: Decimal,
    },

    /// Wallet balance does not cover the requested debit
    #[error("Insufficient funds: balance {current}, required {required}")]
    InsufficientFunds {
        /// Balance before the debit
        current: Decimal,
        /// Amount that was requested
        required: Decimal,
    },

    /// No user with the given internal id
    #[error("User not found: {user_id}")]
    UserNotFound {
        /// Internal user id
        user_id: i64,
    },

    /// No slot with the given id
    #[error("Slot not found: {slot_id}")]
    SlotNotFound {
        /// Slot id
        slot_id: i64,
    },

    /// Another writer settled the slot first; re-reading will skip it
    #[error("Slot {slot_id} was settled concurrently")]
    SettlementConflict {
        /// Slot that lost the race
        slot_id: i64,
    },

    /// A ledger invariant would be broken; the surrounding transaction is aborted
    #[error("Invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant
        message: String,
    },

    /// Database error from `SeaORM`
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Serenity/Poise framework error
    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

impl Error {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::SettlementConflict { .. })
    }

    /// Whether the error was caused by bad caller input rather than the system.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount { .. }
                | Self::BelowMinimum { .. }
                | Self::InsufficientFunds { .. }
                | Self::UserNotFound { .. }
                | Self::SlotNotFound { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_classification() {
        let db = Error::Database(sea_orm::DbErr::Custom("lock timeout".to_string()));
        assert!(db.is_transient());
        assert!(!db.is_validation());

        let invalid = Error::InvalidAmount { amount: dec!(-1) };
        assert!(invalid.is_validation());
        assert!(!invalid.is_transient());

        assert!(Error::SettlementConflict { slot_id: 1 }.is_transient());

        let invariant = Error::InvariantViolation {
            message: "slot already settled".to_string(),
        };
        assert!(!invariant.is_transient());
        assert!(!invariant.is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = Error::BelowMinimum {
            amount: dec!(5),
            minimum: dec!(10),
        };
        assert_eq!(
            err.to_string(),
            "Amount 5 is below the minimum investment of 10"
        );
    }
}
