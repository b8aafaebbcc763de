//! Fixed-point storage for money columns.
//!
//! `SQLite` has no exact decimal type and `SeaORM` binds `Decimal` there as a
//! floating-point value, so every amount and rate is stored as an integer count of
//! minor units at [`AMOUNT_SCALE`] decimal places. Entities expose `Decimal`
//! accessors; nothing above this module sees the raw integers.

use crate::errors::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

/// Decimal places kept on every stored amount
pub const AMOUNT_SCALE: u32 = 4;

/// Minor units in one whole unit
const UNITS_PER_WHOLE: i64 = 10_i64.pow(AMOUNT_SCALE);

/// Converts an amount to minor units, rounding half away from zero.
///
/// Fails with [`Error::InvalidAmount`] when the amount does not fit in an `i64`.
pub fn to_units(amount: Decimal) -> Result<i64> {
    amount
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .checked_mul(Decimal::from(UNITS_PER_WHOLE))
        .and_then(|units| units.to_i64())
        .ok_or(Error::InvalidAmount { amount })
}

/// Converts stored minor units back to an amount.
#[must_use]
pub fn from_units(units: i64) -> Decimal {
    Decimal::new(units, AMOUNT_SCALE).normalize()
}
