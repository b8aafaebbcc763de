//! Accrual calculator - pure functions mapping a slot's terms and a wall-clock
//! instant to the amount it has earned.
//!
//! Nothing here reads a clock: callers pass `now` in. Earnings grow linearly from
//! `start` and stop at exactly `principal * rate` once the term has elapsed, so a
//! slot settled late never over-accrues.

use crate::entities::{money::AMOUNT_SCALE, slot};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds an amount to ledger precision.
#[must_use]
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Fraction of the term that has elapsed at `now`, clamped to `[0, 1]`.
///
/// A non-positive term counts as fully elapsed.
#[must_use]
pub fn progress_fraction(start: DateTime<Utc>, now: DateTime<Utc>, term: Duration) -> Decimal {
    let term_ms = term.num_milliseconds();
    if term_ms <= 0 {
        return Decimal::ONE;
    }
    let elapsed_ms = (now - start).num_milliseconds();
    if elapsed_ms <= 0 {
        return Decimal::ZERO;
    }
    if elapsed_ms >= term_ms {
        return Decimal::ONE;
    }
    Decimal::from(elapsed_ms) / Decimal::from(term_ms)
}

/// Amount earned at `now`: `principal * rate * progress`.
#[must_use]
pub fn earned_amount(
    principal: Decimal,
    rate: Decimal,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    term: Duration,
) -> Decimal {
    let progress = progress_fraction(start, now, term);
    if progress == Decimal::ONE {
        return round_amount(principal * rate);
    }
    round_amount(principal * rate * progress)
}

/// Whether the term has fully elapsed at `now`.
#[must_use]
pub fn is_due(start: DateTime<Utc>, term: Duration, now: DateTime<Utc>) -> bool {
    now >= start + term
}

impl slot::Model {
    /// Term fixed at purchase.
    #[must_use]
    pub fn term(&self) -> Duration {
        self.expires_at - self.started_at
    }

    /// Live earnings at `now`.
    #[must_use]
    pub fn earned_at(&self, now: DateTime<Utc>) -> Decimal {
        earned_amount(
            self.principal(),
            self.weekly_rate(),
            self.started_at,
            now,
            self.term(),
        )
    }

    /// Earnings once the term has fully elapsed.
    #[must_use]
    pub fn full_term_earnings(&self) -> Decimal {
        round_amount(self.principal() * self.weekly_rate())
    }

    /// Progress through the term as a percentage with two decimals.
    #[must_use]
    pub fn progress_percent_at(&self, now: DateTime<Utc>) -> Decimal {
        (progress_fraction(self.started_at, now, self.term()) * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Same check the sweeper's `expires_at <= now` filter performs.
    #[must_use]
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        is_due(self.started_at, self.term(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_linear_accrual_within_term() {
        let term = Duration::days(7);
        for hours in [0_i64, 1, 24, 84, 100, 167] {
            let now = start() + Duration::hours(hours);
            let expected =
                round_amount(dec!(100) * dec!(0.30) * Decimal::from(hours) / Decimal::from(168));
            assert_eq!(
                earned_amount(dec!(100), dec!(0.30), start(), now, term),
                expected,
                "hours = {hours}"
            );
        }
    }

    #[test]
    fn test_full_term_caps_earnings() {
        let term = Duration::days(7);
        let exactly = start() + term;
        let late = start() + Duration::days(30);
        assert_eq!(earned_amount(dec!(100), dec!(0.30), start(), exactly, term), dec!(30));
        assert_eq!(earned_amount(dec!(100), dec!(0.30), start(), late, term), dec!(30));
    }

    #[test]
    fn test_now_before_start_clamps_to_zero() {
        let now = start() - Duration::hours(3);
        assert_eq!(
            earned_amount(dec!(100), dec!(0.30), start(), now, Duration::days(7)),
            Decimal::ZERO
        );
        assert_eq!(progress_fraction(start(), now, Duration::days(7)), Decimal::ZERO);
    }

    #[test]
    fn test_half_term() {
        let now = start() + Duration::hours(84);
        assert_eq!(progress_fraction(start(), now, Duration::days(7)), dec!(0.5));
        assert_eq!(
            earned_amount(dec!(100), dec!(0.30), start(), now, Duration::days(7)),
            dec!(15)
        );
    }

    #[test]
    fn test_zero_term_is_fully_earned() {
        assert_eq!(progress_fraction(start(), start(), Duration::zero()), Decimal::ONE);
        assert!(is_due(start(), Duration::zero(), start()));
    }

    #[test]
    fn test_is_due_boundary() {
        let term = Duration::days(7);
        assert!(!is_due(start(), term, start() + term - Duration::milliseconds(1)));
        assert!(is_due(start(), term, start() + term));
    }

    #[test]
    fn test_rounding_to_ledger_precision() {
        // 1/3 of a term on 10 at 10% = 0.3333...
        let term = Duration::hours(3);
        let now = start() + Duration::hours(1);
        assert_eq!(earned_amount(dec!(10), dec!(0.10), start(), now, term), dec!(0.3333));
        assert_eq!(round_amount(dec!(0.00005)), dec!(0.0001));
    }

    #[test]
    fn test_slot_model_helpers() {
        let slot = slot::Model {
            id: 1,
            user_id: 1,
            principal_units: 1_000_000,
            weekly_rate_units: 3_000,
            started_at: start(),
            expires_at: start() + Duration::days(7),
            last_accrued_at: start(),
            accrued_earnings_units: 0,
            is_active: true,
            is_locked: false,
            slot_type: "standard".to_string(),
        };
        let halfway = start() + Duration::hours(84);
        assert_eq!(slot.term(), Duration::days(7));
        assert_eq!(slot.earned_at(halfway), dec!(15));
        assert_eq!(slot.progress_percent_at(halfway), dec!(50));
        assert!(!slot.is_due_at(halfway));
        assert!(slot.is_due_at(slot.expires_at));
        assert_eq!(slot.full_term_earnings(), dec!(30));
    }
}
