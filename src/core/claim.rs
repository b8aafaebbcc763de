//! User-initiated claim of due slots.
//!
//! A claim settles through the same per-user transaction as the sweeper, so a
//! claim racing a sweep for the same slot credits it exactly once.

use crate::{
    core::{engine::SettlementEngine, settlement::SettlementRule, slot, user},
    errors::Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

/// What a claim credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClaimResult {
    /// Earnings moved into the yield wallet
    pub claimed_amount: Decimal,
    /// Number of slots closed
    pub claimed_slot_count: usize,
}

impl ClaimResult {
    /// A claim that found nothing to settle.
    #[must_use]
    pub const fn nothing() -> Self {
        Self {
            claimed_amount: Decimal::ZERO,
            claimed_slot_count: 0,
        }
    }
}

impl SettlementEngine {
    /// Claims the user's due, unlocked slots, optionally restricted to `slot_ids`.
    ///
    /// Slots that are not due, locked, already settled or owned by someone else are
    /// ignored. When none remain the result is zero and nothing is written.
    #[instrument(skip(self, slot_ids))]
    pub async fn claim(
        &self,
        user_id: i64,
        slot_ids: Option<&[i64]>,
        now: DateTime<Utc>,
    ) -> Result<ClaimResult> {
        user::require_user(&self.db, user_id).await?;

        let claimable = slot::get_claimable_slots(&self.db, user_id, slot_ids, now).await?;
        if claimable.is_empty() {
            return Ok(ClaimResult::nothing());
        }
        let ids: Vec<i64> = claimable.iter().map(|s| s.id).collect();

        let rule = SettlementRule::claim(self.config.mining.return_principal);
        let outcome = self.settle_with_retry(user_id, &ids, now, rule).await?;
        self.after_settlement(&outcome).await;

        if !outcome.is_empty() {
            info!(
                "User {} claimed {} from {} slots",
                user_id,
                outcome.total_earnings,
                outcome.settled.len()
            );
        }
        Ok(ClaimResult {
            claimed_amount: outcome.total_earnings,
            claimed_slot_count: outcome.settled.len(),
        })
    }
}
