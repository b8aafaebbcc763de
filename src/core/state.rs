//! Current-state read path: live earnings of every active slot plus the yield balance.
//!
//! Reads go through the snapshot cache first. A cache error is logged and treated
//! as a miss, so the result always matches what the ledger would produce.

use crate::{
    core::{
        cache::state_key, engine::SettlementEngine, publisher::EngineEvent, slot, user, wallet,
    },
    entities::Currency,
    errors::Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// Live view of one active slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotState {
    /// Slot id
    pub slot_id: i64,
    /// Amount invested
    pub principal: Decimal,
    /// Earnings accrued so far
    pub current_earnings: Decimal,
    /// Elapsed share of the term, 0 to 100
    pub progress_percent: Decimal,
    /// Whether the term is over and the slot awaits settlement
    pub is_due: bool,
}

/// Snapshot of a user's mining position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentState {
    /// Owner
    pub user_id: i64,
    /// Active slots, oldest expiry first
    pub per_slot: Vec<SlotState>,
    /// Sum of `current_earnings` across active slots
    pub total_current_earnings: Decimal,
    /// Settled yield already in the wallet
    pub yield_balance: Decimal,
    /// `yield_balance + total_current_earnings`
    pub total_current_balance: Decimal,
    /// When the snapshot was computed
    pub computed_at: DateTime<Utc>,
}

impl SettlementEngine {
    /// Returns the user's current state, from cache when fresh.
    ///
    /// A computed snapshot is cached for the configured TTL and pushed to live
    /// subscribers as an `EarningsDelta` event. If the user is invalidated while the
    /// snapshot is being computed it is returned but not cached.
    #[instrument(skip(self))]
    pub async fn current_state(&self, user_id: i64, now: DateTime<Utc>) -> Result<CurrentState> {
        let key = state_key(user_id);
        let epoch = self.epochs.current(user_id);
        match self.cache.get(&key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => warn!("State cache read failed for user {}: {}", user_id, e),
        }

        let state = self.compute_state(user_id, now).await?;
        self.store_snapshot(&state, epoch).await;

        self.publisher
            .publish(
                user_id,
                EngineEvent::EarningsDelta {
                    total_current_earnings: state.total_current_earnings,
                },
            )
            .await;
        Ok(state)
    }

    /// Caches `state` unless its user was invalidated after `epoch` was read.
    /// Returns whether the snapshot stayed cached.
    pub(crate) async fn store_snapshot(&self, state: &CurrentState, epoch: u64) -> bool {
        let user_id = state.user_id;
        if self.epochs.current(user_id) != epoch {
            debug!("Skipping stale snapshot for user {}", user_id);
            return false;
        }

        let key = state_key(user_id);
        if let Err(e) = self
            .cache
            .set(&key, state.clone(), self.config.cache.ttl())
            .await
        {
            warn!("State cache write failed for user {}: {}", user_id, e);
            return false;
        }

        // An invalidation that landed between the check and the write
        if self.epochs.current(user_id) != epoch {
            if let Err(e) = self.cache.invalidate(&key).await {
                warn!("Failed to drop stale snapshot for user {}: {}", user_id, e);
            }
            return false;
        }
        true
    }

    /// Computes the snapshot straight from the ledger, bypassing the cache.
    pub async fn compute_state(&self, user_id: i64, now: DateTime<Utc>) -> Result<CurrentState> {
        user::require_user(&self.db, user_id).await?;
        let slots = slot::get_active_slots_for_user(&self.db, user_id).await?;
        let yield_balance = wallet::get_balance(&self.db, user_id, Currency::Yield).await?;

        let per_slot: Vec<SlotState> = slots
            .iter()
            .map(|s| SlotState {
                slot_id: s.id,
                principal: s.principal(),
                current_earnings: s.earned_at(now),
                progress_percent: s.progress_percent_at(now),
                is_due: s.is_due_at(now),
            })
            .collect();
        let total_current_earnings: Decimal = per_slot.iter().map(|s| s.current_earnings).sum();

        Ok(CurrentState {
            user_id,
            per_slot,
            total_current_earnings,
            yield_balance,
            total_current_balance: yield_balance + total_current_earnings,
            computed_at: now,
        })
    }
}
