//! Per-user settlement transaction shared by the sweeper and the claim path.
//!
//! One call settles any number of one user's due slots in a single database
//! transaction: each slot is flipped inactive with a conditional update, one log
//! entry is written per slot, and the yield wallet is credited once with the sum.
//! The flip and the credit commit together, so a slot can pay out at most once.

use crate::{
    core::{
        activity::{self, NewActivity},
        wallet,
    },
    entities::{ActivityKind, Currency, Slot, money::to_units, slot},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{debug, info, instrument, warn};

/// How a settlement is recorded and what it pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementRule {
    /// Log entry kind: `Settlement` for the sweeper, `Claim` for user claims
    pub kind: ActivityKind,
    /// Also return the principal to the principal wallet
    pub return_principal: bool,
    /// Leave locked slots alone
    pub respect_lock: bool,
}

impl SettlementRule {
    /// Rule used by the scheduled sweep. Locked slots are settled too.
    #[must_use]
    pub const fn sweep(return_principal: bool) -> Self {
        Self {
            kind: ActivityKind::Settlement,
            return_principal,
            respect_lock: false,
        }
    }

    /// Rule used by user-initiated claims.
    #[must_use]
    pub const fn claim(return_principal: bool) -> Self {
        Self {
            kind: ActivityKind::Claim,
            return_principal,
            respect_lock: true,
        }
    }

    const fn verb(self) -> &'static str {
        match self.kind {
            ActivityKind::Claim => "Claimed",
            _ => "Settled",
        }
    }
}

/// One slot closed by a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledSlot {
    /// Slot id
    pub slot_id: i64,
    /// Principal of the slot
    pub principal: Decimal,
    /// Final earnings credited
    pub earnings: Decimal,
}

/// What a settlement transaction committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    /// Owner of the settled slots
    pub user_id: i64,
    /// Slots that were closed, empty when nothing was still due
    pub settled: Vec<SettledSlot>,
    /// Sum of earnings credited to the yield wallet
    pub total_earnings: Decimal,
    /// Principal credited back, zero unless the rule returns principal
    pub returned_principal: Decimal,
    /// Yield wallet balance after the commit
    pub yield_balance: Decimal,
}

impl SettlementOutcome {
    /// Whether nothing was settled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}

/// Settles those of `slot_ids` that belong to `user_id` and are still active and due.
///
/// Slots that are no longer active (settled by a concurrent claim or sweep) are
/// skipped, so calling this twice for the same slots credits nothing the second time.
/// If another writer flips a slot between the read and the update the whole
/// transaction is rolled back with [`Error::SettlementConflict`].
#[instrument(skip(db, slot_ids), fields(slots = slot_ids.len()))]
pub async fn settle_user_slots(
    db: &DatabaseConnection,
    user_id: i64,
    slot_ids: &[i64],
    now: DateTime<Utc>,
    rule: SettlementRule,
) -> Result<SettlementOutcome> {
    let txn = db.begin().await?;

    let slots = load_due_slots(&txn, user_id, slot_ids, now, rule).await?;
    if slots.is_empty() {
        let yield_balance = wallet::get_balance(&txn, user_id, Currency::Yield).await?;
        txn.rollback().await?;
        debug!("Nothing left to settle for user {}", user_id);
        return Ok(SettlementOutcome {
            user_id,
            settled: Vec::new(),
            total_earnings: Decimal::ZERO,
            returned_principal: Decimal::ZERO,
            yield_balance,
        });
    }

    let outcome = close_slots(&txn, user_id, &slots, now, rule).await?;
    txn.commit().await?;
    info!(
        "{} {} slots for user {}: earnings {}, principal returned {}",
        rule.verb(),
        outcome.settled.len(),
        user_id,
        outcome.total_earnings,
        outcome.returned_principal
    );
    Ok(outcome)
}

/// Reads the subset of `slot_ids` the rule may settle for `user_id` at `now`.
pub(crate) async fn load_due_slots<C>(
    db: &C,
    user_id: i64,
    slot_ids: &[i64],
    now: DateTime<Utc>,
    rule: SettlementRule,
) -> Result<Vec<slot::Model>>
where
    C: ConnectionTrait,
{
    if slot_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut query = Slot::find()
        .filter(slot::Column::Id.is_in(slot_ids.iter().copied()))
        .filter(slot::Column::UserId.eq(user_id))
        .filter(slot::Column::IsActive.eq(true))
        .filter(slot::Column::ExpiresAt.lte(now));
    if rule.respect_lock {
        query = query.filter(slot::Column::IsLocked.eq(false));
    }
    query
        .order_by_asc(slot::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Flips `slots` inactive, logs them and credits the wallets, without committing.
///
/// Each flip is conditional on the slot still being active; a slot another writer
/// settled after `slots` was read fails the whole call with
/// [`Error::SettlementConflict`].
pub(crate) async fn close_slots<C>(
    db: &C,
    user_id: i64,
    slots: &[slot::Model],
    now: DateTime<Utc>,
    rule: SettlementRule,
) -> Result<SettlementOutcome>
where
    C: ConnectionTrait,
{
    let verb = rule.verb();
    let mut settled = Vec::with_capacity(slots.len());
    for slot in slots {
        let earnings = slot.full_term_earnings();
        if earnings.is_sign_negative() && !earnings.is_zero() {
            return Err(Error::InvariantViolation {
                message: format!("slot {} would settle negative earnings {earnings}", slot.id),
            });
        }

        let flipped = Slot::update_many()
            .col_expr(slot::Column::IsActive, Expr::value(false))
            .col_expr(slot::Column::LastAccruedAt, Expr::value(now))
            .col_expr(
                slot::Column::AccruedEarningsUnits,
                Expr::value(to_units(earnings)?),
            )
            .filter(slot::Column::Id.eq(slot.id))
            .filter(slot::Column::IsActive.eq(true))
            .exec(db)
            .await?;
        if flipped.rows_affected != 1 {
            warn!(
                "Slot {} of user {} was settled by another writer",
                slot.id, user_id
            );
            return Err(Error::SettlementConflict { slot_id: slot.id });
        }

        activity::append(
            db,
            NewActivity {
                user_id,
                kind: rule.kind,
                currency: Currency::Yield,
                amount: earnings,
                description: format!("{verb} earnings of slot #{}", slot.id),
                source_user_id: None,
                slot_id: Some(slot.id),
            },
        )
        .await?;

        if rule.return_principal {
            activity::append(
                db,
                NewActivity {
                    user_id,
                    kind: rule.kind,
                    currency: Currency::Principal,
                    amount: slot.principal(),
                    description: format!("Returned principal of slot #{}", slot.id),
                    source_user_id: None,
                    slot_id: Some(slot.id),
                },
            )
            .await?;
        }

        settled.push(SettledSlot {
            slot_id: slot.id,
            principal: slot.principal(),
            earnings,
        });
    }

    let total_earnings: Decimal = settled.iter().map(|s| s.earnings).sum();
    let yield_balance = if total_earnings > Decimal::ZERO {
        wallet::credit(db, user_id, Currency::Yield, total_earnings)
            .await?
            .balance()
    } else {
        wallet::get_balance(db, user_id, Currency::Yield).await?
    };

    let returned_principal = if rule.return_principal {
        let principal: Decimal = settled.iter().map(|s| s.principal).sum();
        if principal > Decimal::ZERO {
            wallet::credit(db, user_id, Currency::Principal, principal).await?;
        }
        principal
    } else {
        Decimal::ZERO
    };

    Ok(SettlementOutcome {
        user_id,
        settled,
        total_earnings,
        returned_principal,
        yield_balance,
    })
}
