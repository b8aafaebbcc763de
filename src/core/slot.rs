//! Slot purchase and the queries the sweeper and claim path run against slots.
//!
//! The due filter used everywhere is `is_active = true AND expires_at <= now`,
//! which is exactly [`crate::entities::slot::Model::is_due_at`].

use crate::{
    config::MiningConfig,
    core::{
        accrual::round_amount,
        activity::{self, NewActivity},
        user, wallet,
    },
    entities::{ActivityKind, Currency, Slot, money::to_units, slot},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    Condition, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use tracing::{debug, info, instrument};

/// Product tag written on slots bought through [`purchase_slot`]
pub const STANDARD_SLOT_TYPE: &str = "standard";

/// Result of a successful purchase.
#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    /// The newly created slot
    pub slot: slot::Model,
    /// Principal balance after the debit
    pub principal_balance: Decimal,
    /// Referrer and bonus credited to them, if the buyer was referred
    pub referral: Option<(i64, Decimal)>,
}

/// Buys a slot: debits the principal wallet, creates the slot and logs the purchase,
/// all in one transaction.
///
/// The slot starts at `now`, expires at `now + term` and locks in the current rate.
/// If the buyer was referred, the referrer's yield wallet receives
/// `principal * referral_rate` in the same transaction.
#[instrument(skip(db, terms))]
pub async fn purchase_slot(
    db: &DatabaseConnection,
    terms: &MiningConfig,
    user_id: i64,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<PurchaseOutcome> {
    let amount = round_amount(amount);
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount { amount });
    }
    if amount < terms.minimum_investment {
        return Err(Error::BelowMinimum {
            amount,
            minimum: terms.minimum_investment,
        });
    }

    let txn = db.begin().await?;
    let buyer = user::require_user(&txn, user_id).await?;

    let funding = wallet::debit(&txn, user_id, Currency::Principal, amount).await?;

    let new_slot = slot::ActiveModel {
        user_id: Set(user_id),
        principal_units: Set(to_units(amount)?),
        weekly_rate_units: Set(to_units(terms.weekly_rate)?),
        started_at: Set(now),
        expires_at: Set(now + terms.term()),
        last_accrued_at: Set(now),
        accrued_earnings_units: Set(0),
        is_active: Set(true),
        is_locked: Set(false),
        slot_type: Set(STANDARD_SLOT_TYPE.to_string()),
        ..Default::default()
    };
    let created = new_slot.insert(&txn).await?;

    activity::append(
        &txn,
        NewActivity {
            user_id,
            kind: ActivityKind::Purchase,
            currency: Currency::Principal,
            amount: -amount,
            description: format!("Purchased mining slot #{}", created.id),
            source_user_id: None,
            slot_id: Some(created.id),
        },
    )
    .await?;

    let mut referral = None;
    if let Some(referrer_id) = buyer.referrer_id {
        let bonus = round_amount(amount * terms.referral_rate);
        if bonus > Decimal::ZERO {
            wallet::credit(&txn, referrer_id, Currency::Yield, bonus).await?;
            activity::append(
                &txn,
                NewActivity {
                    user_id: referrer_id,
                    kind: ActivityKind::Referral,
                    currency: Currency::Yield,
                    amount: bonus,
                    description: format!("Referral bonus for slot #{}", created.id),
                    source_user_id: Some(user_id),
                    slot_id: Some(created.id),
                },
            )
            .await?;
            referral = Some((referrer_id, bonus));
        }
    }

    txn.commit().await?;
    info!(
        "User {} purchased slot {} with principal {}",
        user_id, created.id, amount
    );

    Ok(PurchaseOutcome {
        slot: created,
        principal_balance: funding.balance(),
        referral,
    })
}

/// Finds a slot by id.
pub async fn get_slot_by_id<C>(db: &C, slot_id: i64) -> Result<Option<slot::Model>>
where
    C: ConnectionTrait,
{
    Slot::find_by_id(slot_id).one(db).await.map_err(Into::into)
}

/// A user's active slots, oldest expiry first.
pub async fn get_active_slots_for_user(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<slot::Model>> {
    Slot::find()
        .filter(slot::Column::UserId.eq(user_id))
        .filter(slot::Column::IsActive.eq(true))
        .order_by_asc(slot::Column::ExpiresAt)
        .order_by_asc(slot::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

fn due_condition(now: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(slot::Column::IsActive.eq(true))
        .add(slot::Column::ExpiresAt.lte(now))
}

/// Number of slots due for settlement at `now`.
pub async fn count_due_slots(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<u64> {
    Slot::find()
        .filter(due_condition(now))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Position after the last slot of a batch, ordered by `(expires_at, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueCursor {
    /// Expiry of the last slot read
    pub expires_at: DateTime<Utc>,
    /// Id of the last slot read
    pub id: i64,
}

impl From<&slot::Model> for DueCursor {
    fn from(slot: &slot::Model) -> Self {
        Self {
            expires_at: slot.expires_at,
            id: slot.id,
        }
    }
}

/// Next page of due slots after `after`, oldest expiry first.
///
/// Keyset paging keeps slots that stayed due (failed groups) from being read again
/// in the same sweep, and keeps each page bounded by `limit`.
pub async fn fetch_due_batch(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    after: Option<DueCursor>,
    limit: u64,
) -> Result<Vec<slot::Model>> {
    let mut condition = due_condition(now);
    if let Some(cursor) = after {
        condition = condition.add(
            Condition::any()
                .add(slot::Column::ExpiresAt.gt(cursor.expires_at))
                .add(
                    Condition::all()
                        .add(slot::Column::ExpiresAt.eq(cursor.expires_at))
                        .add(slot::Column::Id.gt(cursor.id)),
                ),
        );
    }

    let batch = Slot::find()
        .filter(condition)
        .order_by_asc(slot::Column::ExpiresAt)
        .order_by_asc(slot::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    debug!("Fetched {} due slots (after {:?})", batch.len(), after);
    Ok(batch)
}

/// Due slots a user may claim themselves: owned by them, active, expired and unlocked.
/// When `slot_ids` is given, only those ids are considered.
pub async fn get_claimable_slots(
    db: &DatabaseConnection,
    user_id: i64,
    slot_ids: Option<&[i64]>,
    now: DateTime<Utc>,
) -> Result<Vec<slot::Model>> {
    let mut query = Slot::find()
        .filter(due_condition(now))
        .filter(slot::Column::UserId.eq(user_id))
        .filter(slot::Column::IsLocked.eq(false));
    if let Some(ids) = slot_ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        query = query.filter(slot::Column::Id.is_in(ids.iter().copied()));
    }
    query
        .order_by_asc(slot::Column::ExpiresAt)
        .order_by_asc(slot::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Sets or clears the claim lock on an active slot.
pub async fn set_slot_locked(db: &DatabaseConnection, slot_id: i64, locked: bool) -> Result<()> {
    let result = Slot::update_many()
        .col_expr(slot::Column::IsLocked, Expr::value(locked))
        .filter(slot::Column::Id.eq(slot_id))
        .filter(slot::Column::IsActive.eq(true))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::SlotNotFound { slot_id });
    }
    Ok(())
}
