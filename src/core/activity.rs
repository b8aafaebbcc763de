//! Activity log - append-only history of balance movements, plus the
//! reconciliation check that replays it against wallet balances.

use crate::{
    core::wallet,
    entities::{
        ActivityKind, ActivityLog, Currency, activity_log,
        money::{AMOUNT_SCALE, to_units},
    },
    errors::Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};

/// Fields for a new log entry; `id` and `created_at` are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewActivity {
    /// User whose wallet is affected
    pub user_id: i64,
    /// Kind of movement
    pub kind: ActivityKind,
    /// Currency of the affected wallet
    pub currency: Currency,
    /// Signed amount
    pub amount: Decimal,
    /// Human-readable description
    pub description: String,
    /// User that caused the entry (referrals)
    pub source_user_id: Option<i64>,
    /// Related slot
    pub slot_id: Option<i64>,
}

/// Appends an entry. Entries are never updated or deleted.
pub async fn append<C>(db: &C, entry: NewActivity) -> Result<activity_log::Model>
where
    C: ConnectionTrait,
{
    let model = activity_log::ActiveModel {
        user_id: Set(entry.user_id),
        kind: Set(entry.kind),
        currency: Set(entry.currency),
        amount_units: Set(to_units(entry.amount)?),
        description: Set(entry.description),
        created_at: Set(Utc::now()),
        source_user_id: Set(entry.source_user_id),
        slot_id: Set(entry.slot_id),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

/// Most recent entries for a user, newest first.
pub async fn recent_activity(
    db: &DatabaseConnection,
    user_id: i64,
    limit: u64,
) -> Result<Vec<activity_log::Model>> {
    ActivityLog::find()
        .filter(activity_log::Column::UserId.eq(user_id))
        .order_by_desc(activity_log::Column::CreatedAt)
        .order_by_desc(activity_log::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Entries written for a slot, oldest first.
pub async fn activity_for_slot<C>(db: &C, slot_id: i64) -> Result<Vec<activity_log::Model>>
where
    C: ConnectionTrait,
{
    ActivityLog::find()
        .filter(activity_log::Column::SlotId.eq(slot_id))
        .order_by_asc(activity_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Sum of all entries for a user in one currency.
pub async fn ledger_total<C>(db: &C, user_id: i64, currency: Currency) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    let amounts: Vec<i64> = ActivityLog::find()
        .select_only()
        .column(activity_log::Column::AmountUnits)
        .filter(activity_log::Column::UserId.eq(user_id))
        .filter(activity_log::Column::Currency.eq(currency))
        .into_tuple()
        .all(db)
        .await?;
    let total: i128 = amounts.into_iter().map(i128::from).sum();
    Ok(Decimal::from_i128_with_scale(total, AMOUNT_SCALE).normalize())
}

/// Wallet balance next to the balance replayed from the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// User being checked
    pub user_id: i64,
    /// Currency being checked
    pub currency: Currency,
    /// Balance stored on the wallet row
    pub wallet_balance: Decimal,
    /// Sum of every log entry for the wallet
    pub ledger_total: Decimal,
}

impl Reconciliation {
    /// Whether the two figures agree.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.wallet_balance == self.ledger_total
    }
}

/// Replays the activity log for one wallet and compares it with the stored balance.
pub async fn reconcile_wallet(
    db: &DatabaseConnection,
    user_id: i64,
    currency: Currency,
) -> Result<Reconciliation> {
    let wallet_balance = wallet::get_balance(db, user_id, currency).await?;
    let ledger_total = ledger_total(db, user_id, currency).await?;
    Ok(Reconciliation {
        user_id,
        currency,
        wallet_balance,
        ledger_total,
    })
}

/// Reconciles every wallet the user holds, in wallet creation order.
pub async fn reconcile_user(db: &DatabaseConnection, user_id: i64) -> Result<Vec<Reconciliation>> {
    let mut checks = Vec::new();
    for held in wallet::get_wallets_for_user(db, user_id).await? {
        checks.push(reconcile_wallet(db, user_id, held.currency).await?);
    }
    Ok(checks)
}
