//! Wallet operations - lazy creation and delta-only balance changes.
//!
//! Balances change only through [`credit`] and [`debit`], which issue a single
//! `UPDATE wallets SET balance_units = balance_units + delta` so concurrent writers
//! never lose updates. A debit is conditional on `balance_units >= delta`, which
//! keeps balances non-negative without a read-modify-write. Deltas are integer
//! minor units, so the arithmetic is exact on every backend.

use crate::{
    core::{activity, user},
    entities::{ActivityKind, Currency, Wallet, activity_log, money::to_units, wallet},
    errors::{Error, Result},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    QueryOrder, Set, TransactionTrait, prelude::*,
    sea_query::{Expr, OnConflict},
};
use tracing::{error, info};

/// Returns the user's wallet for `currency`, creating an empty one if needed.
pub async fn get_or_create_wallet<C>(
    db: &C,
    user_id: i64,
    currency: Currency,
) -> Result<wallet::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_wallet(db, user_id, currency).await? {
        return Ok(existing);
    }

    let new_wallet = wallet::ActiveModel {
        user_id: Set(user_id),
        currency: Set(currency),
        balance_units: Set(0),
        revision: Set(0),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    Wallet::insert(new_wallet)
        .on_conflict(
            OnConflict::columns([wallet::Column::UserId, wallet::Column::Currency])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    find_wallet(db, user_id, currency)
        .await?
        .ok_or_else(|| Error::InvariantViolation {
            message: format!("wallet for user {user_id} ({currency:?}) missing after insert"),
        })
}

async fn find_wallet<C>(db: &C, user_id: i64, currency: Currency) -> Result<Option<wallet::Model>>
where
    C: ConnectionTrait,
{
    Wallet::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .filter(wallet::Column::Currency.eq(currency))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Current balance, zero when the wallet has not been created yet.
pub async fn get_balance<C>(db: &C, user_id: i64, currency: Currency) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    Ok(find_wallet(db, user_id, currency)
        .await?
        .map_or(Decimal::ZERO, |w| w.balance()))
}

/// All wallets of a user, oldest first.
pub async fn get_wallets_for_user(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<wallet::Model>> {
    Wallet::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .order_by_asc(wallet::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Adds `amount` to the wallet. Must be positive.
pub async fn credit<C>(
    db: &C,
    user_id: i64,
    currency: Currency,
    amount: Decimal,
) -> Result<wallet::Model>
where
    C: ConnectionTrait,
{
    let delta = to_units(amount)?;
    if delta <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let target = get_or_create_wallet(db, user_id, currency).await?;
    Wallet::update_many()
        .col_expr(
            wallet::Column::BalanceUnits,
            Expr::col(wallet::Column::BalanceUnits).add(delta),
        )
        .col_expr(wallet::Column::Revision, Expr::col(wallet::Column::Revision).add(1))
        .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(wallet::Column::Id.eq(target.id))
        .exec(db)
        .await?;

    reload(db, target.id).await
}

/// Subtracts `amount` from the wallet, failing with [`Error::InsufficientFunds`]
/// instead of letting the balance go negative.
pub async fn debit<C>(
    db: &C,
    user_id: i64,
    currency: Currency,
    amount: Decimal,
) -> Result<wallet::Model>
where
    C: ConnectionTrait,
{
    let delta = to_units(amount)?;
    if delta <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let target = get_or_create_wallet(db, user_id, currency).await?;
    let result = Wallet::update_many()
        .col_expr(
            wallet::Column::BalanceUnits,
            Expr::col(wallet::Column::BalanceUnits).sub(delta),
        )
        .col_expr(wallet::Column::Revision, Expr::col(wallet::Column::Revision).add(1))
        .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(wallet::Column::Id.eq(target.id))
        .filter(wallet::Column::BalanceUnits.gte(delta))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let current = reload(db, target.id).await?.balance();
        return Err(Error::InsufficientFunds {
            current,
            required: amount,
        });
    }

    let updated = reload(db, target.id).await?;
    if updated.balance_units < 0 {
        error!(
            "Wallet {} went negative ({}) after debit of {}",
            updated.id,
            updated.balance(),
            amount
        );
        return Err(Error::InvariantViolation {
            message: format!("wallet {} would go negative", updated.id),
        });
    }
    Ok(updated)
}

async fn reload<C>(db: &C, wallet_id: i64) -> Result<wallet::Model>
where
    C: ConnectionTrait,
{
    Wallet::find_by_id(wallet_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::InvariantViolation {
            message: format!("wallet {wallet_id} disappeared"),
        })
}

/// Credits the principal wallet with incoming funds and logs a deposit.
///
/// This is where a payment provider callback lands once funds have cleared.
pub async fn deposit(
    db: &DatabaseConnection,
    user_id: i64,
    amount: Decimal,
    description: &str,
) -> Result<(wallet::Model, activity_log::Model)> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount { amount });
    }

    let txn = db.begin().await?;
    user::require_user(&txn, user_id).await?;

    let updated = credit(&txn, user_id, Currency::Principal, amount).await?;
    let entry = activity::append(
        &txn,
        activity::NewActivity {
            user_id,
            kind: ActivityKind::Deposit,
            currency: Currency::Principal,
            amount,
            description: description.to_string(),
            source_user_id: None,
            slot_id: None,
        },
    )
    .await?;
    txn.commit().await?;

    info!("Deposited {} for user {}", amount, user_id);
    Ok((updated, entry))
}
