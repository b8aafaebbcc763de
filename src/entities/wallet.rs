//! Wallet entity - one balance per (user, currency).
//!
//! Balances are never overwritten: every change is a delta applied with
//! `balance_units = balance_units + delta` inside a database transaction.

use super::money::from_units;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Currencies a wallet can hold
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Currency {
    /// Funding currency used to purchase slots
    #[sea_orm(string_value = "principal")]
    Principal,
    /// Currency that slot earnings are paid out in
    #[sea_orm(string_value = "yield")]
    Yield,
}

/// Wallet database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    /// Unique identifier for the wallet row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    #[sea_orm(indexed)]
    pub user_id: i64,
    /// Currency held in this wallet
    pub currency: Currency,
    /// Current balance in minor units, never negative
    pub balance_units: i64,
    /// Number of deltas applied since the wallet was created
    pub revision: i64,
    /// Last time a delta was applied
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Current balance.
    #[must_use]
    pub fn balance(&self) -> Decimal {
        from_units(self.balance_units)
    }
}

/// Defines relationships between Wallet and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each wallet belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
