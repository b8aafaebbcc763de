//! Slot entity - a purchased, time-boxed mining position.
//!
//! `expires_at` is fixed at purchase and the term of a slot is always
//! `expires_at - started_at`. `accrued_earnings` is only a snapshot; the live
//! value comes from [`crate::core::accrual`].

use super::money::from_units;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Slot database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "slots")]
pub struct Model {
    /// Unique identifier for the slot
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    #[sea_orm(indexed)]
    pub user_id: i64,
    /// Amount invested, in minor units
    pub principal_units: i64,
    /// Yield over the full term as a fraction (3000 = 30%), in minor units
    pub weekly_rate_units: i64,
    /// When accrual started
    pub started_at: DateTimeUtc,
    /// When the slot becomes due
    #[sea_orm(indexed)]
    pub expires_at: DateTimeUtc,
    /// Last time earnings were moved out of this slot
    pub last_accrued_at: DateTimeUtc,
    /// Earnings snapshot in minor units, final amount once settled
    pub accrued_earnings_units: i64,
    /// False once the slot has been settled
    pub is_active: bool,
    /// Locked slots cannot be claimed by their owner; the sweeper still settles them
    pub is_locked: bool,
    /// Product tag (e.g. `"standard"`)
    pub slot_type: String,
}

/// Defines relationships between Slot and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each slot belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Model {
    /// Amount invested.
    #[must_use]
    pub fn principal(&self) -> Decimal {
        from_units(self.principal_units)
    }

    /// Rate locked in at purchase.
    #[must_use]
    pub fn weekly_rate(&self) -> Decimal {
        from_units(self.weekly_rate_units)
    }

    /// Earnings snapshot.
    #[must_use]
    pub fn accrued_earnings(&self) -> Decimal {
        from_units(self.accrued_earnings_units)
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
