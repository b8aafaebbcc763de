//! Activity log entity - the append-only record of every balance change.
//!
//! Rows are never updated or deleted. Summing a user's entries for one currency
//! reproduces that wallet's balance from zero.

use super::{money::from_units, wallet::Currency};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What kind of movement an entry records
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ActivityKind {
    /// Funds arriving from the payment provider
    #[sea_orm(string_value = "deposit")]
    Deposit,
    /// Principal debited to buy a slot
    #[sea_orm(string_value = "purchase")]
    Purchase,
    /// Earnings credited by the sweeper
    #[sea_orm(string_value = "settlement")]
    Settlement,
    /// Earnings credited by a user-initiated claim
    #[sea_orm(string_value = "claim")]
    Claim,
    /// Bonus credited to a referrer
    #[sea_orm(string_value = "referral")]
    Referral,
}

/// Activity log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activity_log")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User whose wallet the entry affects
    #[sea_orm(indexed)]
    pub user_id: i64,
    /// Kind of movement
    pub kind: ActivityKind,
    /// Wallet currency the amount applies to
    pub currency: Currency,
    /// Signed amount in minor units (positive credits, negative debits)
    pub amount_units: i64,
    /// Human-readable description
    pub description: String,
    /// When the entry was written
    pub created_at: DateTimeUtc,
    /// User that caused the entry, for referral attribution
    pub source_user_id: Option<i64>,
    /// Slot the entry relates to, if any
    pub slot_id: Option<i64>,
}

/// Defines relationships between `ActivityLog` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Model {
    /// Signed amount of the entry.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        from_units(self.amount_units)
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
