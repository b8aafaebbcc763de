//! User entity - maps an external messaging-platform identity to an internal id.
//!
//! All ledger rows reference the internal `id`; the `external_id` only appears
//! at the edge where chat commands are resolved to users.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Internal user id referenced by wallets, slots and the activity log
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Opaque identifier from the messaging platform
    #[sea_orm(unique)]
    pub external_id: String,
    /// User who referred this one, used for referral attribution
    pub referrer_id: Option<i64>,
    /// When the user was first seen
    pub created_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One user has one wallet per currency
    #[sea_orm(has_many = "super::wallet::Entity")]
    Wallets,
    /// One user has many slots
    #[sea_orm(has_many = "super::slot::Entity")]
    Slots,
    /// One user has many activity log entries
    #[sea_orm(has_many = "super::activity_log::Entity")]
    Activity,
}

impl Related<super::wallet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wallets.def()
    }
}

impl Related<super::slot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Slots.def()
    }
}

impl Related<super::activity_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Activity.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
