//! Shared test utilities for the settlement engine.
//!
//! This module provides common helper functions for setting up test databases
//! and creating users, slots and engines with sensible defaults.

use crate::{
    config::EngineConfig,
    core::{engine::SettlementEngine, user, wallet},
    entities::{Slot, UserModel, money::to_units, slot},
    errors::Result,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use std::path::PathBuf;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// On-disk database whose pool holds several real connections, so transactions
/// run concurrently instead of being serialized by a single in-memory connection.
/// The files are removed on drop.
#[derive(Debug)]
pub struct SharedTestDb {
    /// Pooled connection to the database file
    pub db: DatabaseConnection,
    path: PathBuf,
}

impl Drop for SharedTestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Creates a file-backed database in the temp directory with all tables initialized.
pub async fn setup_shared_test_db(name: &str) -> Result<SharedTestDb> {
    let path = std::env::temp_dir().join(format!(
        "slotminer-{name}-{}-{}.sqlite",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options.max_connections(4).min_connections(2).sqlx_logging(false);
    let db = Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(SharedTestDb { db, path })
}

/// Fixed reference instant so accrual assertions are exact.
#[must_use]
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Creates a user with an empty ledger. `name` becomes the external id.
pub async fn create_test_user(db: &DatabaseConnection, name: &str) -> Result<UserModel> {
    user::resolve_user(db, name).await
}

/// Creates a user and deposits `amount` into their principal wallet.
pub async fn create_funded_user(
    db: &DatabaseConnection,
    name: &str,
    amount: Decimal,
) -> Result<UserModel> {
    let created = user::resolve_user(db, name).await?;
    wallet::deposit(db, created.id, amount, "test funding").await?;
    Ok(created)
}

/// Inserts an active, unlocked slot directly, bypassing purchase.
///
/// # Defaults
/// * `weekly_rate`: 0.30
/// * term: 7 days from `started_at`
/// * no wallet debit and no log entry
pub async fn insert_test_slot(
    db: &DatabaseConnection,
    user_id: i64,
    principal: Decimal,
    started_at: DateTime<Utc>,
) -> Result<slot::Model> {
    let model = slot::ActiveModel {
        user_id: Set(user_id),
        principal_units: Set(to_units(principal)?),
        weekly_rate_units: Set(to_units(Decimal::new(30, 2))?),
        started_at: Set(started_at),
        expires_at: Set(started_at + Duration::days(7)),
        last_accrued_at: Set(started_at),
        accrued_earnings_units: Set(0),
        is_active: Set(true),
        is_locked: Set(false),
        slot_type: Set("standard".to_string()),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

/// Marks a slot settled without touching any wallet.
pub async fn mark_test_slot_inactive(db: &DatabaseConnection, slot_id: i64) -> Result<()> {
    if let Some(found) = Slot::find_by_id(slot_id).one(db).await? {
        let mut active: slot::ActiveModel = found.into();
        active.is_active = Set(false);
        active.update(db).await?;
    }
    Ok(())
}

/// Engine over `db` with default terms and fast retries.
#[must_use]
pub fn test_engine(db: DatabaseConnection) -> SettlementEngine {
    test_engine_with(db, EngineConfig::default())
}

/// Engine over `db` with the given configuration, retry and pause delays shortened.
#[must_use]
pub fn test_engine_with(db: DatabaseConnection, mut config: EngineConfig) -> SettlementEngine {
    config.sweeper.retry_delay_ms = 1;
    config.sweeper.batch_pause_ms = config.sweeper.batch_pause_ms.min(1);
    config.sweeper.notify_timeout_ms = 200;
    SettlementEngine::new(db, config)
}
