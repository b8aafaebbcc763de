//! Engine bookkeeping in the `system_state` key/value table.
//!
//! The sweeper records when it last ran and a one-line summary of what it did,
//! which operators can read back through [`last_sweep`].

use crate::{
    entities::{SystemState, system_state},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Set, prelude::*};

const LAST_SWEEP_AT_KEY: &str = "last_sweep_at";
const LAST_SWEEP_SUMMARY_KEY: &str = "last_sweep_summary";

/// Most recent sweep as recorded in `system_state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSweep {
    /// When the sweep ran
    pub at: DateTime<Utc>,
    /// One-line summary of the sweep report
    pub summary: String,
}

/// Reads a raw value by key.
pub async fn get_value<C>(db: &C, key: &str) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    let state = SystemState::find()
        .filter(system_state::Column::Key.eq(key))
        .one(db)
        .await?;
    Ok(state.map(|s| s.value))
}

/// Inserts or replaces a value by key.
pub async fn set_value<C>(db: &C, key: &str, value: String) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let existing = SystemState::find()
        .filter(system_state::Column::Key.eq(key))
        .one(db)
        .await?;

    if let Some(state) = existing {
        let mut active_model: system_state::ActiveModel = state.into();
        active_model.value = Set(value);
        active_model.updated_at = Set(now);
        active_model.update(db).await?;
    } else {
        let new_state = system_state::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            updated_at: Set(now),
            ..Default::default()
        };
        new_state.insert(db).await?;
    }
    Ok(())
}

/// Stores the time and summary of a finished sweep.
pub async fn record_sweep(db: &DatabaseConnection, at: DateTime<Utc>, summary: &str) -> Result<()> {
    set_value(db, LAST_SWEEP_AT_KEY, at.to_rfc3339()).await?;
    set_value(db, LAST_SWEEP_SUMMARY_KEY, summary.to_string()).await
}

/// The last recorded sweep, if any sweep has run.
pub async fn last_sweep(db: &DatabaseConnection) -> Result<Option<LastSweep>> {
    let Some(raw_at) = get_value(db, LAST_SWEEP_AT_KEY).await? else {
        return Ok(None);
    };
    let at = DateTime::parse_from_rfc3339(&raw_at)
        .map_err(|e| Error::Config {
            message: format!("Failed to parse last sweep time: {e}"),
        })?
        .with_timezone(&Utc);
    let summary = get_value(db, LAST_SWEEP_SUMMARY_KEY)
        .await?
        .unwrap_or_default();
    Ok(Some(LastSweep { at, summary }))
}
