//! Database configuration module.
//!
//! Handles the ledger store connection and table creation using `SeaORM`. Tables and
//! indexes are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust models.

use crate::entities::{ActivityLog, Slot, SystemState, User, Wallet, WalletColumn};
use crate::errors::Result;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema, sea_query::Index,
};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/slotminer.sqlite?mode=rwc";

/// Gets the database URL from the environment, falling back to a local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to {}", database_url);

    // SQLite creates the file with mode=rwc but not its directory
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        let file = path.split('?').next().unwrap_or(path);
        match std::path::Path::new(file).parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }
    }
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }
    Ok(())
}

/// Creates all ledger tables and their indexes if they do not exist yet.
///
/// Besides the per-column indexes declared on the entities this adds the
/// `(user_id, currency)` unique index that makes wallets one-per-currency.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Wallet).await?;
    create_table(db, &schema, Slot).await?;
    create_table(db, &schema, ActivityLog).await?;
    create_table(db, &schema, SystemState).await?;

    let wallet_unique = Index::create()
        .if_not_exists()
        .name("idx_wallets_user_currency")
        .table(Wallet)
        .col(WalletColumn::UserId)
        .col(WalletColumn::Currency)
        .unique()
        .to_owned();
    db.execute(builder.build(&wallet_unique)).await?;

    info!("Ledger tables ensured");
    Ok(())
}
