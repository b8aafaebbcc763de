use dotenvy::dotenv;
use slotminer::{
    bot,
    config::{self, database},
    core::{SettlementEngine, spawn_sweeper},
    errors::{Error, Result},
};
use std::env;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the engine configuration
    let engine_config = config::load_default_config()
        .inspect_err(|e| error!("Critical error loading configuration: {}", e))?;
    info!("Loaded engine configuration: {:?}", engine_config);

    // 4. Connect to the ledger and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Build the engine and start the background sweeper
    let engine = SettlementEngine::new(db, engine_config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(engine.clone(), shutdown_rx);

    // 6. Run the bot until it stops or Ctrl-C arrives
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    let outcome = tokio::select! {
        result = bot::run_bot(token, engine) => result,
        signal = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            signal.map_err(Error::from)
        }
    };

    // 7. Let an in-flight sweep finish before exiting
    shutdown_tx.send(true).ok();
    if let Err(e) = sweeper.await {
        error!("Sweeper task ended abnormally: {}", e);
    }
    outcome
}
