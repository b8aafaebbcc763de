/// Database connection and table creation
pub mod database;

/// Engine settings loaded from a TOML file
pub mod settings;

pub use settings::{
    CacheConfig, EngineConfig, MiningConfig, SweeperConfig, load_config, load_default_config,
};
