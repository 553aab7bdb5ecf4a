//! Command implementations for the compass CLI

pub mod config;
pub mod import;
pub mod migrate;
pub mod serve;
pub mod token;
pub mod user;

use anyhow::{Context, Result};
use compass_core::CompassConfig;
use compass_server::db::PgPool;

pub use config::run_config;
pub use import::run_import;
pub use migrate::run_migrate;
pub use serve::run_serve;
pub use token::run_token;
pub use user::run_user;

/// Connect using the configured database URL and pool size.
pub async fn connect(config: &CompassConfig) -> Result<PgPool> {
    compass_server::db::connect(&config.database)
        .await
        .context("Failed to connect to database (check DATABASE_URL or [database] url)")
}
