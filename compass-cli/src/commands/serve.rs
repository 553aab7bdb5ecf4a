//! HTTP server command

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use compass_core::CompassConfig;
use compass_server::db::migrate;
use compass_server::run_server;

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides [server] bind and COMPASS_BIND)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Database URL (overrides config and environment)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Start without applying pending migrations
    #[arg(long)]
    pub skip_migrations: bool,
}

impl ServeArgs {
    /// Flags win over config file and environment.
    fn apply(&self, config: &mut CompassConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if self.cors_permissive {
            config.server.cors_permissive = true;
        }
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
    }
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, mut config: CompassConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    tracing::info!("Starting compass server on {}", config.server.bind);
    let pool = super::connect(&config).await?;

    if args.skip_migrations {
        tracing::warn!("skipping migrations at startup");
    } else {
        migrate::run(&pool).await.context("Failed to apply migrations")?;
    }

    run_server(pool, &config).await.context("Server error")?;
    Ok(())
}
