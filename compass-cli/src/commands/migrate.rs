//! Schema migration commands

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use compass_core::CompassConfig;
use compass_server::db::migrate;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommand,
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    /// Apply all pending migrations
    Run,
    /// List migrations and whether each is applied
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub async fn run_migrate(args: MigrateArgs, config: &CompassConfig) -> Result<()> {
    let pool = super::connect(config).await?;

    match args.command {
        MigrateCommand::Run => {
            migrate::run(&pool).await.context("Failed to apply migrations")?;
            println!("Migrations are up to date");
        }
        MigrateCommand::Status { json } => {
            let status = migrate::status(&pool)
                .await
                .context("Failed to read migration status")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                for m in &status {
                    let installed = m
                        .installed_on
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let mark = if m.applied { "applied" } else { "pending" };
                    println!("{:>16}  {:<8} {:<17} {}", m.version, mark, installed, m.description);
                }
            }
        }
    }
    Ok(())
}
