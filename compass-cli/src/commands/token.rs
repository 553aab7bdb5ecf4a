//! Session token commands
//!
//! The API has no login route; operators receive tokens from here.

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use compass_core::CompassConfig;
use compass_server::db::UserRepo;

#[derive(Parser, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Issue a bearer token for an active user
    Issue {
        #[arg(long)]
        email: String,
        /// Lifetime in hours (default: [auth] session_ttl_hours)
        #[arg(long)]
        ttl_hours: Option<i64>,
    },
    /// Revoke a token
    Revoke {
        token: String,
    },
    /// Delete expired sessions
    Purge,
}

pub async fn run_token(args: TokenArgs, config: &CompassConfig) -> Result<()> {
    let pool = super::connect(config).await?;
    let repo = UserRepo::new(&pool);

    match args.command {
        TokenCommand::Issue { email, ttl_hours } => {
            let hours = ttl_hours.unwrap_or(config.auth.session_ttl_hours);
            anyhow::ensure!(hours > 0, "--ttl-hours must be positive");

            let user = repo.get_by_email(&email).await.context("Unknown user")?;
            let issued = repo
                .issue_session(user.id, Duration::hours(hours))
                .await
                .context("Failed to issue session")?;

            eprintln!("Token for {} expires {}", user.email, issued.expires_at.to_rfc3339());
            println!("{}", issued.token);
        }
        TokenCommand::Revoke { token } => {
            if repo.revoke(&token).await? {
                println!("Token revoked");
            } else {
                println!("No session for that token");
            }
        }
        TokenCommand::Purge => {
            let purged = repo.purge_expired().await?;
            println!("Purged {} expired session(s)", purged);
        }
    }
    Ok(())
}
