//! Operator account commands

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use compass_core::CompassConfig;
use compass_server::db::UserRepo;
use compass_server::models::Role;

#[derive(Parser, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create an operator account
    Add {
        /// Login email (stored lowercase)
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Role: operator or admin
        #[arg(long, default_value = "operator")]
        role: String,
    },
    /// List all accounts
    List,
    /// Disable an account; its sessions stop working
    Disable {
        #[arg(long)]
        email: String,
    },
    /// Re-enable a disabled account
    Enable {
        #[arg(long)]
        email: String,
    },
}

pub async fn run_user(args: UserArgs, config: &CompassConfig) -> Result<()> {
    let pool = super::connect(config).await?;
    let repo = UserRepo::new(&pool);

    match args.command {
        UserCommand::Add { email, name, role } => {
            let role = Role::try_from(role)?;
            let user = repo
                .create(&email, &name, role)
                .await
                .context("Failed to create user")?;
            println!("Created {} ({}) {}", user.email, user.role, user.id);
        }
        UserCommand::List => {
            for user in repo.list().await.context("Failed to list users")? {
                let state = if user.active { "active" } else { "disabled" };
                println!("{:<40} {:<9} {:<9} {}", user.email, user.role, state, user.name);
            }
        }
        UserCommand::Disable { email } => {
            let user = repo.set_active(&email, false).await?;
            println!("Disabled {}", user.email);
        }
        UserCommand::Enable { email } => {
            let user = repo.set_active(&email, true).await?;
            println!("Enabled {}", user.email);
        }
    }
    Ok(())
}
