// ABOUTME: `connection` subcommands - register, list, test, and remove databases
// ABOUTME: Passwords are accepted from the environment so they stay out of shell history

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use crate::app::App;
use crate::models::{Dialect, NewConnection};

#[derive(Args)]
pub struct ConnectionArgs {
    #[command(subcommand)]
    command: ConnectionCommands,
}

#[derive(Subcommand)]
enum ConnectionCommands {
    /// Register a database connection
    Add {
        /// Display name
        name: String,
        /// mysql, postgres, or oracle
        #[arg(long)]
        dialect: Dialect,
        #[arg(long)]
        host: String,
        /// Defaults to the dialect's standard port
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        username: String,
        #[arg(long, env = "DATABASE_SYNCER_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,
        /// Database (PostgreSQL/MySQL) or service name (Oracle)
        #[arg(long)]
        database: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List registered connections
    List,
    /// Open a connection and ping it
    Test { id: i64 },
    /// Remove a connection
    Remove { id: i64 },
}

pub async fn command(app: &App, args: ConnectionArgs) -> Result<()> {
    match args.command {
        ConnectionCommands::Add {
            name,
            dialect,
            host,
            port,
            username,
            password,
            database,
            description,
        } => {
            let new = NewConnection {
                name,
                dialect,
                host,
                port,
                username,
                password,
                database,
                description,
            };
            new.validate()?;
            let created = app
                .store
                .create_connection(&new)
                .context("Failed to save connection")?;
            println!(
                "Added connection {} ({}) -> {}",
                created.id,
                created.name,
                created.display_url()
            );
        }
        ConnectionCommands::List => {
            let connections = app.store.list_connections()?;
            if connections.is_empty() {
                println!("No connections registered.");
            }
            for c in connections {
                println!("{:>4}  {:<20} {:<8} {}", c.id, c.name, c.dialect, c.display_url());
            }
        }
        ConnectionCommands::Test { id } => {
            let descriptor = app
                .store
                .get_connection(id)?
                .with_context(|| format!("Connection {} not found", id))?;
            app.provider.test(&descriptor).await?;
            println!("✓ Connection {} ({}) is reachable", id, descriptor.name);
        }
        ConnectionCommands::Remove { id } => {
            if !app.store.delete_connection(id)? {
                bail!("Connection {} not found", id);
            }
            app.provider.close(id).await;
            println!("Removed connection {}", id);
        }
    }
    Ok(())
}
