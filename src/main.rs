// ABOUTME: CLI entry point for database-syncer
// ABOUTME: Loads config, initializes logging, and routes to the serve or management commands

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use database_syncer::commands::{self, ConflictArgs, ConnectionArgs, TaskArgs, UserArgs};
use database_syncer::config::{default_config_path, Config};
use database_syncer::App;

#[derive(Parser)]
#[command(name = "database-syncer")]
#[command(about = "Synchronize tables and schema objects between MySQL, PostgreSQL, and Oracle", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true, env = "DATABASE_SYNCER_CONFIG")]
    config: Option<PathBuf>,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the task scheduler
    Serve {
        /// Override server.listen from the config
        #[arg(long)]
        listen: Option<String>,
    },
    /// Manage database connections
    Connection(ConnectionArgs),
    /// Manage and run sync tasks
    Task(TaskArgs),
    /// Inspect and resolve data conflicts
    Conflict(ConflictArgs),
    /// Manage users who receive conflict notices
    User(UserArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;

    if let Commands::Serve {
        listen: Some(listen),
    } = &cli.command
    {
        config.server.listen = listen.clone();
    }

    let app = App::build(config).context("Failed to initialize")?;

    match cli.command {
        Commands::Serve { .. } => commands::serve(app).await,
        Commands::Connection(args) => commands::connection::command(&app, args).await,
        Commands::Task(args) => commands::task::command(&app, args).await,
        Commands::Conflict(args) => commands::conflict::command(&app, args).await,
        Commands::User(args) => commands::user::command(&app, args).await,
    }
}
