// ABOUTME: `conflict` subcommands - list detected conflicts and resolve them
// ABOUTME: Resolution writes the chosen snapshot back to the task's target

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::app::App;
use crate::models::{ConflictStatus, Resolution};

#[derive(Args)]
pub struct ConflictArgs {
    #[command(subcommand)]
    command: ConflictCommands,
}

#[derive(Subcommand)]
enum ConflictCommands {
    /// List conflicts, newest first
    List {
        /// pending or resolved
        #[arg(long)]
        status: Option<ConflictStatus>,
    },
    /// Show both snapshots of one conflict
    Show { id: i64 },
    /// Apply the source or target snapshot to the target
    Resolve {
        id: i64,
        /// source or target
        #[arg(long = "use")]
        resolution: Resolution,
        /// Id of the user resolving the conflict
        #[arg(long)]
        by: i64,
    },
}

pub async fn command(app: &App, args: ConflictArgs) -> Result<()> {
    match args.command {
        ConflictCommands::List { status } => {
            let conflicts = app.conflicts.list(status)?;
            if conflicts.is_empty() {
                println!("No conflicts.");
            }
            for c in conflicts {
                println!(
                    "{:>4}  task {:<4} {:<20} {:<16} {:<8} {}",
                    c.id, c.task_id, c.table_name, c.kind, c.status, c.primary_key
                );
            }
        }
        ConflictCommands::Show { id } => {
            let c = app.conflicts.get(id)?;
            println!("Conflict {} on {} ({})", c.id, c.table_name, c.status);
            println!("  key:    {}", c.primary_key);
            println!("  source: {}", c.source_data);
            println!("  target: {}", c.target_data);
            if let (Some(resolution), Some(at)) = (c.resolution, c.resolved_at) {
                println!("  resolved with {} at {}", resolution, at.to_rfc3339());
            }
        }
        ConflictCommands::Resolve { id, resolution, by } => {
            let resolved = app.conflicts.resolve(id, resolution, by).await?;
            println!(
                "✓ Conflict {} resolved with the {} snapshot",
                resolved.id, resolution
            );
        }
    }
    Ok(())
}
