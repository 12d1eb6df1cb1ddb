// ABOUTME: `task` subcommands - create, list, run, inspect logs, and delete sync tasks
// ABOUTME: `run` executes in the foreground; scheduling only happens under `serve`

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use crate::app::App;
use crate::models::{NewSyncTask, SyncMode};
use crate::scheduler::parse_schedule;

#[derive(Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    command: TaskCommands,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a sync task
    Create {
        name: String,
        /// Source connection id
        #[arg(long)]
        source: i64,
        /// Target connection id
        #[arg(long)]
        target: i64,
        /// Table to sync; omit to sync every table plus schema objects
        #[arg(long, default_value = "")]
        table: String,
        /// Six-field cron expression (sec min hour day month weekday); makes the task scheduled
        #[arg(long)]
        cron: Option<String>,
    },
    /// List sync tasks
    List,
    /// Run a task once and print the result
    Run { id: i64 },
    /// Show the most recent log entries of a task
    Logs {
        id: i64,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete a task
    Delete { id: i64 },
}

pub async fn command(app: &App, args: TaskArgs) -> Result<()> {
    match args.command {
        TaskCommands::Create {
            name,
            source,
            target,
            table,
            cron,
        } => {
            let mode = if cron.is_some() {
                SyncMode::Scheduled
            } else {
                SyncMode::OnDemand
            };
            let new = NewSyncTask {
                name,
                source_db_id: source,
                target_db_id: target,
                table_name: table,
                mode,
                cron_expr: cron,
                created_by: None,
            };
            new.validate()?;
            if let Some(expr) = new.cron_expr.as_deref() {
                parse_schedule(expr)?;
            }
            for id in [source, target] {
                if app.store.get_connection(id)?.is_none() {
                    bail!("Connection {} not found", id);
                }
            }
            let task = app.store.create_task(&new)?;
            println!("Created task {} ({})", task.id, task.name);
        }
        TaskCommands::List => {
            let tasks = app.store.list_tasks()?;
            if tasks.is_empty() {
                println!("No sync tasks.");
            }
            for t in tasks {
                let table = if t.is_whole_database() {
                    "*"
                } else {
                    t.table_name.as_str()
                };
                let last = t
                    .last_sync_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:>4}  {:<20} {} -> {} [{}] {:<9} {:<8} last: {}",
                    t.id, t.name, t.source_db_id, t.target_db_id, table, t.mode, t.status, last
                );
            }
        }
        TaskCommands::Run { id } => {
            let stats = app.scheduler.execute(id).await?;
            println!(
                "Synced {} row(s) across {} table(s) in {} ms",
                stats.rows_synced, stats.tables_synced, stats.duration_ms
            );
            if stats.conflicts_detected > 0 {
                println!("⚠ {} conflict(s) recorded", stats.conflicts_detected);
            }
            if let Some(objects) = &stats.objects {
                println!(
                    "Objects: {} created, {} updated, {} failed",
                    objects.created, objects.updated, objects.failed
                );
            }
            if !stats.is_success() {
                bail!("Sync finished with {} error(s); see `task logs {}`", stats.errors.len(), id);
            }
        }
        TaskCommands::Logs { id, limit } => {
            for entry in app.store.list_sync_logs(id, limit)? {
                println!(
                    "{} {:<7} {}",
                    entry.created_at.to_rfc3339(),
                    entry.level,
                    entry.message
                );
                if let Some(details) = entry.details {
                    println!("    {}", details);
                }
            }
        }
        TaskCommands::Delete { id } => {
            app.scheduler.unregister(id);
            if !app.store.delete_task(id)? {
                bail!("Task {} not found", id);
            }
            println!("Deleted task {}", id);
        }
    }
    Ok(())
}
