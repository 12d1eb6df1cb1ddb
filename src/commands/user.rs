// ABOUTME: `user` subcommands - manage the directory that receives conflict notices
// ABOUTME: Only active admins are notified

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::app::App;
use crate::models::{NewUser, UserRole};

#[derive(Args)]
pub struct UserArgs {
    #[command(subcommand)]
    command: UserCommands,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        username: String,
        email: String,
        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },
    /// List users
    List,
}

pub async fn command(app: &App, args: UserArgs) -> Result<()> {
    match args.command {
        UserCommands::Add {
            username,
            email,
            admin,
        } => {
            let role = if admin { UserRole::Admin } else { UserRole::User };
            let user = app.store.create_user(&NewUser {
                username,
                email,
                role,
            })?;
            println!("Added {} {} <{}>", user.role, user.username, user.email);
        }
        UserCommands::List => {
            for u in app.store.list_users()? {
                println!(
                    "{:>4}  {:<20} {:<30} {:<6} {}",
                    u.id, u.username, u.email, u.role, u.status
                );
            }
        }
    }
    Ok(())
}
