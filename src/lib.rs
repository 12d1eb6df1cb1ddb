// ABOUTME: Library root for database-syncer
// ABOUTME: Exports the sync engine, scheduler, conflict manager, and HTTP API

pub mod api;
pub mod app;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod conflicts;
pub mod connection;
pub mod error;
pub mod models;
pub mod notify;
pub mod objects;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod token;
pub mod utils;
pub mod value;

pub use app::App;
pub use config::Config;
pub use error::{SyncError, SyncResult};
