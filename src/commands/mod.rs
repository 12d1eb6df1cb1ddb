// ABOUTME: CLI command implementations
// ABOUTME: Each subcommand works against the same App the HTTP server uses

pub mod conflict;
pub mod connection;
pub mod serve;
pub mod task;
pub mod user;

pub use conflict::ConflictArgs;
pub use connection::ConnectionArgs;
pub use serve::serve;
pub use task::TaskArgs;
pub use user::UserArgs;
