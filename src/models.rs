// ABOUTME: Records persisted in the metadata store and exchanged over the API
// ABOUTME: Connections, sync tasks, logs, conflicts, and users with their status enums

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(value: &str) -> Result<Self> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => bail!("invalid {} '{}'", stringify!($name), other),
                }
            }
        }
    };
}

/// SQL dialect of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    Postgres,
    Oracle,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Oracle => "oracle",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Dialect::Mysql => 3306,
            Dialect::Postgres => 5432,
            Dialect::Oracle => 1521,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "oracle" => Ok(Dialect::Oracle),
            other => bail!("unsupported database type '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Inactive,
}

string_enum!(RecordStatus { Active => "active", Inactive => "inactive" });

/// Where to find a database and how to log in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub id: i64,
    pub name: String,
    pub dialect: Dialect,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub description: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionDescriptor {
    /// Connection URL with the password masked, for logs and error messages.
    pub fn display_url(&self) -> String {
        let raw = format!(
            "{}://{}@{}:{}/{}",
            self.dialect, self.username, self.host, self.port, self.database
        );
        match url::Url::parse(&raw) {
            Ok(mut parsed) => {
                if !self.password.is_empty() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => raw,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewConnection {
    pub name: String,
    pub dialect: Dialect,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub description: String,
}

impl NewConnection {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("connection name is required");
        }
        if self.host.trim().is_empty() {
            bail!("host is required");
        }
        if self.database.trim().is_empty() {
            bail!("database is required");
        }
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.dialect.default_port())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    OnDemand,
    Scheduled,
}

string_enum!(SyncMode { OnDemand => "on_demand", Scheduled => "scheduled" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Stopped,
    Running,
    Error,
}

string_enum!(TaskStatus { Stopped => "stopped", Running => "running", Error => "error" });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: i64,
    pub name: String,
    pub source_db_id: i64,
    pub target_db_id: i64,
    /// Empty means every table in the source database.
    pub table_name: String,
    pub mode: SyncMode,
    pub cron_expr: Option<String>,
    pub status: TaskStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl SyncTask {
    pub fn is_whole_database(&self) -> bool {
        self.table_name.trim().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSyncTask {
    pub name: String,
    pub source_db_id: i64,
    pub target_db_id: i64,
    #[serde(default)]
    pub table_name: String,
    pub mode: SyncMode,
    #[serde(default)]
    pub cron_expr: Option<String>,
    #[serde(default)]
    pub created_by: Option<i64>,
}

impl NewSyncTask {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("task name is required");
        }
        let has_schedule = self
            .cron_expr
            .as_deref()
            .map(|expr| !expr.trim().is_empty())
            .unwrap_or(false);
        match self.mode {
            SyncMode::Scheduled if !has_schedule => {
                bail!("cron_expr is required for scheduled tasks")
            }
            SyncMode::OnDemand if has_schedule => {
                bail!("cron_expr is only valid for scheduled tasks")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

string_enum!(LogLevel { Info => "info", Warning => "warning", Error => "error" });

#[derive(Debug, Clone, Serialize)]
pub struct SyncLog {
    pub id: i64,
    pub task_id: i64,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    View,
    Procedure,
    Function,
    Trigger,
}

string_enum!(ObjectKind {
    View => "view",
    Procedure => "procedure",
    Function => "function",
    Trigger => "trigger",
});

impl ObjectKind {
    /// Order used for whole-database syncs; later kinds may depend on earlier ones.
    pub const SYNC_ORDER: [ObjectKind; 4] = [
        ObjectKind::View,
        ObjectKind::Procedure,
        ObjectKind::Function,
        ObjectKind::Trigger,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            ObjectKind::View => "VIEW",
            ObjectKind::Procedure => "PROCEDURE",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::Trigger => "TRIGGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectAction {
    Create,
    Update,
    Delete,
    Skip,
}

string_enum!(ObjectAction {
    Create => "create",
    Update => "update",
    Delete => "delete",
    Skip => "skip",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

string_enum!(OutcomeStatus { Success => "success", Failed => "failed" });

#[derive(Debug, Clone, Serialize)]
pub struct ObjectSyncLog {
    pub id: i64,
    pub task_id: i64,
    pub object_kind: ObjectKind,
    pub object_name: String,
    pub action: ObjectAction,
    pub status: OutcomeStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewObjectSyncLog {
    pub task_id: i64,
    pub object_kind: ObjectKind,
    pub object_name: String,
    pub action: ObjectAction,
    pub status: OutcomeStatus,
    pub message: String,
}

/// A schema object seen in a live catalog. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseObject {
    pub kind: ObjectKind,
    pub name: String,
    pub owning_table: Option<String>,
    pub schema: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    UpdateConflict,
    DeleteConflict,
}

string_enum!(ConflictKind {
    UpdateConflict => "update_conflict",
    DeleteConflict => "delete_conflict",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Resolved,
}

string_enum!(ConflictStatus { Pending => "pending", Resolved => "resolved" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Source,
    Target,
}

string_enum!(Resolution { Source => "source", Target => "target" });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataConflict {
    pub id: i64,
    pub task_id: i64,
    pub table_name: String,
    /// Canonical JSON of the primary-key columns.
    pub primary_key: String,
    pub source_data: String,
    pub target_data: String,
    pub kind: ConflictKind,
    pub status: ConflictStatus,
    pub resolution: Option<Resolution>,
    pub resolved_by: Option<i64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConflict {
    pub task_id: i64,
    pub table_name: String,
    pub primary_key: String,
    pub source_data: String,
    pub target_data: String,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
}

string_enum!(UserRole { Admin => "admin", User => "user" });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: UserRole,
}
