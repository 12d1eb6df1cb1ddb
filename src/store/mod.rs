// ABOUTME: Metadata store interface - connections, tasks, logs, conflicts, users
// ABOUTME: The engine talks to this trait only; SqliteStore is the bundled backend

mod sqlite;

pub use sqlite::SqliteStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{
    ConflictStatus, ConnectionDescriptor, DataConflict, LogLevel, NewConflict, NewConnection,
    NewObjectSyncLog, NewSyncTask, NewUser, ObjectSyncLog, Resolution, SyncLog, SyncTask,
    TaskStatus, User,
};

/// Record-level persistence for everything the engine reads or writes.
///
/// Calls are short and synchronous; async callers invoke them directly.
pub trait MetadataStore: Send + Sync {
    fn create_connection(&self, new: &NewConnection) -> Result<ConnectionDescriptor>;
    fn get_connection(&self, id: i64) -> Result<Option<ConnectionDescriptor>>;
    fn list_connections(&self) -> Result<Vec<ConnectionDescriptor>>;
    /// Returns the updated record, or `None` if `id` does not exist.
    fn update_connection(&self, id: i64, update: &NewConnection)
        -> Result<Option<ConnectionDescriptor>>;
    fn delete_connection(&self, id: i64) -> Result<bool>;

    fn create_task(&self, new: &NewSyncTask) -> Result<SyncTask>;
    fn get_task(&self, id: i64) -> Result<Option<SyncTask>>;
    fn list_tasks(&self) -> Result<Vec<SyncTask>>;
    fn delete_task(&self, id: i64) -> Result<bool>;
    fn set_task_status(&self, id: i64, status: TaskStatus) -> Result<()>;
    /// Status plus `last_sync_at`, written when a run finishes.
    fn record_task_run(&self, id: i64, status: TaskStatus, finished_at: DateTime<Utc>)
        -> Result<()>;

    fn append_sync_log(
        &self,
        task_id: i64,
        level: LogLevel,
        message: &str,
        details: Option<&str>,
    ) -> Result<()>;
    /// Newest first.
    fn list_sync_logs(&self, task_id: i64, limit: usize) -> Result<Vec<SyncLog>>;
    fn append_object_log(&self, entry: &NewObjectSyncLog) -> Result<()>;
    /// Newest first.
    fn list_object_logs(&self, task_id: i64, limit: usize) -> Result<Vec<ObjectSyncLog>>;

    fn create_conflict(&self, new: &NewConflict) -> Result<DataConflict>;
    fn get_conflict(&self, id: i64) -> Result<Option<DataConflict>>;
    fn list_conflicts(&self, status: Option<ConflictStatus>) -> Result<Vec<DataConflict>>;
    /// Move a pending conflict to resolved.
    ///
    /// Returns false when the conflict is missing or was already resolved.
    fn mark_conflict_resolved(
        &self,
        id: i64,
        resolution: Resolution,
        resolved_by: i64,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool>;

    fn create_user(&self, new: &NewUser) -> Result<User>;
    fn list_users(&self) -> Result<Vec<User>>;
    /// Active users with the admin role; conflict notices go to them.
    fn active_admins(&self) -> Result<Vec<User>>;
}
