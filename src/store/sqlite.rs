// ABOUTME: SQLite-backed metadata store using rusqlite
// ABOUTME: One connection behind a mutex; schema is created on open

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::MetadataStore;
use crate::models::{
    ConflictStatus, ConnectionDescriptor, DataConflict, LogLevel, NewConflict, NewConnection,
    NewObjectSyncLog, NewSyncTask, NewUser, ObjectSyncLog, RecordStatus, Resolution, SyncLog,
    SyncTask, TaskStatus, User, UserRole,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE,
    email       TEXT NOT NULL,
    role        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'active',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS connections (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    dialect      TEXT NOT NULL,
    host         TEXT NOT NULL,
    port         INTEGER NOT NULL,
    username     TEXT NOT NULL,
    password     TEXT NOT NULL,
    database     TEXT NOT NULL,
    description  TEXT NOT NULL DEFAULT '',
    status       TEXT NOT NULL DEFAULT 'active',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_tasks (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    source_db_id  INTEGER NOT NULL,
    target_db_id  INTEGER NOT NULL,
    table_name    TEXT NOT NULL DEFAULT '',
    mode          TEXT NOT NULL,
    cron_expr     TEXT,
    status        TEXT NOT NULL DEFAULT 'stopped',
    last_sync_at  TEXT,
    created_by    INTEGER,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id     INTEGER NOT NULL,
    level       TEXT NOT NULL,
    message     TEXT NOT NULL,
    details     TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sync_logs_task ON sync_logs(task_id, id);

CREATE TABLE IF NOT EXISTS object_sync_logs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id      INTEGER NOT NULL,
    object_kind  TEXT NOT NULL,
    object_name  TEXT NOT NULL,
    action       TEXT NOT NULL,
    status       TEXT NOT NULL,
    message      TEXT NOT NULL DEFAULT '',
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_object_sync_logs_task ON object_sync_logs(task_id, id);

CREATE TABLE IF NOT EXISTS data_conflicts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id      INTEGER NOT NULL,
    table_name   TEXT NOT NULL,
    primary_key  TEXT NOT NULL,
    source_data  TEXT NOT NULL,
    target_data  TEXT NOT NULL,
    kind         TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    resolution   TEXT,
    resolved_by  INTEGER,
    resolved_at  TEXT,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_data_conflicts_status ON data_conflicts(status);
"#;

const CONNECTION_COLUMNS: &str = "id, name, dialect, host, port, username, password, database, \
                                  description, status, created_at, updated_at";
const TASK_COLUMNS: &str = "id, name, source_db_id, target_db_id, table_name, mode, cron_expr, \
                            status, last_sync_at, created_by, created_at";
const CONFLICT_COLUMNS: &str = "id, task_id, table_name, primary_key, source_data, target_data, \
                                kind, status, resolution, resolved_by, resolved_at, created_at";
const USER_COLUMNS: &str = "id, username, email, role, status, created_at";

/// Metadata store in a single SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create store directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open metadata store {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "wal")
            .context("failed to enable WAL for metadata store")?;
        conn.pragma_update(None, "synchronous", "normal").ok();
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to initialize metadata schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("metadata store lock poisoned"))
    }
}

fn read_connection(row: &rusqlite::Row<'_>) -> Result<ConnectionDescriptor> {
    let dialect: String = row.get(2)?;
    let port: i64 = row.get(4)?;
    let status: String = row.get(9)?;
    Ok(ConnectionDescriptor {
        id: row.get(0)?,
        name: row.get(1)?,
        dialect: dialect.parse()?,
        host: row.get(3)?,
        port: u16::try_from(port).with_context(|| format!("invalid stored port {}", port))?,
        username: row.get(5)?,
        password: row.get(6)?,
        database: row.get(7)?,
        description: row.get(8)?,
        status: status.parse()?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn read_task(row: &rusqlite::Row<'_>) -> Result<SyncTask> {
    let mode: String = row.get(5)?;
    let status: String = row.get(7)?;
    Ok(SyncTask {
        id: row.get(0)?,
        name: row.get(1)?,
        source_db_id: row.get(2)?,
        target_db_id: row.get(3)?,
        table_name: row.get(4)?,
        mode: mode.parse()?,
        cron_expr: row.get(6)?,
        status: status.parse()?,
        last_sync_at: row.get(8)?,
        created_by: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn read_conflict(row: &rusqlite::Row<'_>) -> Result<DataConflict> {
    let kind: String = row.get(6)?;
    let status: String = row.get(7)?;
    let resolution: Option<String> = row.get(8)?;
    Ok(DataConflict {
        id: row.get(0)?,
        task_id: row.get(1)?,
        table_name: row.get(2)?,
        primary_key: row.get(3)?,
        source_data: row.get(4)?,
        target_data: row.get(5)?,
        kind: kind.parse()?,
        status: status.parse()?,
        resolution: resolution.map(|r| r.parse()).transpose()?,
        resolved_by: row.get(9)?,
        resolved_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn read_user(row: &rusqlite::Row<'_>) -> Result<User> {
    let role: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        role: role.parse()?,
        status: status.parse()?,
        created_at: row.get(5)?,
    })
}

/// Run `sql` and map every row with `read`.
fn collect<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    read: fn(&rusqlite::Row<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read(row)?);
    }
    Ok(out)
}

fn find_one<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    read: fn(&rusqlite::Row<'_>) -> Result<T>,
) -> Result<Option<T>> {
    Ok(collect(conn, sql, params, read)?.into_iter().next())
}

impl MetadataStore for SqliteStore {
    fn create_connection(&self, new: &NewConnection) -> Result<ConnectionDescriptor> {
        new.validate()?;
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO connections(name, dialect, host, port, username, password, database, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                new.name,
                new.dialect.as_str(),
                new.host,
                i64::from(new.port()),
                new.username,
                new.password,
                new.database,
                new.description,
                RecordStatus::Active.as_str(),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        find_one(
            &conn,
            &format!("SELECT {} FROM connections WHERE id = ?1", CONNECTION_COLUMNS),
            [id],
            read_connection,
        )?
        .ok_or_else(|| anyhow!("connection {} vanished after insert", id))
    }

    fn get_connection(&self, id: i64) -> Result<Option<ConnectionDescriptor>> {
        let conn = self.conn()?;
        find_one(
            &conn,
            &format!("SELECT {} FROM connections WHERE id = ?1", CONNECTION_COLUMNS),
            [id],
            read_connection,
        )
    }

    fn list_connections(&self) -> Result<Vec<ConnectionDescriptor>> {
        let conn = self.conn()?;
        collect(
            &conn,
            &format!("SELECT {} FROM connections ORDER BY id", CONNECTION_COLUMNS),
            [],
            read_connection,
        )
    }

    fn update_connection(
        &self,
        id: i64,
        update: &NewConnection,
    ) -> Result<Option<ConnectionDescriptor>> {
        update.validate()?;
        let conn = self.conn()?;
        // An empty password in an update keeps the stored one.
        let changed = conn.execute(
            "UPDATE connections
             SET name = ?2, dialect = ?3, host = ?4, port = ?5, username = ?6,
                 password = CASE WHEN ?7 = '' THEN password ELSE ?7 END,
                 database = ?8, description = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                id,
                update.name,
                update.dialect.as_str(),
                update.host,
                i64::from(update.port()),
                update.username,
                update.password,
                update.database,
                update.description,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        find_one(
            &conn,
            &format!("SELECT {} FROM connections WHERE id = ?1", CONNECTION_COLUMNS),
            [id],
            read_connection,
        )
    }

    fn delete_connection(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM connections WHERE id = ?1", [id])? > 0)
    }

    fn create_task(&self, new: &NewSyncTask) -> Result<SyncTask> {
        new.validate()?;
        let conn = self.conn()?;
        let cron_expr = new
            .cron_expr
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty());
        conn.execute(
            "INSERT INTO sync_tasks(name, source_db_id, target_db_id, table_name, mode, cron_expr, status, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new.name,
                new.source_db_id,
                new.target_db_id,
                new.table_name.trim(),
                new.mode.as_str(),
                cron_expr,
                TaskStatus::Stopped.as_str(),
                new.created_by,
                Utc::now(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        find_one(
            &conn,
            &format!("SELECT {} FROM sync_tasks WHERE id = ?1", TASK_COLUMNS),
            [id],
            read_task,
        )?
        .ok_or_else(|| anyhow!("task {} vanished after insert", id))
    }

    fn get_task(&self, id: i64) -> Result<Option<SyncTask>> {
        let conn = self.conn()?;
        find_one(
            &conn,
            &format!("SELECT {} FROM sync_tasks WHERE id = ?1", TASK_COLUMNS),
            [id],
            read_task,
        )
    }

    fn list_tasks(&self) -> Result<Vec<SyncTask>> {
        let conn = self.conn()?;
        collect(
            &conn,
            &format!("SELECT {} FROM sync_tasks ORDER BY id", TASK_COLUMNS),
            [],
            read_task,
        )
    }

    fn delete_task(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM sync_tasks WHERE id = ?1", [id])? > 0)
    }

    fn set_task_status(&self, id: i64, status: TaskStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sync_tasks SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Ok(())
    }

    fn record_task_run(
        &self,
        id: i64,
        status: TaskStatus,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sync_tasks SET status = ?2, last_sync_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), finished_at],
        )?;
        Ok(())
    }

    fn append_sync_log(
        &self,
        task_id: i64,
        level: LogLevel,
        message: &str,
        details: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_logs(task_id, level, message, details, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![task_id, level.as_str(), message, details, Utc::now()],
        )?;
        Ok(())
    }

    fn list_sync_logs(&self, task_id: i64, limit: usize) -> Result<Vec<SyncLog>> {
        let conn = self.conn()?;
        collect(
            &conn,
            "SELECT id, task_id, level, message, details, created_at FROM sync_logs
             WHERE task_id = ?1 ORDER BY id DESC LIMIT ?2",
            params![task_id, limit as i64],
            |row| {
                let level: String = row.get(2)?;
                Ok(SyncLog {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    level: level.parse()?,
                    message: row.get(3)?,
                    details: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
    }

    fn append_object_log(&self, entry: &NewObjectSyncLog) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO object_sync_logs(task_id, object_kind, object_name, action, status, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.task_id,
                entry.object_kind.as_str(),
                entry.object_name,
                entry.action.as_str(),
                entry.status.as_str(),
                entry.message,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    fn list_object_logs(&self, task_id: i64, limit: usize) -> Result<Vec<ObjectSyncLog>> {
        let conn = self.conn()?;
        collect(
            &conn,
            "SELECT id, task_id, object_kind, object_name, action, status, message, created_at
             FROM object_sync_logs WHERE task_id = ?1 ORDER BY id DESC LIMIT ?2",
            params![task_id, limit as i64],
            |row| {
                let kind: String = row.get(2)?;
                let action: String = row.get(4)?;
                let status: String = row.get(5)?;
                Ok(ObjectSyncLog {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    object_kind: kind.parse()?,
                    object_name: row.get(3)?,
                    action: action.parse()?,
                    status: status.parse()?,
                    message: row.get(6)?,
                    created_at: row.get(7)?,
                })
            },
        )
    }

    fn create_conflict(&self, new: &NewConflict) -> Result<DataConflict> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO data_conflicts(task_id, table_name, primary_key, source_data, target_data, kind, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.task_id,
                new.table_name,
                new.primary_key,
                new.source_data,
                new.target_data,
                new.kind.as_str(),
                ConflictStatus::Pending.as_str(),
                Utc::now(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        find_one(
            &conn,
            &format!("SELECT {} FROM data_conflicts WHERE id = ?1", CONFLICT_COLUMNS),
            [id],
            read_conflict,
        )?
        .ok_or_else(|| anyhow!("conflict {} vanished after insert", id))
    }

    fn get_conflict(&self, id: i64) -> Result<Option<DataConflict>> {
        let conn = self.conn()?;
        find_one(
            &conn,
            &format!("SELECT {} FROM data_conflicts WHERE id = ?1", CONFLICT_COLUMNS),
            [id],
            read_conflict,
        )
    }

    fn list_conflicts(&self, status: Option<ConflictStatus>) -> Result<Vec<DataConflict>> {
        let conn = self.conn()?;
        match status {
            Some(status) => collect(
                &conn,
                &format!(
                    "SELECT {} FROM data_conflicts WHERE status = ?1 ORDER BY id DESC",
                    CONFLICT_COLUMNS
                ),
                [status.as_str()],
                read_conflict,
            ),
            None => collect(
                &conn,
                &format!("SELECT {} FROM data_conflicts ORDER BY id DESC", CONFLICT_COLUMNS),
                [],
                read_conflict,
            ),
        }
    }

    fn mark_conflict_resolved(
        &self,
        id: i64,
        resolution: Resolution,
        resolved_by: i64,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE data_conflicts
             SET status = ?2, resolution = ?3, resolved_by = ?4, resolved_at = ?5
             WHERE id = ?1 AND status = ?6",
            params![
                id,
                ConflictStatus::Resolved.as_str(),
                resolution.as_str(),
                resolved_by,
                resolved_at,
                ConflictStatus::Pending.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn create_user(&self, new: &NewUser) -> Result<User> {
        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                [&new.username],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            anyhow::bail!("user '{}' already exists", new.username);
        }
        conn.execute(
            "INSERT INTO users(username, email, role, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.username,
                new.email,
                new.role.as_str(),
                RecordStatus::Active.as_str(),
                Utc::now(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        find_one(
            &conn,
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [id],
            read_user,
        )?
        .ok_or_else(|| anyhow!("user {} vanished after insert", id))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        collect(
            &conn,
            &format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS),
            [],
            read_user,
        )
    }

    fn active_admins(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        collect(
            &conn,
            &format!(
                "SELECT {} FROM users WHERE role = ?1 AND status = ?2 ORDER BY id",
                USER_COLUMNS
            ),
            [UserRole::Admin.as_str(), RecordStatus::Active.as_str()],
            read_user,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictKind, Dialect, SyncMode};

    fn new_connection(name: &str, dialect: Dialect) -> NewConnection {
        NewConnection {
            name: name.to_string(),
            dialect,
            host: "localhost".to_string(),
            port: None,
            username: "app".to_string(),
            password: "pw".to_string(),
            database: "shop".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_connection_defaults_port_from_dialect() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store
            .create_connection(&new_connection("src", Dialect::Mysql))
            .unwrap();
        assert_eq!(created.port, 3306);
        assert_eq!(created.status, RecordStatus::Active);
        assert_eq!(store.get_connection(created.id).unwrap(), Some(created));
    }

    #[test]
    fn test_update_keeps_password_when_blank() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store
            .create_connection(&new_connection("src", Dialect::Postgres))
            .unwrap();

        let mut update = new_connection("renamed", Dialect::Postgres);
        update.password = String::new();
        let updated = store.update_connection(created.id, &update).unwrap().unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.password, "pw");

        assert!(store.update_connection(999, &update).unwrap().is_none());
    }

    #[test]
    fn test_task_run_recorded() {
        let store = SqliteStore::open_in_memory().unwrap();
        let task = store
            .create_task(&NewSyncTask {
                name: "users".to_string(),
                source_db_id: 1,
                target_db_id: 2,
                table_name: " users ".to_string(),
                mode: SyncMode::OnDemand,
                cron_expr: None,
                created_by: Some(1),
            })
            .unwrap();
        assert_eq!(task.status, TaskStatus::Stopped);
        assert_eq!(task.table_name, "users");
        assert!(task.last_sync_at.is_none());

        let finished = Utc::now();
        store
            .record_task_run(task.id, TaskStatus::Error, finished)
            .unwrap();
        let task = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.last_sync_at, Some(finished));
    }

    #[test]
    fn test_conflict_resolves_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conflict = store
            .create_conflict(&NewConflict {
                task_id: 1,
                table_name: "users".to_string(),
                primary_key: r#"{"id":1}"#.to_string(),
                source_data: r#"{"email":"a@x.com","id":1}"#.to_string(),
                target_data: r#"{"email":"b@x.com","id":1}"#.to_string(),
                kind: ConflictKind::UpdateConflict,
            })
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::Pending);

        let now = Utc::now();
        assert!(store
            .mark_conflict_resolved(conflict.id, Resolution::Target, 5, now)
            .unwrap());
        assert!(!store
            .mark_conflict_resolved(conflict.id, Resolution::Source, 6, now)
            .unwrap());

        let stored = store.get_conflict(conflict.id).unwrap().unwrap();
        assert_eq!(stored.status, ConflictStatus::Resolved);
        assert_eq!(stored.resolution, Some(Resolution::Target));
        assert_eq!(stored.resolved_by, Some(5));
        assert_eq!(stored.resolved_at, Some(now));

        assert!(store
            .list_conflicts(Some(ConflictStatus::Pending))
            .unwrap()
            .is_empty());
        assert_eq!(store.list_conflicts(None).unwrap().len(), 1);
    }

    #[test]
    fn test_active_admins_filters_role() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create_user(&NewUser {
                username: "root".to_string(),
                email: "root@example.com".to_string(),
                role: UserRole::Admin,
            })
            .unwrap();
        store
            .create_user(&NewUser {
                username: "viewer".to_string(),
                email: "viewer@example.com".to_string(),
                role: UserRole::User,
            })
            .unwrap();

        let admins = store.active_admins().unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].username, "root");

        assert!(store
            .create_user(&NewUser {
                username: "root".to_string(),
                email: "dup@example.com".to_string(),
                role: UserRole::User,
            })
            .is_err());
    }

    #[test]
    fn test_logs_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .append_sync_log(1, LogLevel::Info, "first", None)
            .unwrap();
        store
            .append_sync_log(1, LogLevel::Error, "second", Some("boom"))
            .unwrap();
        store
            .append_sync_log(2, LogLevel::Info, "other task", None)
            .unwrap();

        let logs = store.list_sync_logs(1, 10).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "second");
        assert_eq!(logs[0].details.as_deref(), Some("boom"));
        assert_eq!(store.list_sync_logs(1, 1).unwrap().len(), 1);
    }
}
