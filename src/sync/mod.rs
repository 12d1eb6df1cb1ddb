// ABOUTME: Table sync engine - streams source rows into the target and detects divergence
// ABOUTME: One run covers a single table or, for whole-database tasks, every table plus objects

pub mod conflict;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::conflicts::ConflictManager;
use crate::connection::{ConnectionProvider, SqlClient};
use crate::error::{SyncError, SyncResult};
use crate::models::{ConflictKind, ConnectionDescriptor, LogLevel, NewConflict, SyncTask};
use crate::objects::{ObjectSyncStats, ObjectSyncer};
use crate::store::MetadataStore;
use crate::utils::{retry_with_backoff, sanitize_identifier};
use crate::value::{Row, Value};

use self::conflict::{detect, extend_snapshot, row_json, Snapshot};

/// Tuning for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Rows per page read from the source and per upsert batch.
    pub batch_size: usize,
    /// Extra attempts when opening a connection fails.
    pub connect_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            connect_retries: 0,
        }
    }
}

/// Statistics from one sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub tables_synced: usize,
    pub rows_synced: u64,
    pub conflicts_detected: usize,
    pub objects: Option<ObjectSyncStats>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SyncStats {
    /// Check if the run completed without batch or table errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableOutcome {
    pub rows_synced: u64,
    pub conflicts_detected: usize,
    /// Table is missing in the target.
    pub skipped: bool,
    pub errors: Vec<String>,
}

pub struct SyncEngine {
    store: Arc<dyn MetadataStore>,
    provider: Arc<ConnectionProvider>,
    conflicts: Arc<ConflictManager>,
    objects: ObjectSyncer,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        provider: Arc<ConnectionProvider>,
        conflicts: Arc<ConflictManager>,
        config: SyncConfig,
    ) -> Self {
        Self {
            objects: ObjectSyncer::new(Arc::clone(&store)),
            store,
            provider,
            conflicts,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Run a task end to end against fresh connections.
    ///
    /// Connection failures end the run with [`SyncError::Connectivity`]; the
    /// caller decides what status to record.
    pub async fn sync_task(&self, task: &SyncTask) -> SyncResult<SyncStats> {
        let started = Instant::now();
        let result = self.run_task(task).await;

        match result {
            Ok(mut stats) => {
                stats.duration_ms = started.elapsed().as_millis() as u64;
                let message = format!(
                    "Sync finished: {} tables, {} rows, {} conflicts in {} ms",
                    stats.tables_synced,
                    stats.rows_synced,
                    stats.conflicts_detected,
                    stats.duration_ms
                );
                tracing::info!("Task {}: {}", task.id, message);
                let level = if stats.is_success() {
                    LogLevel::Info
                } else {
                    LogLevel::Warning
                };
                let details = (!stats.errors.is_empty()).then(|| stats.errors.join("\n"));
                self.log(task.id, level, &message, details.as_deref());
                Ok(stats)
            }
            Err(e) => {
                tracing::error!("Task {} failed: {}", task.id, e);
                self.log(task.id, LogLevel::Error, "Sync failed", Some(&e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_task(&self, task: &SyncTask) -> SyncResult<SyncStats> {
        let source_descriptor = self.descriptor(task.source_db_id, "source")?;
        let target_descriptor = self.descriptor(task.target_db_id, "target")?;

        let source = self.open(&source_descriptor).await?;
        let target = self.open(&target_descriptor).await?;
        tracing::info!(
            "Task {}: syncing {} -> {}",
            task.id,
            source_descriptor.display_url(),
            target_descriptor.display_url()
        );

        self.sync_with_clients(task, source.as_ref(), target.as_ref())
            .await
    }

    fn descriptor(&self, id: i64, role: &str) -> SyncResult<ConnectionDescriptor> {
        self.store
            .get_connection(id)?
            .ok_or_else(|| SyncError::config(format!("{} connection {} does not exist", role, id)))
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> SyncResult<Box<dyn SqlClient>> {
        retry_with_backoff(
            || async move {
                let client = self.provider.open_raw(descriptor).await?;
                client
                    .ping()
                    .await
                    .map_err(|e| SyncError::connectivity(&descriptor.name, e))?;
                Ok::<_, SyncError>(client)
            },
            self.config.connect_retries,
            Duration::from_millis(500),
            |e: &SyncError| matches!(e, SyncError::Connectivity { .. }),
        )
        .await
    }

    /// Run a task against already-open clients.
    pub async fn sync_with_clients(
        &self,
        task: &SyncTask,
        source: &dyn SqlClient,
        target: &dyn SqlClient,
    ) -> SyncResult<SyncStats> {
        let mut stats = SyncStats::default();

        if !task.is_whole_database() {
            let table = task.table_name.trim();
            let outcome = self
                .sync_single_table(task, source, target, table)
                .await
                .with_context(|| format!("Failed to sync table '{}'", table))?;
            stats.absorb(outcome);
            return Ok(stats);
        }

        let tables = Catalog::new(source)
            .list_tables()
            .await
            .context("Failed to list source tables")?;
        tracing::info!("Task {}: {} tables to sync", task.id, tables.len());

        for table in &tables {
            match self.sync_single_table(task, source, target, table).await {
                Ok(outcome) => stats.absorb(outcome),
                Err(e) => {
                    let message = format!("Failed to sync table '{}'", table);
                    tracing::error!("{}: {:#}", message, e);
                    self.log(task.id, LogLevel::Error, &message, Some(&format!("{:#}", e)));
                    stats.errors.push(format!("{}: {:#}", message, e));
                }
            }
        }

        stats.objects = Some(self.objects.sync_all(task.id, source, target).await);
        Ok(stats)
    }

    /// Replicate one table, then compare snapshots when it has a primary key.
    pub async fn sync_single_table(
        &self,
        task: &SyncTask,
        source: &dyn SqlClient,
        target: &dyn SqlClient,
        table: &str,
    ) -> Result<TableOutcome> {
        let source_catalog = Catalog::new(source);
        let target_catalog = Catalog::new(target);
        let mut outcome = TableOutcome::default();

        if !target_catalog.table_exists(table).await? {
            let message = format!("Table '{}' does not exist in the target; skipped", table);
            tracing::warn!("Task {}: {}", task.id, message);
            self.log(task.id, LogLevel::Warning, &message, None);
            outcome.skipped = true;
            return Ok(outcome);
        }

        let primary_key = source_catalog.primary_key_columns(table).await?;
        if primary_key.is_empty() {
            tracing::warn!(
                "Table '{}' has no primary key; appending rows without conflict detection",
                table
            );
        }

        // Capture the target before writing so overwritten values survive in conflicts.
        let target_before = if primary_key.is_empty() {
            None
        } else {
            let mut snapshot = Snapshot::new();
            extend_snapshot(
                &mut snapshot,
                target_catalog.fetch_all(table).await?,
                &primary_key,
            );
            Some(snapshot)
        };

        let mut source_snapshot = Snapshot::new();
        let batch_size = self.config.batch_size.max(1);

        if primary_key.is_empty() {
            let rows = source_catalog.fetch_all(table).await?;
            let rows: Vec<Row> = rows.into_iter().map(Row::normalized).collect();
            for (idx, chunk) in rows.chunks(batch_size).enumerate() {
                self.write_batch(task, &target_catalog, table, chunk, &primary_key, idx, &mut outcome)
                    .await;
            }
        } else {
            let mut offset = 0;
            let mut batch_idx = 0;
            loop {
                let page = source_catalog
                    .fetch_page(table, &primary_key, batch_size, offset)
                    .await?;
                let fetched = page.len();
                if fetched == 0 {
                    break;
                }

                let rows: Vec<Row> = page.into_iter().map(Row::normalized).collect();
                self.write_batch(task, &target_catalog, table, &rows, &primary_key, batch_idx, &mut outcome)
                    .await;
                extend_snapshot(&mut source_snapshot, rows, &primary_key);

                if fetched < batch_size {
                    break;
                }
                offset += fetched;
                batch_idx += 1;
            }
        }

        tracing::info!(
            "Synced {} rows into {}",
            outcome.rows_synced,
            sanitize_identifier(table)
        );

        if let Some(target_before) = target_before {
            outcome.conflicts_detected = self
                .record_conflicts(task, table, &source_snapshot, &target_before)
                .await;
        }
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_batch(
        &self,
        task: &SyncTask,
        target: &Catalog<'_>,
        table: &str,
        rows: &[Row],
        primary_key: &[String],
        batch_idx: usize,
        outcome: &mut TableOutcome,
    ) {
        let Some(first) = rows.first() else {
            return;
        };
        let columns = first.columns().to_vec();
        let values: Vec<Vec<Value>> = rows.iter().map(|row| row.values().to_vec()).collect();

        match target.upsert(table, &columns, &values, primary_key).await {
            Ok(report) => {
                outcome.rows_synced += report.rows_written as u64;
                for error in report.row_errors {
                    let message = format!("Batch {} of '{}': {}", batch_idx + 1, table, error);
                    tracing::error!("{}", message);
                    self.log(task.id, LogLevel::Error, &message, None);
                    outcome.errors.push(message);
                }
            }
            Err(e) => {
                let message = format!("Batch {} of '{}' failed ({} rows)", batch_idx + 1, table, rows.len());
                tracing::error!("{}: {:#}", message, e);
                self.log(task.id, LogLevel::Error, &message, Some(&format!("{:#}", e)));
                outcome.errors.push(format!("{}: {:#}", message, e));
            }
        }
    }

    async fn record_conflicts(
        &self,
        task: &SyncTask,
        table: &str,
        source: &Snapshot,
        target: &Snapshot,
    ) -> usize {
        let mut recorded = 0;
        for divergence in detect(source, target) {
            let new = NewConflict {
                task_id: task.id,
                table_name: table.to_string(),
                primary_key: divergence.primary_key,
                source_data: row_json(&divergence.source),
                target_data: row_json(&divergence.target),
                kind: ConflictKind::UpdateConflict,
            };
            match self.conflicts.record(&new).await {
                Ok(_) => recorded += 1,
                Err(e) => {
                    tracing::error!("Failed to record conflict on '{}': {:#}", table, e);
                    self.log(
                        task.id,
                        LogLevel::Error,
                        &format!("Failed to record conflict on '{}' {}", table, new.primary_key),
                        Some(&format!("{:#}", e)),
                    );
                }
            }
        }
        if recorded > 0 {
            self.log(
                task.id,
                LogLevel::Warning,
                &format!("{} conflicts detected in '{}'", recorded, table),
                None,
            );
        }
        recorded
    }

    fn log(&self, task_id: i64, level: LogLevel, message: &str, details: Option<&str>) {
        if let Err(e) = self.store.append_sync_log(task_id, level, message, details) {
            tracing::warn!("Failed to write sync log: {:#}", e);
        }
    }
}

impl SyncStats {
    fn absorb(&mut self, outcome: TableOutcome) {
        if !outcome.skipped {
            self.tables_synced += 1;
        }
        self.rows_synced += outcome.rows_synced;
        self.conflicts_detected += outcome.conflicts_detected;
        self.errors.extend(outcome.errors);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::catalog::Statement;
    use crate::connection::testing::ScriptedClient;
    use crate::models::{ConflictStatus, Dialect, SyncMode, TaskStatus};
    use crate::notify::testing::RecordingNotifier;
    use crate::store::SqliteStore;
    use crate::token::TokenCodec;

    fn engine(store: Arc<SqliteStore>, batch_size: usize) -> SyncEngine {
        let provider = Arc::new(ConnectionProvider::new());
        let conflicts = Arc::new(ConflictManager::new(
            store.clone(),
            provider.clone(),
            Arc::new(RecordingNotifier::default()),
            TokenCodec::new("secret", ChronoDuration::hours(24)),
            "http://localhost:8080",
        ));
        SyncEngine::new(
            store,
            provider,
            conflicts,
            SyncConfig {
                batch_size,
                connect_retries: 0,
            },
        )
    }

    fn task(table: &str) -> SyncTask {
        SyncTask {
            id: 1,
            name: "users".to_string(),
            source_db_id: 1,
            target_db_id: 2,
            table_name: table.to_string(),
            mode: SyncMode::OnDemand,
            cron_expr: None,
            status: TaskStatus::Stopped,
            last_sync_at: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn user_row(id: i64, email: &str) -> Row {
        Row::new(
            vec!["id".into(), "email".into()],
            vec![Value::Int(id), Value::Text(email.into())],
        )
    }

    fn count(n: i64) -> Vec<Row> {
        vec![Row::new(vec!["count".into()], vec![Value::Int(n)])]
    }

    fn pk(column: &str) -> Vec<Row> {
        vec![Row::new(vec!["column_name".into()], vec![Value::Text(column.into())])]
    }

    fn is_select(statement: &Statement) -> bool {
        statement.sql.starts_with("SELECT * FROM")
    }

    #[tokio::test]
    async fn test_divergent_row_is_overwritten_and_recorded() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = engine(store.clone(), 100);

        let source = ScriptedClient::new(Dialect::Postgres, |statement| {
            if statement.sql.contains("PRIMARY KEY") {
                Ok(pk("id"))
            } else if is_select(statement) {
                Ok(vec![user_row(1, "a@x.com")])
            } else {
                Ok(Vec::new())
            }
        });
        let target = ScriptedClient::new(Dialect::Postgres, |statement| {
            if statement.sql.contains("information_schema.tables") {
                Ok(count(1))
            } else if is_select(statement) {
                Ok(vec![user_row(1, "b@x.com")])
            } else {
                Ok(Vec::new())
            }
        });

        let outcome = engine
            .sync_single_table(&task("users"), &source, &target, "users")
            .await
            .unwrap();
        assert_eq!(outcome.rows_synced, 1);
        assert_eq!(outcome.conflicts_detected, 1);

        let writes = target.executed.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].sql.contains("ON CONFLICT (\"id\") DO UPDATE"));
        assert_eq!(
            writes[0].params,
            vec![Value::Int(1), Value::Text("a@x.com".into())]
        );

        let conflicts = store.list_conflicts(Some(ConflictStatus::Pending)).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].primary_key, r#"{"id":1}"#);
        assert_eq!(conflicts[0].source_data, r#"{"email":"a@x.com","id":1}"#);
        assert_eq!(conflicts[0].target_data, r#"{"email":"b@x.com","id":1}"#);
    }

    #[tokio::test]
    async fn test_equal_rows_produce_no_conflict() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = engine(store.clone(), 100);
        let rows = |statement: &Statement| -> Result<Vec<Row>> {
            if statement.sql.contains("PRIMARY KEY") {
                Ok(pk("id"))
            } else if statement.sql.contains("information_schema.tables") {
                Ok(count(1))
            } else if is_select(statement) {
                Ok(vec![user_row(1, "a@x.com")])
            } else {
                Ok(Vec::new())
            }
        };
        let source = ScriptedClient::new(Dialect::Postgres, rows);
        let target = ScriptedClient::new(Dialect::Postgres, rows);

        let outcome = engine
            .sync_single_table(&task("users"), &source, &target, "users")
            .await
            .unwrap();
        assert_eq!(outcome.conflicts_detected, 0);
        assert!(store.list_conflicts(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_table_without_primary_key_never_conflicts() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = engine(store.clone(), 2);

        let source = ScriptedClient::new(Dialect::Mysql, |statement| {
            if statement.sql.starts_with("SELECT * FROM") {
                Ok(vec![
                    user_row(1, "a"),
                    user_row(2, "b"),
                    user_row(3, "c"),
                ])
            } else {
                Ok(Vec::new())
            }
        });
        let target = ScriptedClient::new(Dialect::Mysql, |statement| {
            if statement.sql.contains("information_schema.tables") {
                Ok(count(1))
            } else {
                Ok(vec![user_row(1, "zzz")])
            }
        });

        let outcome = engine
            .sync_single_table(&task("events"), &source, &target, "events")
            .await
            .unwrap();
        assert_eq!(outcome.rows_synced, 3);
        assert_eq!(outcome.conflicts_detected, 0);
        assert!(store.list_conflicts(None).unwrap().is_empty());

        let writes = target.executed_sql();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|sql| sql.starts_with("INSERT INTO `events`")));
        // No snapshot read of the target for keyless tables.
        assert!(target
            .queried
            .lock()
            .unwrap()
            .iter()
            .all(|statement| !statement.sql.starts_with("SELECT * FROM")));
    }

    #[tokio::test]
    async fn test_missing_target_table_is_skipped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = engine(store.clone(), 100);
        let source = ScriptedClient::new(Dialect::Postgres, |_| Ok(Vec::new()));
        let target = ScriptedClient::new(Dialect::Postgres, |_| Ok(count(0)));

        let outcome = engine
            .sync_single_table(&task("ghost"), &source, &target, "ghost")
            .await
            .unwrap();
        assert!(outcome.skipped);
        assert!(source.queried.lock().unwrap().is_empty());

        let logs = store.list_sync_logs(1, 10).unwrap();
        assert_eq!(logs[0].level, LogLevel::Warning);
        assert!(logs[0].message.contains("ghost"));
    }

    #[tokio::test]
    async fn test_pages_follow_batch_size_and_failed_batch_continues() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = engine(store.clone(), 2);

        let offsets = Arc::new(Mutex::new(Vec::new()));
        let seen = offsets.clone();
        let source = ScriptedClient::new(Dialect::Postgres, move |statement| {
            if statement.sql.contains("PRIMARY KEY") {
                return Ok(pk("id"));
            }
            if !is_select(statement) {
                return Ok(Vec::new());
            }
            seen.lock().unwrap().push(statement.sql.clone());
            if statement.sql.ends_with("OFFSET 0") {
                Ok(vec![user_row(1, "a"), user_row(2, "b")])
            } else if statement.sql.ends_with("OFFSET 2") {
                Ok(vec![user_row(3, "c")])
            } else {
                Ok(Vec::new())
            }
        });
        let target = ScriptedClient::new(Dialect::Postgres, |statement| {
            if statement.sql.contains("information_schema.tables") {
                Ok(count(1))
            } else {
                Ok(Vec::new())
            }
        });
        target.fail_executes_containing("$4");

        let outcome = engine
            .sync_single_table(&task("users"), &source, &target, "users")
            .await
            .unwrap();

        let pages = offsets.lock().unwrap().clone();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("ORDER BY \"id\" LIMIT 2 OFFSET 0"));
        assert_eq!(target.executed_sql().len(), 2);
        assert_eq!(outcome.rows_synced, 1);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_connection_is_config_error() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = engine(store.clone(), 100);
        let err = engine.sync_task(&task("users")).await.unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert_eq!(
            store.list_sync_logs(1, 1).unwrap()[0].level,
            LogLevel::Error
        );
    }

    #[tokio::test]
    async fn test_whole_database_continues_past_failed_table_then_syncs_objects() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = engine(store.clone(), 100);

        let source = ScriptedClient::new(Dialect::Postgres, |statement| {
            if statement.sql.starts_with("SELECT table_name::text FROM information_schema.tables") {
                Ok(vec![
                    Row::new(vec!["table_name".into()], vec![Value::Text("orders".into())]),
                    Row::new(vec!["table_name".into()], vec![Value::Text("users".into())]),
                ])
            } else if statement.sql.contains("PRIMARY KEY") {
                if statement.params.contains(&Value::Text("orders".into())) {
                    anyhow::bail!("permission denied for table orders");
                }
                Ok(pk("id"))
            } else if is_select(statement) {
                Ok(vec![user_row(1, "a@x.com")])
            } else {
                Ok(Vec::new())
            }
        });
        let target = ScriptedClient::new(Dialect::Postgres, |statement| {
            if statement.sql.contains("information_schema.tables") {
                Ok(count(1))
            } else {
                Ok(Vec::new())
            }
        });

        let stats = engine
            .sync_with_clients(&task(""), &source, &target)
            .await
            .unwrap();
        assert_eq!(stats.tables_synced, 1);
        assert_eq!(stats.rows_synced, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with("Failed to sync table 'orders'"));
        assert!(stats.objects.is_some());
        assert!(target.executed_sql()[0].starts_with("INSERT INTO \"users\""));

        let logs = store.list_sync_logs(1, 10).unwrap();
        assert!(logs
            .iter()
            .any(|log| log.level == LogLevel::Error && log.message == "Failed to sync table 'orders'"));

        // Objects follow every table, in view, procedure, function, trigger order.
        let queried: Vec<String> = source
            .queried
            .lock()
            .unwrap()
            .iter()
            .map(|statement| statement.sql.clone())
            .collect();
        let position = |needle: &str| queried.iter().position(|sql| sql.contains(needle)).unwrap();
        let last_table_read = queried.iter().rposition(|sql| sql.starts_with("SELECT * FROM")).unwrap();
        let views = position("information_schema.views");
        let procedures = position("routine_type = 'PROCEDURE'");
        let functions = position("routine_type = 'FUNCTION'");
        let triggers = position("information_schema.triggers");
        assert!(last_table_read < views);
        assert!(views < procedures && procedures < functions && functions < triggers);
    }
}
