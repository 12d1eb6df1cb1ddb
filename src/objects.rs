// ABOUTME: Object sync engine - replicates views, procedures, functions, and triggers
// ABOUTME: Drops the target copy, converts the definition between dialects, then recreates it

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::connection::SqlClient;
use crate::models::{
    DatabaseObject, Dialect, NewObjectSyncLog, ObjectAction, ObjectKind, OutcomeStatus,
};
use crate::store::MetadataStore;
use crate::utils::sanitize_identifier;

/// Counts from one object sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectSyncStats {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl ObjectSyncStats {
    fn merge(&mut self, other: &ObjectSyncStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

/// Rewrite a definition for another dialect.
///
/// Only MySQL and PostgreSQL have rewrites (identifier quotes and the
/// auto-increment keyword); every other pair is returned as-is.
pub fn convert_definition(definition: &str, from: Dialect, to: Dialect) -> String {
    match (from, to) {
        (Dialect::Mysql, Dialect::Postgres) => definition
            .replace('`', "\"")
            .replace("AUTO_INCREMENT", "SERIAL"),
        (Dialect::Postgres, Dialect::Mysql) => definition
            .replace('"', "`")
            .replace("SERIAL", "AUTO_INCREMENT"),
        _ => definition.to_string(),
    }
}

pub struct ObjectSyncer {
    store: Arc<dyn MetadataStore>,
}

impl ObjectSyncer {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Sync every kind in dependency order. Failures are logged per object.
    pub async fn sync_all(
        &self,
        task_id: i64,
        source: &dyn SqlClient,
        target: &dyn SqlClient,
    ) -> ObjectSyncStats {
        let mut total = ObjectSyncStats::default();
        for kind in ObjectKind::SYNC_ORDER {
            match self.sync_kind(task_id, kind, source, target).await {
                Ok(stats) => total.merge(&stats),
                Err(e) => {
                    tracing::error!("Failed to sync {} objects: {:#}", kind, e);
                    total.failed += 1;
                    self.log(
                        task_id,
                        kind,
                        "",
                        ObjectAction::Skip,
                        OutcomeStatus::Failed,
                        format!("Failed to sync {} objects: {:#}", kind, e),
                    );
                }
            }
        }
        tracing::info!(
            "Object sync finished: {} created, {} updated, {} failed",
            total.created,
            total.updated,
            total.failed
        );
        total
    }

    /// Sync one object kind.
    ///
    /// Errors only when either side's object list cannot be read; per-object
    /// failures are logged and counted.
    pub async fn sync_kind(
        &self,
        task_id: i64,
        kind: ObjectKind,
        source: &dyn SqlClient,
        target: &dyn SqlClient,
    ) -> Result<ObjectSyncStats> {
        let source_catalog = Catalog::new(source);
        let target_catalog = Catalog::new(target);

        let source_objects = source_catalog.objects_of_kind(kind).await?;
        let existing: HashMap<String, DatabaseObject> = target_catalog
            .objects_of_kind(kind)
            .await?
            .into_iter()
            .map(|object| (object.name.to_lowercase(), object))
            .collect();

        let mut stats = ObjectSyncStats::default();
        for object in &source_objects {
            let definition = match source_catalog.object_definition(object).await {
                Ok(definition) => definition,
                Err(e) => {
                    stats.failed += 1;
                    self.log(
                        task_id,
                        kind,
                        &object.name,
                        ObjectAction::Skip,
                        OutcomeStatus::Failed,
                        format!("Failed to read definition: {:#}", e),
                    );
                    continue;
                }
            };

            let current = existing.get(&object.name.to_lowercase());
            if let Some(current) = current {
                if let Err(e) = target_catalog.drop_object(current).await {
                    self.log(
                        task_id,
                        kind,
                        &object.name,
                        ObjectAction::Delete,
                        OutcomeStatus::Failed,
                        format!("Failed to drop existing {}: {:#}", kind, e),
                    );
                }
            }

            let converted =
                convert_definition(&definition, source_catalog.dialect(), target_catalog.dialect());
            let action = if current.is_some() {
                ObjectAction::Update
            } else {
                ObjectAction::Create
            };
            match target_catalog.execute_ddl(&converted).await {
                Ok(()) => {
                    match action {
                        ObjectAction::Update => stats.updated += 1,
                        _ => stats.created += 1,
                    }
                    tracing::debug!("Synced {} {}", kind, sanitize_identifier(&object.name));
                    self.log(
                        task_id,
                        kind,
                        &object.name,
                        action,
                        OutcomeStatus::Success,
                        format!("{} synced", object.name),
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        "Failed to create {} {}: {:#}",
                        kind,
                        sanitize_identifier(&object.name),
                        e
                    );
                    self.log(
                        task_id,
                        kind,
                        &object.name,
                        action,
                        OutcomeStatus::Failed,
                        format!("Failed to create {}: {:#}", kind, e),
                    );
                }
            }
        }
        Ok(stats)
    }

    fn log(
        &self,
        task_id: i64,
        kind: ObjectKind,
        name: &str,
        action: ObjectAction,
        status: OutcomeStatus,
        message: String,
    ) {
        let entry = NewObjectSyncLog {
            task_id,
            object_kind: kind,
            object_name: name.to_string(),
            action,
            status,
            message,
        };
        if let Err(e) = self.store.append_object_log(&entry) {
            tracing::warn!("Failed to write object sync log: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::connection::testing::ScriptedClient;
    use crate::store::SqliteStore;
    use crate::value::{Row, Value};

    fn view_row(name: &str) -> Row {
        Row::new(
            vec!["table_name".into(), "owner".into(), "table_schema".into()],
            vec![Value::Text(name.into()), Value::Null, Value::Text("public".into())],
        )
    }

    fn source_client() -> ScriptedClient {
        ScriptedClient::new(Dialect::Postgres, |statement| {
            if statement.sql.contains("information_schema.views") {
                Ok(vec![view_row("active_users")])
            } else if statement.sql.contains("pg_views") {
                Ok(vec![Row::new(
                    vec!["definition".into()],
                    vec![Value::Text(
                        "CREATE OR REPLACE VIEW active_users AS SELECT id FROM users".into(),
                    )],
                )])
            } else {
                Ok(Vec::new())
            }
        })
    }

    #[test]
    fn test_convert_mysql_to_postgres() {
        let converted = convert_definition(
            "CREATE TABLE `t` (`id` INT AUTO_INCREMENT)",
            Dialect::Mysql,
            Dialect::Postgres,
        );
        assert_eq!(converted, "CREATE TABLE \"t\" (\"id\" INT SERIAL)");
    }

    #[test]
    fn test_convert_postgres_to_mysql() {
        let converted = convert_definition(
            "CREATE VIEW \"v\" AS SELECT \"id\" FROM \"t\"",
            Dialect::Postgres,
            Dialect::Mysql,
        );
        assert_eq!(converted, "CREATE VIEW `v` AS SELECT `id` FROM `t`");
    }

    #[test]
    fn test_convert_other_pairs_unchanged() {
        let definition = "CREATE VIEW \"V\" AS SELECT 1 FROM dual";
        assert_eq!(
            convert_definition(definition, Dialect::Oracle, Dialect::Postgres),
            definition
        );
        assert_eq!(
            convert_definition(definition, Dialect::Postgres, Dialect::Postgres),
            definition
        );
    }

    #[tokio::test]
    async fn test_second_run_updates_existing_object() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let syncer = ObjectSyncer::new(store.clone());
        let source = source_client();

        let present = Arc::new(AtomicBool::new(false));
        let flag = present.clone();
        let target = ScriptedClient::new(Dialect::Postgres, move |statement| {
            if statement.sql.contains("information_schema.views") && flag.load(Ordering::SeqCst) {
                Ok(vec![view_row("ACTIVE_USERS")])
            } else {
                Ok(Vec::new())
            }
        });

        let first = syncer
            .sync_kind(1, ObjectKind::View, &source, &target)
            .await
            .unwrap();
        assert_eq!(first.created, 1);

        present.store(true, Ordering::SeqCst);
        let second = syncer
            .sync_kind(1, ObjectKind::View, &source, &target)
            .await
            .unwrap();
        assert_eq!(second.updated, 1);
        assert_eq!(second.failed, 0);

        let executed = target.executed_sql();
        assert!(executed
            .iter()
            .any(|sql| sql.starts_with("DROP VIEW IF EXISTS \"ACTIVE_USERS\"")));

        let logs = store.list_object_logs(1, 10).unwrap();
        assert_eq!(logs[0].action, ObjectAction::Update);
        assert_eq!(logs[0].status, OutcomeStatus::Success);
        assert_eq!(logs[1].action, ObjectAction::Create);
    }

    #[tokio::test]
    async fn test_create_failure_is_logged() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let syncer = ObjectSyncer::new(store.clone());
        let source = source_client();
        let target = ScriptedClient::new(Dialect::Postgres, |_| Ok(Vec::new()));
        target.fail_executes_containing("CREATE OR REPLACE VIEW");

        let stats = syncer.sync_all(3, &source, &target).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.created, 0);

        let logs = store.list_object_logs(3, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].object_kind, ObjectKind::View);
        assert_eq!(logs[0].action, ObjectAction::Create);
        assert_eq!(logs[0].status, OutcomeStatus::Failed);
    }

    #[tokio::test]
    async fn test_unreadable_definition_is_skipped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let syncer = ObjectSyncer::new(store.clone());
        let source = ScriptedClient::new(Dialect::Postgres, |statement| {
            if statement.sql.contains("information_schema.views") {
                Ok(vec![view_row("broken")])
            } else {
                Ok(Vec::new())
            }
        });
        let target = ScriptedClient::new(Dialect::Postgres, |_| Ok(Vec::new()));

        let stats = syncer
            .sync_kind(4, ObjectKind::View, &source, &target)
            .await
            .unwrap();
        assert_eq!(stats.failed, 1);
        assert!(target.executed_sql().is_empty());

        let logs = store.list_object_logs(4, 10).unwrap();
        assert_eq!(logs[0].action, ObjectAction::Skip);
        assert_eq!(logs[0].status, OutcomeStatus::Failed);
    }
}
