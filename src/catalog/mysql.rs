// ABOUTME: MySQL catalog queries and statement builders
// ABOUTME: Upserts use INSERT ... ON DUPLICATE KEY UPDATE; definitions come from SHOW CREATE

use anyhow::Result;

use super::{values_clause, DialectSql, Statement, UpsertPlan};
use crate::models::{DatabaseObject, ObjectKind};
use crate::utils::quote_mysql_ident;
use crate::value::{Row, Value};

pub struct MySqlSql;

/// Column of a SHOW CREATE result holding the statement.
fn definition_column(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::View => "Create View",
        ObjectKind::Procedure => "Create Procedure",
        ObjectKind::Function => "Create Function",
        ObjectKind::Trigger => "SQL Original Statement",
    }
}

/// Strip a leading `Create View:` style label some clients prepend.
fn strip_label(kind: ObjectKind, text: &str) -> String {
    let trimmed = text.trim();
    let label = format!("{}:", definition_column(kind));
    match trimmed.get(..label.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(&label) => {
            trimmed[label.len()..].trim_start().to_string()
        }
        _ => trimmed.to_string(),
    }
}

impl DialectSql for MySqlSql {
    fn quote_identifier(&self, name: &str) -> String {
        quote_mysql_ident(name)
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn list_tables(&self) -> Statement {
        Statement::new(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
    }

    fn primary_key_columns(&self, table: &str) -> Statement {
        Statement::with_params(
            "SELECT column_name FROM information_schema.key_column_usage \
             WHERE table_schema = DATABASE() AND table_name = ? AND constraint_name = 'PRIMARY' \
             ORDER BY ordinal_position",
            vec![Value::Text(table.to_string())],
        )
    }

    fn table_exists(&self, table: &str) -> Statement {
        Statement::with_params(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ? AND table_type = 'BASE TABLE'",
            vec![Value::Text(table.to_string())],
        )
    }

    fn objects_of_kind(&self, kind: ObjectKind) -> Statement {
        let sql = match kind {
            ObjectKind::View => {
                "SELECT table_name, NULL, table_schema FROM information_schema.views \
                 WHERE table_schema = DATABASE() ORDER BY table_name"
            }
            ObjectKind::Procedure => {
                "SELECT routine_name, NULL, routine_schema FROM information_schema.routines \
                 WHERE routine_schema = DATABASE() AND routine_type = 'PROCEDURE' \
                 ORDER BY routine_name"
            }
            ObjectKind::Function => {
                "SELECT routine_name, NULL, routine_schema FROM information_schema.routines \
                 WHERE routine_schema = DATABASE() AND routine_type = 'FUNCTION' \
                 ORDER BY routine_name"
            }
            ObjectKind::Trigger => {
                "SELECT trigger_name, event_object_table, trigger_schema \
                 FROM information_schema.triggers \
                 WHERE trigger_schema = DATABASE() ORDER BY trigger_name"
            }
        };
        Statement::new(sql)
    }

    fn object_definition(
        &self,
        kind: ObjectKind,
        name: &str,
        _owning_table: Option<&str>,
    ) -> Statement {
        Statement::new(format!(
            "SHOW CREATE {} {}",
            kind.keyword(),
            quote_mysql_ident(name)
        ))
    }

    fn extract_definition(&self, kind: ObjectKind, rows: &[Row]) -> Option<String> {
        let row = rows.first()?;
        let text = match row.get_ignore_case(definition_column(kind)) {
            Some(value) => value.to_text(),
            // Unknown layout: take the first cell that looks like DDL.
            None => row
                .values()
                .iter()
                .filter_map(|v| v.to_text())
                .find(|t| t.to_ascii_uppercase().contains("CREATE")),
        }?;
        Some(strip_label(kind, &text))
    }

    fn drop_object(&self, object: &DatabaseObject) -> Result<Statement> {
        Ok(Statement::new(format!(
            "DROP {} IF EXISTS {}",
            object.kind.keyword(),
            quote_mysql_ident(&object.name)
        )))
    }

    fn select_page(
        &self,
        table: &str,
        order_by: &[String],
        limit: usize,
        offset: usize,
    ) -> Statement {
        let mut sql = format!("SELECT * FROM {}", quote_mysql_ident(table));
        if !order_by.is_empty() {
            let order: Vec<String> = order_by.iter().map(|c| quote_mysql_ident(c)).collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        Statement::new(sql)
    }

    /// Multi-row `INSERT ... ON DUPLICATE KEY UPDATE`.
    ///
    /// Without a primary key every column is refreshed, so unique indexes
    /// still collapse duplicates. When every column is in the key the insert
    /// becomes `INSERT IGNORE`.
    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
        primary_key_columns: &[String],
    ) -> UpsertPlan {
        let quoted_columns: Vec<String> = columns.iter().map(|c| quote_mysql_ident(c)).collect();
        let values = values_clause(self, columns.len(), rows.len());

        let update_columns: Vec<String> = columns
            .iter()
            .filter(|c| primary_key_columns.is_empty() || !primary_key_columns.contains(c))
            .map(|c| {
                let quoted = quote_mysql_ident(c);
                format!("{} = VALUES({})", quoted, quoted)
            })
            .collect();

        let sql = if update_columns.is_empty() {
            format!(
                "INSERT IGNORE INTO {} ({}) VALUES {}",
                quote_mysql_ident(table),
                quoted_columns.join(", "),
                values
            )
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
                quote_mysql_ident(table),
                quoted_columns.join(", "),
                values,
                update_columns.join(", ")
            )
        };

        let params = rows.iter().flat_map(|row| row.iter().cloned()).collect();
        UpsertPlan::Single(Statement::with_params(sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_table_queries_exclude_views() {
        let listing = MySqlSql.list_tables();
        assert!(listing.sql.contains("information_schema.tables"));
        assert!(listing.sql.contains("table_type = 'BASE TABLE'"));
        assert!(!listing.sql.starts_with("SHOW"));

        let exists = MySqlSql.table_exists("active_users");
        assert!(exists.sql.contains("table_type = 'BASE TABLE'"));
        assert_eq!(exists.params, vec![Value::Text("active_users".into())]);
    }

    #[test]
    fn test_build_upsert_on_duplicate_key() {
        let plan = MySqlSql.build_upsert(
            "users",
            &strings(&["id", "email"]),
            &[
                vec![Value::Int(1), Value::Text("a@x.com".into())],
                vec![Value::Int(2), Value::Text("b@x.com".into())],
            ],
            &strings(&["id"]),
        );
        let UpsertPlan::Single(statement) = plan else {
            panic!("expected single statement");
        };
        assert_eq!(
            statement.sql,
            "INSERT INTO `users` (`id`, `email`) VALUES (?, ?), (?, ?) \
             ON DUPLICATE KEY UPDATE `email` = VALUES(`email`)"
        );
        assert_eq!(statement.params.len(), 4);
    }

    #[test]
    fn test_build_upsert_all_key_columns_is_insert_ignore() {
        let plan = MySqlSql.build_upsert(
            "tags",
            &strings(&["id"]),
            &[vec![Value::Int(1)]],
            &strings(&["id"]),
        );
        let UpsertPlan::Single(statement) = plan else {
            panic!("expected single statement");
        };
        assert_eq!(statement.sql, "INSERT IGNORE INTO `tags` (`id`) VALUES (?)");
    }

    #[test]
    fn test_build_upsert_without_key_updates_everything() {
        let plan = MySqlSql.build_upsert(
            "events",
            &strings(&["kind", "at"]),
            &[vec![Value::Text("x".into()), Value::Null]],
            &[],
        );
        let UpsertPlan::Single(statement) = plan else {
            panic!("expected single statement");
        };
        assert!(statement
            .sql
            .ends_with("ON DUPLICATE KEY UPDATE `kind` = VALUES(`kind`), `at` = VALUES(`at`)"));
    }

    #[test]
    fn test_extract_definition_by_column() {
        let rows = vec![Row::new(
            strings(&["View", "Create View", "character_set_client"]),
            vec![
                Value::Text("v_users".into()),
                Value::Text("CREATE VIEW `v_users` AS select 1".into()),
                Value::Text("utf8mb4".into()),
            ],
        )];
        assert_eq!(
            MySqlSql.extract_definition(ObjectKind::View, &rows).as_deref(),
            Some("CREATE VIEW `v_users` AS select 1")
        );
    }

    #[test]
    fn test_extract_definition_strips_label() {
        let rows = vec![Row::new(
            strings(&["statement"]),
            vec![Value::Text(
                "Create Procedure: CREATE PROCEDURE `p`() BEGIN END".into(),
            )],
        )];
        assert_eq!(
            MySqlSql
                .extract_definition(ObjectKind::Procedure, &rows)
                .as_deref(),
            Some("CREATE PROCEDURE `p`() BEGIN END")
        );
    }

    #[test]
    fn test_drop_uses_if_exists() {
        let object = DatabaseObject {
            kind: ObjectKind::Function,
            name: "total`s".into(),
            owning_table: None,
            schema: "shop".into(),
        };
        assert_eq!(
            MySqlSql.drop_object(&object).unwrap().sql,
            "DROP FUNCTION IF EXISTS `total``s`"
        );
    }

    #[test]
    fn test_show_create_quotes_name() {
        let statement = MySqlSql.object_definition(ObjectKind::Trigger, "audit", Some("users"));
        assert_eq!(statement.sql, "SHOW CREATE TRIGGER `audit`");
        assert!(statement.params.is_empty());
    }
}
