// ABOUTME: PostgreSQL catalog queries and statement builders
// ABOUTME: Upserts use INSERT ... ON CONFLICT scoped to the connection's current schema

use anyhow::{anyhow, Result};

use super::{values_clause, DialectSql, Statement, UpsertPlan};
use crate::models::{DatabaseObject, ObjectKind};
use crate::utils::quote_ident;
use crate::value::Value;

pub struct PostgresSql;

impl DialectSql for PostgresSql {
    fn quote_identifier(&self, name: &str) -> String {
        quote_ident(name)
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn list_tables(&self) -> Statement {
        Statement::new(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
    }

    fn primary_key_columns(&self, table: &str) -> Statement {
        Statement::with_params(
            "SELECT kcu.column_name::text \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = current_schema() \
               AND tc.table_name = $1::text \
             ORDER BY kcu.ordinal_position",
            vec![Value::Text(table.to_string())],
        )
    }

    fn table_exists(&self, table: &str) -> Statement {
        Statement::with_params(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1::text \
             AND table_type = 'BASE TABLE'",
            vec![Value::Text(table.to_string())],
        )
    }

    fn objects_of_kind(&self, kind: ObjectKind) -> Statement {
        let sql = match kind {
            ObjectKind::View => {
                "SELECT table_name::text, NULL::text, table_schema::text \
                 FROM information_schema.views \
                 WHERE table_schema = current_schema() \
                 ORDER BY table_name"
            }
            ObjectKind::Procedure => {
                "SELECT routine_name::text, NULL::text, routine_schema::text \
                 FROM information_schema.routines \
                 WHERE routine_schema = current_schema() AND routine_type = 'PROCEDURE' \
                 ORDER BY routine_name"
            }
            ObjectKind::Function => {
                "SELECT routine_name::text, NULL::text, routine_schema::text \
                 FROM information_schema.routines \
                 WHERE routine_schema = current_schema() AND routine_type = 'FUNCTION' \
                 ORDER BY routine_name"
            }
            // information_schema.triggers has one row per event; collapse them.
            ObjectKind::Trigger => {
                "SELECT DISTINCT trigger_name::text, event_object_table::text, trigger_schema::text \
                 FROM information_schema.triggers \
                 WHERE trigger_schema = current_schema() \
                 ORDER BY 1"
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
        let sql = match kind {
            ObjectKind::View => {
                "SELECT 'CREATE OR REPLACE VIEW ' || quote_ident(viewname::text) || ' AS ' || definition \
                 FROM pg_views \
                 WHERE schemaname = current_schema() AND viewname = $1"
            }
            ObjectKind::Procedure => {
                "SELECT pg_get_functiondef(p.oid) \
                 FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace \
                 WHERE n.nspname = current_schema() AND p.proname = $1 AND p.prokind = 'p'"
            }
            ObjectKind::Function => {
                "SELECT pg_get_functiondef(p.oid) \
                 FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace \
                 WHERE n.nspname = current_schema() AND p.proname = $1 AND p.prokind = 'f'"
            }
            ObjectKind::Trigger => {
                "SELECT pg_get_triggerdef(t.oid) \
                 FROM pg_trigger t \
                 JOIN pg_class c ON c.oid = t.tgrelid \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = current_schema() AND t.tgname = $1 AND NOT t.tgisinternal"
            }
        };
        Statement::with_params(sql, vec![Value::Text(name.to_string())])
    }

    fn drop_object(&self, object: &DatabaseObject) -> Result<Statement> {
        let name = quote_ident(&object.name);
        let sql = match object.kind {
            ObjectKind::Trigger => {
                let table = object.owning_table.as_deref().ok_or_else(|| {
                    anyhow!("trigger '{}' has no owning table to drop it from", object.name)
                })?;
                format!(
                    "DROP TRIGGER IF EXISTS {} ON {} CASCADE",
                    name,
                    quote_ident(table)
                )
            }
            kind => format!("DROP {} IF EXISTS {} CASCADE", kind.keyword(), name),
        };
        Ok(Statement::new(sql))
    }

    fn select_page(
        &self,
        table: &str,
        order_by: &[String],
        limit: usize,
        offset: usize,
    ) -> Statement {
        let mut sql = format!("SELECT * FROM {}", quote_ident(table));
        if !order_by.is_empty() {
            let order: Vec<String> = order_by.iter().map(|c| quote_ident(c)).collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        Statement::new(sql)
    }

    /// Multi-row `INSERT ... ON CONFLICT (pk) DO UPDATE`.
    ///
    /// ```sql
    /// INSERT INTO "users" ("id", "email") VALUES ($1, $2), ($3, $4)
    /// ON CONFLICT ("id") DO UPDATE SET "email" = EXCLUDED."email"
    /// ```
    ///
    /// Falls back to a plain INSERT when the table has no primary key, and to
    /// `DO NOTHING` when every column is part of the key.
    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
        primary_key_columns: &[String],
    ) -> UpsertPlan {
        let quoted_columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table),
            quoted_columns.join(", "),
            values_clause(self, columns.len(), rows.len())
        );

        if !primary_key_columns.is_empty() {
            let quoted_pk: Vec<String> =
                primary_key_columns.iter().map(|c| quote_ident(c)).collect();
            let update_columns: Vec<String> = columns
                .iter()
                .filter(|c| !primary_key_columns.contains(c))
                .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
                .collect();
            let action = if update_columns.is_empty() {
                "DO NOTHING".to_string()
            } else {
                format!("DO UPDATE SET {}", update_columns.join(", "))
            };
            sql.push_str(&format!(" ON CONFLICT ({}) {}", quoted_pk.join(", "), action));
        }

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

    fn single(plan: UpsertPlan) -> Statement {
        match plan {
            UpsertPlan::Single(statement) => statement,
            other => panic!("expected a single statement, got {:?}", other),
        }
    }

    #[test]
    fn test_table_queries_exclude_views() {
        assert!(PostgresSql.list_tables().sql.contains("table_type = 'BASE TABLE'"));
        let exists = PostgresSql.table_exists("active_users");
        assert!(exists.sql.contains("table_type = 'BASE TABLE'"));
        assert_eq!(exists.params, vec![Value::Text("active_users".into())]);
    }

    #[test]
    fn test_build_upsert_single_row() {
        let statement = single(PostgresSql.build_upsert(
            "users",
            &strings(&["id", "name", "email"]),
            &[vec![
                Value::Int(1),
                Value::Text("Ann".into()),
                Value::Text("a@x.com".into()),
            ]],
            &strings(&["id"]),
        ));

        assert!(statement.sql.contains("INSERT INTO \"users\""));
        assert!(statement.sql.contains("(\"id\", \"name\", \"email\")"));
        assert!(statement.sql.contains("VALUES ($1, $2, $3)"));
        assert!(statement.sql.contains("ON CONFLICT (\"id\")"));
        assert!(statement.sql.contains("\"name\" = EXCLUDED.\"name\""));
        assert!(statement.sql.contains("\"email\" = EXCLUDED.\"email\""));
        assert!(!statement.sql.contains("\"id\" = EXCLUDED"));
        assert_eq!(statement.params.len(), 3);
    }

    #[test]
    fn test_build_upsert_multiple_rows() {
        let rows = vec![vec![Value::Int(1), Value::Null]; 3];
        let statement = single(PostgresSql.build_upsert(
            "users",
            &strings(&["id", "name"]),
            &rows,
            &strings(&["id"]),
        ));
        assert!(statement.sql.contains("($1, $2), ($3, $4), ($5, $6)"));
        assert_eq!(statement.params.len(), 6);
    }

    #[test]
    fn test_build_upsert_composite_pk() {
        let statement = single(PostgresSql.build_upsert(
            "order_items",
            &strings(&["order_id", "item_id", "quantity"]),
            &[vec![Value::Int(1), Value::Int(2), Value::Int(3)]],
            &strings(&["order_id", "item_id"]),
        ));
        assert!(statement.sql.contains("ON CONFLICT (\"order_id\", \"item_id\")"));
        assert!(statement.sql.contains("\"quantity\" = EXCLUDED.\"quantity\""));
    }

    #[test]
    fn test_build_upsert_all_pk_columns() {
        let statement = single(PostgresSql.build_upsert(
            "tags",
            &strings(&["id"]),
            &[vec![Value::Int(1)]],
            &strings(&["id"]),
        ));
        assert!(statement.sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn test_build_upsert_without_pk_is_plain_insert() {
        let statement = single(PostgresSql.build_upsert(
            "events",
            &strings(&["kind", "payload"]),
            &[vec![Value::Text("click".into()), Value::Null]],
            &[],
        ));
        assert_eq!(
            statement.sql,
            "INSERT INTO \"events\" (\"kind\", \"payload\") VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_drop_trigger_needs_table() {
        let mut trigger = DatabaseObject {
            kind: ObjectKind::Trigger,
            name: "audit_users".into(),
            owning_table: Some("users".into()),
            schema: "public".into(),
        };
        let statement = PostgresSql.drop_object(&trigger).unwrap();
        assert_eq!(
            statement.sql,
            "DROP TRIGGER IF EXISTS \"audit_users\" ON \"users\" CASCADE"
        );

        trigger.owning_table = None;
        assert!(PostgresSql.drop_object(&trigger).is_err());
    }

    #[test]
    fn test_drop_view_cascades() {
        let view = DatabaseObject {
            kind: ObjectKind::View,
            name: "active_users".into(),
            owning_table: None,
            schema: "public".into(),
        };
        assert_eq!(
            PostgresSql.drop_object(&view).unwrap().sql,
            "DROP VIEW IF EXISTS \"active_users\" CASCADE"
        );
    }

    #[test]
    fn test_select_page_orders_by_key() {
        let statement = PostgresSql.select_page("users", &strings(&["id"]), 100, 200);
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"users\" ORDER BY \"id\" LIMIT 100 OFFSET 200"
        );
    }

    #[test]
    fn test_catalog_queries_bind_table_name() {
        let statement = PostgresSql.primary_key_columns("users");
        assert!(statement.sql.contains("PRIMARY KEY"));
        assert!(statement.sql.contains("ORDER BY kcu.ordinal_position"));
        assert_eq!(statement.params, vec![Value::Text("users".into())]);
    }
}
