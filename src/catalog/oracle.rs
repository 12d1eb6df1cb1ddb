// ABOUTME: Oracle catalog queries and statement builders
// ABOUTME: Writes are per-row existence checks followed by UPDATE or INSERT

use anyhow::Result;

use super::{DialectSql, RowMerge, Statement, UpsertPlan};
use crate::models::{DatabaseObject, ObjectKind};
use crate::utils::quote_ident;
use crate::value::Value;

pub struct OracleSql;

impl OracleSql {
    fn where_key(&self, primary_key_columns: &[String], first_index: usize) -> String {
        primary_key_columns
            .iter()
            .enumerate()
            .map(|(idx, col)| format!("{} = :{}", quote_ident(col), first_index + idx))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn merge_row(
        &self,
        table: &str,
        columns: &[String],
        row: &[Value],
        primary_key_columns: &[String],
    ) -> RowMerge {
        let quoted_table = quote_ident(table);
        let quoted_columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!(":{}", i)).collect();
        let insert = Statement::with_params(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quoted_table,
                quoted_columns.join(", "),
                placeholders.join(", ")
            ),
            row.to_vec(),
        );

        if primary_key_columns.is_empty() {
            return RowMerge {
                exists: None,
                update: None,
                insert,
            };
        }

        let value_of = |column: &String| -> Value {
            columns
                .iter()
                .position(|c| c == column)
                .and_then(|idx| row.get(idx).cloned())
                .unwrap_or(Value::Null)
        };
        let key_values: Vec<Value> = primary_key_columns.iter().map(|c| value_of(c)).collect();

        let exists = Statement::with_params(
            format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                quoted_table,
                self.where_key(primary_key_columns, 1)
            ),
            key_values.clone(),
        );

        let non_key: Vec<&String> = columns
            .iter()
            .filter(|c| !primary_key_columns.contains(c))
            .collect();
        let update = if non_key.is_empty() {
            None
        } else {
            let assignments: Vec<String> = non_key
                .iter()
                .enumerate()
                .map(|(idx, col)| format!("{} = :{}", quote_ident(col), idx + 1))
                .collect();
            let mut params: Vec<Value> = non_key.iter().map(|c| value_of(*c)).collect();
            params.extend(key_values);
            Some(Statement::with_params(
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    quoted_table,
                    assignments.join(", "),
                    self.where_key(primary_key_columns, non_key.len() + 1)
                ),
                params,
            ))
        };

        RowMerge {
            exists: Some(exists),
            update,
            insert,
        }
    }
}

impl DialectSql for OracleSql {
    fn quote_identifier(&self, name: &str) -> String {
        quote_ident(name)
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn list_tables(&self) -> Statement {
        Statement::new("SELECT table_name FROM user_tables ORDER BY table_name")
    }

    fn primary_key_columns(&self, table: &str) -> Statement {
        Statement::with_params(
            "SELECT cols.column_name \
             FROM user_constraints cons \
             JOIN user_cons_columns cols ON cons.constraint_name = cols.constraint_name \
             WHERE cons.constraint_type = 'P' AND cons.table_name = :1 \
             ORDER BY cols.position",
            vec![Value::Text(table.to_string())],
        )
    }

    fn table_exists(&self, table: &str) -> Statement {
        Statement::with_params(
            "SELECT COUNT(*) FROM user_tables WHERE table_name = :1",
            vec![Value::Text(table.to_string())],
        )
    }

    fn objects_of_kind(&self, kind: ObjectKind) -> Statement {
        let sql = match kind {
            ObjectKind::View => {
                "SELECT view_name, NULL, owner FROM all_views \
                 WHERE owner = USER ORDER BY view_name"
            }
            ObjectKind::Procedure => {
                "SELECT object_name, NULL, owner FROM all_objects \
                 WHERE owner = USER AND object_type = 'PROCEDURE' ORDER BY object_name"
            }
            ObjectKind::Function => {
                "SELECT object_name, NULL, owner FROM all_objects \
                 WHERE owner = USER AND object_type = 'FUNCTION' ORDER BY object_name"
            }
            ObjectKind::Trigger => {
                "SELECT trigger_name, table_name, owner FROM all_triggers \
                 WHERE owner = USER ORDER BY trigger_name"
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
        Statement::with_params(
            "SELECT DBMS_METADATA.GET_DDL(:1, :2) FROM dual",
            vec![
                Value::Text(kind.keyword().to_string()),
                Value::Text(name.to_string()),
            ],
        )
    }

    fn drop_object(&self, object: &DatabaseObject) -> Result<Statement> {
        Ok(Statement::new(format!(
            "DROP {} {}",
            object.kind.keyword(),
            quote_ident(&object.name)
        )))
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
        sql.push_str(&format!(
            " OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            offset, limit
        ));
        Statement::new(sql)
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
        primary_key_columns: &[String],
    ) -> UpsertPlan {
        UpsertPlan::PerRow(
            rows.iter()
                .map(|row| self.merge_row(table, columns, row, primary_key_columns))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_plan_per_row() {
        let plan = OracleSql.build_upsert(
            "USERS",
            &strings(&["ID", "EMAIL"]),
            &[
                vec![Value::Int(1), Value::Text("a@x.com".into())],
                vec![Value::Int(2), Value::Text("b@x.com".into())],
            ],
            &strings(&["ID"]),
        );
        let UpsertPlan::PerRow(merges) = plan else {
            panic!("expected per-row plan");
        };
        assert_eq!(merges.len(), 2);

        let first = &merges[0];
        let exists = first.exists.as_ref().unwrap();
        assert_eq!(exists.sql, "SELECT COUNT(*) FROM \"USERS\" WHERE \"ID\" = :1");
        assert_eq!(exists.params, vec![Value::Int(1)]);

        let update = first.update.as_ref().unwrap();
        assert_eq!(
            update.sql,
            "UPDATE \"USERS\" SET \"EMAIL\" = :1 WHERE \"ID\" = :2"
        );
        assert_eq!(
            update.params,
            vec![Value::Text("a@x.com".into()), Value::Int(1)]
        );

        assert_eq!(
            first.insert.sql,
            "INSERT INTO \"USERS\" (\"ID\", \"EMAIL\") VALUES (:1, :2)"
        );
    }

    #[test]
    fn test_merge_composite_key_placeholders() {
        let plan = OracleSql.build_upsert(
            "LINES",
            &strings(&["ORDER_ID", "QTY", "LINE_NO"]),
            &[vec![Value::Int(9), Value::Int(3), Value::Int(1)]],
            &strings(&["ORDER_ID", "LINE_NO"]),
        );
        let UpsertPlan::PerRow(merges) = plan else {
            panic!("expected per-row plan");
        };
        let update = merges[0].update.as_ref().unwrap();
        assert_eq!(
            update.sql,
            "UPDATE \"LINES\" SET \"QTY\" = :1 WHERE \"ORDER_ID\" = :2 AND \"LINE_NO\" = :3"
        );
        assert_eq!(update.params, vec![Value::Int(3), Value::Int(9), Value::Int(1)]);
    }

    #[test]
    fn test_merge_without_key_only_inserts() {
        let plan = OracleSql.build_upsert(
            "EVENTS",
            &strings(&["KIND"]),
            &[vec![Value::Text("x".into())]],
            &[],
        );
        let UpsertPlan::PerRow(merges) = plan else {
            panic!("expected per-row plan");
        };
        assert!(merges[0].exists.is_none());
        assert!(merges[0].update.is_none());
    }

    #[test]
    fn test_select_page_uses_fetch_next() {
        let statement = OracleSql.select_page("USERS", &strings(&["ID"]), 100, 0);
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"USERS\" ORDER BY \"ID\" OFFSET 0 ROWS FETCH NEXT 100 ROWS ONLY"
        );
    }

    #[test]
    fn test_drop_has_no_if_exists() {
        let object = DatabaseObject {
            kind: ObjectKind::View,
            name: "V_USERS".into(),
            owning_table: None,
            schema: "APP".into(),
        };
        assert_eq!(OracleSql.drop_object(&object).unwrap().sql, "DROP VIEW \"V_USERS\"");
    }
}
