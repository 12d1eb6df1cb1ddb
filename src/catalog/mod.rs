// ABOUTME: Catalog adapter - per-dialect catalog queries and statement builders
// ABOUTME: Catalog wraps a live client and runs the dialect's statements against it

mod mysql;
mod oracle;
mod postgres;

pub use mysql::MySqlSql;
pub use oracle::OracleSql;
pub use postgres::PostgresSql;

use anyhow::{bail, Context, Result};

use crate::connection::SqlClient;
use crate::models::{DatabaseObject, Dialect, ObjectKind};
use crate::value::{Row, Value};

/// SQL text plus positional parameters in the dialect's placeholder style.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Per-row existence check followed by UPDATE or INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMerge {
    /// Returns a single count; `None` when the table has no primary key.
    pub exists: Option<Statement>,
    pub update: Option<Statement>,
    pub insert: Statement,
}

/// Outcome of one upsert batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertReport {
    /// Rows affected as reported by the driver.
    pub affected: u64,
    /// Rows written or found unchanged.
    pub rows_written: usize,
    /// Failures of individual rows in a per-row plan.
    pub row_errors: Vec<String>,
}

/// How a batch of rows gets written to the target.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertPlan {
    Single(Statement),
    PerRow(Vec<RowMerge>),
}

/// SQL a dialect needs for catalog discovery and writes.
///
/// Implementations only build statements; [`Catalog`] executes them.
pub trait DialectSql: Send + Sync {
    fn quote_identifier(&self, name: &str) -> String;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    fn list_tables(&self) -> Statement;

    fn primary_key_columns(&self, table: &str) -> Statement;

    /// Returns one row holding a count.
    fn table_exists(&self, table: &str) -> Statement;

    /// Rows of `(name, owning_table, schema)`.
    fn objects_of_kind(&self, kind: ObjectKind) -> Statement;

    fn object_definition(&self, kind: ObjectKind, name: &str, owning_table: Option<&str>)
        -> Statement;

    /// Pull the bare CREATE statement out of a definition query's result.
    fn extract_definition(&self, kind: ObjectKind, rows: &[Row]) -> Option<String> {
        let _ = kind;
        rows.first().and_then(|row| row.text(0))
    }

    fn drop_object(&self, object: &DatabaseObject) -> Result<Statement>;

    fn select_page(&self, table: &str, order_by: &[String], limit: usize, offset: usize)
        -> Statement;

    fn select_all(&self, table: &str) -> Statement {
        Statement::new(format!("SELECT * FROM {}", self.quote_identifier(table)))
    }

    fn count_rows(&self, table: &str) -> Statement {
        Statement::new(format!("SELECT COUNT(*) FROM {}", self.quote_identifier(table)))
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
        primary_key_columns: &[String],
    ) -> UpsertPlan;
}

/// Statement builder for `dialect`.
pub fn sql_for(dialect: Dialect) -> &'static dyn DialectSql {
    match dialect {
        Dialect::Mysql => &MySqlSql,
        Dialect::Postgres => &PostgresSql,
        Dialect::Oracle => &OracleSql,
    }
}

/// Comma-separated placeholder groups for a multi-row VALUES clause.
pub(crate) fn values_clause(sql: &dyn DialectSql, columns: usize, rows: usize) -> String {
    let mut groups = Vec::with_capacity(rows);
    for row_idx in 0..rows {
        let placeholders: Vec<String> = (0..columns)
            .map(|col_idx| sql.placeholder(row_idx * columns + col_idx + 1))
            .collect();
        groups.push(format!("({})", placeholders.join(", ")));
    }
    groups.join(", ")
}

/// Catalog access and writes against one live connection.
pub struct Catalog<'a> {
    client: &'a dyn SqlClient,
    sql: &'static dyn DialectSql,
    dialect: Dialect,
}

impl<'a> Catalog<'a> {
    pub fn new(client: &'a dyn SqlClient) -> Self {
        let dialect = client.dialect();
        Self {
            client,
            sql: sql_for(dialect),
            dialect,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn sql(&self) -> &'static dyn DialectSql {
        self.sql
    }

    pub fn client(&self) -> &dyn SqlClient {
        self.client
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(&self.sql.list_tables())
            .await
            .context("Failed to list tables")?;
        Ok(rows.iter().filter_map(|row| row.text(0)).collect())
    }

    pub async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(&self.sql.primary_key_columns(table))
            .await
            .with_context(|| format!("Failed to read primary key of '{}'", table))?;
        Ok(rows.iter().filter_map(|row| row.text(0)).collect())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self
            .client
            .query(&self.sql.table_exists(table))
            .await
            .with_context(|| format!("Failed to check whether '{}' exists", table))?;
        Ok(first_count(&rows) > 0)
    }

    pub async fn objects_of_kind(&self, kind: ObjectKind) -> Result<Vec<DatabaseObject>> {
        let rows = self
            .client
            .query(&self.sql.objects_of_kind(kind))
            .await
            .with_context(|| format!("Failed to list {} objects", kind))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.text(0)?;
                Some(DatabaseObject {
                    kind,
                    name,
                    owning_table: row.text(1).filter(|t| !t.is_empty()),
                    schema: row.text(2).unwrap_or_default(),
                })
            })
            .collect())
    }

    pub async fn object_definition(&self, object: &DatabaseObject) -> Result<String> {
        let statement =
            self.sql
                .object_definition(object.kind, &object.name, object.owning_table.as_deref());
        let rows = self
            .client
            .query(&statement)
            .await
            .with_context(|| format!("Failed to read definition of {} '{}'", object.kind, object.name))?;
        match self.sql.extract_definition(object.kind, &rows) {
            Some(definition) if !definition.trim().is_empty() => Ok(definition),
            _ => bail!("{} '{}' has no readable definition", object.kind, object.name),
        }
    }

    pub async fn drop_object(&self, object: &DatabaseObject) -> Result<()> {
        let statement = self.sql.drop_object(object)?;
        self.client
            .execute(&statement)
            .await
            .with_context(|| format!("Failed to drop {} '{}'", object.kind, object.name))?;
        Ok(())
    }

    /// Run a DDL statement verbatim.
    pub async fn execute_ddl(&self, sql: &str) -> Result<()> {
        self.client.execute(&Statement::new(sql)).await?;
        Ok(())
    }

    pub async fn fetch_page(
        &self,
        table: &str,
        order_by: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Row>> {
        self.client
            .query(&self.sql.select_page(table, order_by, limit, offset))
            .await
            .with_context(|| format!("Failed to read rows {}..{} of '{}'", offset, offset + limit, table))
    }

    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let rows = self
            .client
            .query(&self.sql.count_rows(table))
            .await
            .with_context(|| format!("Failed to count rows of '{}'", table))?;
        Ok(first_count(&rows))
    }

    pub async fn fetch_all(&self, table: &str) -> Result<Vec<Row>> {
        self.client
            .query(&self.sql.select_all(table))
            .await
            .with_context(|| format!("Failed to read '{}'", table))
    }

    /// Write rows with the dialect's upsert strategy.
    ///
    /// A single-statement plan fails as a whole. A per-row plan writes each
    /// row on its own, so one bad row is reported in
    /// [`UpsertReport::row_errors`] and the rest still land.
    pub async fn upsert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
        primary_key_columns: &[String],
    ) -> Result<UpsertReport> {
        if rows.is_empty() {
            return Ok(UpsertReport::default());
        }

        match self
            .sql
            .build_upsert(table, columns, rows, primary_key_columns)
        {
            UpsertPlan::Single(statement) => {
                let affected = self
                    .client
                    .execute(&statement)
                    .await
                    .with_context(|| format!("Failed to upsert {} rows into '{}'", rows.len(), table))?;
                Ok(UpsertReport {
                    affected,
                    rows_written: rows.len(),
                    row_errors: Vec::new(),
                })
            }
            UpsertPlan::PerRow(merges) => {
                let mut report = UpsertReport::default();
                for (idx, merge) in merges.iter().enumerate() {
                    match self.apply_merge(table, merge).await {
                        Ok(affected) => {
                            report.affected += affected;
                            report.rows_written += 1;
                        }
                        Err(e) => {
                            tracing::warn!("Row {} of batch into '{}' failed: {:#}", idx + 1, table, e);
                            report.row_errors.push(format!("row {}: {:#}", idx + 1, e));
                        }
                    }
                }
                Ok(report)
            }
        }
    }

    async fn apply_merge(&self, table: &str, merge: &RowMerge) -> Result<u64> {
        let exists = match &merge.exists {
            Some(check) => {
                let rows = self
                    .client
                    .query(check)
                    .await
                    .with_context(|| format!("Failed to look up row in '{}'", table))?;
                first_count(&rows) > 0
            }
            None => false,
        };

        let statement = match (&merge.update, exists) {
            (Some(update), true) => update,
            (None, true) => return Ok(0),
            (_, false) => &merge.insert,
        };
        self.client
            .execute(statement)
            .await
            .with_context(|| format!("Failed to write row into '{}'", table))
    }
}

fn first_count(rows: &[Row]) -> i64 {
    rows.first()
        .and_then(|row| row.values().first())
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
