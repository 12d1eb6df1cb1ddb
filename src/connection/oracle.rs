// ABOUTME: Oracle client on the blocking `oracle` crate (ODPI-C), run via spawn_blocking
// ABOUTME: Compiled only with the `oracle` feature because it needs Oracle Instant Client

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use oracle::sql_type::{OracleType, ToSql};
use oracle::Connection;

use super::SqlClient;
use crate::catalog::Statement;
use crate::models::{ConnectionDescriptor, Dialect};
use crate::value::{Row, Value};

pub struct OracleClient {
    conn: Arc<Mutex<Connection>>,
}

impl OracleClient {
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let user = descriptor.username.clone();
        let password = descriptor.password.clone();
        let connect_string = format!(
            "//{}:{}/{}",
            descriptor.host, descriptor.port, descriptor.database
        );
        let url = descriptor.display_url();

        let conn = tokio::task::spawn_blocking(move || {
            Connection::connect(&user, &password, &connect_string)
        })
        .await
        .context("Oracle connect task panicked")?
        .with_context(|| format!("Failed to connect to {}", url))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("Oracle connection lock poisoned"))?;
            work(&guard)
        })
        .await
        .context("Oracle task panicked")?
    }
}

#[async_trait]
impl SqlClient for OracleClient {
    fn dialect(&self) -> Dialect {
        Dialect::Oracle
    }

    async fn ping(&self) -> Result<()> {
        self.blocking(|conn| conn.ping().context("Oracle ping failed"))
            .await
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        let statement = statement.clone();
        self.blocking(move |conn| {
            let params = to_params(&statement.params);
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let result = conn
                .query(&statement.sql, &refs)
                .with_context(|| format!("Oracle query failed: {}", statement.sql))?;
            let columns: Vec<String> = result
                .column_info()
                .iter()
                .map(|info| info.name().to_string())
                .collect();

            let mut rows = Vec::new();
            for row in result {
                let row = row?;
                let values = row
                    .sql_values()
                    .iter()
                    .map(from_sql_value)
                    .collect::<Result<Vec<_>>>()?;
                rows.push(Row::new(columns.clone(), values));
            }
            Ok(rows)
        })
        .await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let statement = statement.clone();
        self.blocking(move |conn| {
            let params = to_params(&statement.params);
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let stmt = conn
                .execute(&statement.sql, &refs)
                .with_context(|| format!("Oracle statement failed: {}", statement.sql))?;
            let affected = stmt.row_count().unwrap_or(0);
            conn.commit().context("Oracle commit failed")?;
            Ok(affected)
        })
        .await
    }
}

fn to_params(values: &[Value]) -> Vec<Box<dyn ToSql + Send>> {
    values
        .iter()
        .map(|value| -> Box<dyn ToSql + Send> {
            match value {
                Value::Null => Box::new(None::<String>),
                Value::Bool(b) => Box::new(i64::from(*b)),
                Value::Int(n) => Box::new(*n),
                Value::UInt(n) => Box::new(*n as f64),
                Value::Float(f) => Box::new(*f),
                Value::Bytes(b) => Box::new(b.clone()),
                Value::Date(d) => Box::new(*d),
                Value::Timestamp(ts) => Box::new(*ts),
                Value::TimestampTz(ts) => Box::new(ts.naive_utc()),
                other => Box::new(other.to_text().unwrap_or_default()),
            }
        })
        .collect()
}

fn from_sql_value(value: &oracle::SqlValue) -> Result<Value> {
    if value.is_null()? {
        return Ok(Value::Null);
    }
    let converted = match value.oracle_type()? {
        OracleType::Number(_, scale) if *scale == 0 => match value.get::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Text(value.get::<String>()?),
        },
        OracleType::Number(..) => Value::Text(value.get::<String>()?),
        OracleType::BinaryFloat | OracleType::BinaryDouble => Value::Float(value.get::<f64>()?),
        OracleType::Date => Value::Timestamp(value.get::<NaiveDateTime>()?),
        OracleType::Timestamp(_) | OracleType::TimestampLTZ(_) => {
            Value::Timestamp(value.get::<NaiveDateTime>()?)
        }
        OracleType::TimestampTZ(_) => Value::TimestampTz(
            value
                .get::<chrono::DateTime<chrono::FixedOffset>>()?
                .with_timezone(&chrono::Utc),
        ),
        OracleType::Raw(_) | OracleType::BLOB | OracleType::LongRaw => {
            Value::Bytes(value.get::<Vec<u8>>()?)
        }
        _ => Value::Text(value.get::<String>()?),
    };
    Ok(converted)
}
