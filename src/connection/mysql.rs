// ABOUTME: MySQL clients built on mysql_async - a shared pool and a single raw connection
// ABOUTME: Converts between mysql_async values and the canonical value model

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool};
use tokio::sync::Mutex;

use super::SqlClient;
use crate::catalog::Statement;
use crate::models::{ConnectionDescriptor, Dialect};
use crate::value::{decode_text_bytes, Row, Value};

/// Character set id MySQL reports for binary columns.
const BINARY_CHARSET: u16 = 63;

fn opts_for(descriptor: &ConnectionDescriptor) -> Opts {
    let builder = OptsBuilder::default()
        .ip_or_hostname(descriptor.host.clone())
        .tcp_port(descriptor.port)
        .user(Some(descriptor.username.clone()))
        .pass(Some(descriptor.password.clone()))
        .db_name(Some(descriptor.database.clone()))
        .prefer_socket(false);
    Opts::from(builder)
}

/// Pooled MySQL client shared across sync runs.
pub struct MySqlPool {
    pool: Pool,
}

impl MySqlPool {
    /// Create the pool and check one connection out so bad credentials fail here.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let pool = Pool::new(opts_for(descriptor));
        let mut conn = pool
            .get_conn()
            .await
            .with_context(|| format!("Failed to connect to {}", descriptor.display_url()))?;
        conn.ping().await.context("MySQL ping failed")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SqlClient for MySqlPool {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.ping().await.context("MySQL ping failed")?;
        Ok(())
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        let mut conn = self.pool.get_conn().await?;
        run_query(&mut conn, statement).await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let mut conn = self.pool.get_conn().await?;
        run_execute(&mut conn, statement).await
    }
}

/// One dedicated MySQL connection, opened fresh per use.
pub struct MySqlConnection {
    conn: Mutex<Conn>,
}

impl MySqlConnection {
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let conn = Conn::new(opts_for(descriptor))
            .await
            .with_context(|| format!("Failed to connect to {}", descriptor.display_url()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl SqlClient for MySqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    async fn ping(&self) -> Result<()> {
        self.conn
            .lock()
            .await
            .ping()
            .await
            .context("MySQL ping failed")?;
        Ok(())
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        let mut conn = self.conn.lock().await;
        run_query(&mut conn, statement).await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        run_execute(&mut conn, statement).await
    }
}

/// SHOW statements are not all preparable, so they go over the text protocol.
fn needs_text_protocol(statement: &Statement) -> bool {
    statement.params.is_empty()
        && statement
            .sql
            .trim_start()
            .get(..4)
            .map(|head| head.eq_ignore_ascii_case("show"))
            .unwrap_or(false)
}

fn params_for(statement: &Statement) -> Params {
    if statement.params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(statement.params.iter().map(to_mysql).collect())
    }
}

async fn run_query(conn: &mut Conn, statement: &Statement) -> Result<Vec<Row>> {
    let rows: Vec<mysql_async::Row> = if needs_text_protocol(statement) {
        conn.query(statement.sql.as_str()).await
    } else {
        conn.exec(statement.sql.as_str(), params_for(statement)).await
    }
    .with_context(|| format!("MySQL query failed: {}", statement.sql))?;
    Ok(rows.into_iter().map(from_mysql_row).collect())
}

async fn run_execute(conn: &mut Conn, statement: &Statement) -> Result<u64> {
    if statement.params.is_empty() {
        // Routine and trigger DDL must use the text protocol.
        conn.query_drop(statement.sql.as_str()).await
    } else {
        conn.exec_drop(statement.sql.as_str(), params_for(statement))
            .await
    }
    .with_context(|| format!("MySQL statement failed: {}", statement.sql))?;
    Ok(conn.affected_rows())
}

fn from_mysql_row(mut row: mysql_async::Row) -> Row {
    let columns: Vec<mysql_async::Column> = row.columns_ref().to_vec();
    let mut names = Vec::with_capacity(columns.len());
    let mut values = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        names.push(column.name_str().into_owned());
        let raw = row
            .take::<mysql_async::Value, _>(idx)
            .unwrap_or(mysql_async::Value::NULL);
        values.push(from_mysql(raw, column));
    }
    Row::new(names, values)
}

fn from_mysql(value: mysql_async::Value, column: &mysql_async::Column) -> Value {
    use mysql_async::Value as My;
    match value {
        My::NULL => Value::Null,
        My::Bytes(bytes) if column.character_set() == BINARY_CHARSET => Value::Bytes(bytes),
        My::Bytes(bytes) => decode_text_bytes(bytes),
        My::Int(n) => Value::Int(n),
        My::UInt(n) => Value::UInt(n),
        My::Float(f) => Value::Float(f.into()),
        My::Double(f) => Value::Float(f),
        My::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(year.into(), month.into(), day.into());
            match (date, column.column_type()) {
                (Some(date), ColumnType::MYSQL_TYPE_DATE) => Value::Date(date),
                (Some(date), _) => date
                    .and_hms_micro_opt(hour.into(), minute.into(), second.into(), micros)
                    .map(Value::Timestamp)
                    .unwrap_or(Value::Null),
                // Zero dates such as 0000-00-00 have no calendar equivalent.
                (None, _) => Value::Null,
            }
        }
        My::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = days * 24 + u32::from(hours);
            let sign = if negative { "-" } else { "" };
            let text = if micros > 0 {
                format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    sign, total_hours, minutes, seconds, micros
                )
            } else {
                format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds)
            };
            Value::Text(text)
        }
    }
}

fn date_value(date: NaiveDate, hour: u32, minute: u32, second: u32, micros: u32) -> mysql_async::Value {
    mysql_async::Value::Date(
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
        hour as u8,
        minute as u8,
        second as u8,
        micros,
    )
}

fn to_mysql(value: &Value) -> mysql_async::Value {
    use mysql_async::Value as My;
    match value {
        Value::Null => My::NULL,
        Value::Bool(b) => My::Int(i64::from(*b)),
        Value::Int(n) => My::Int(*n),
        Value::UInt(n) => My::UInt(*n),
        Value::Float(f) => My::Double(*f),
        Value::Text(s) => My::Bytes(s.clone().into_bytes()),
        Value::Bytes(b) => My::Bytes(b.clone()),
        Value::Date(d) => date_value(*d, 0, 0, 0, 0),
        Value::Timestamp(ts) => date_value(
            ts.date(),
            ts.hour(),
            ts.minute(),
            ts.second(),
            ts.nanosecond() / 1_000,
        ),
        Value::TimestampTz(ts) => {
            let naive = ts.naive_utc();
            date_value(
                naive.date(),
                naive.hour(),
                naive.minute(),
                naive.second(),
                naive.nanosecond() / 1_000,
            )
        }
        Value::Json(json) => My::Bytes(json.to_string().into_bytes()),
    }
}
