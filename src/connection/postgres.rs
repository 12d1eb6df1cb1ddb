// ABOUTME: PostgreSQL client built on tokio-postgres with native-tls
// ABOUTME: Converts between canonical values and server types using prepared parameter types

use std::error::Error;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::Client;

use super::SqlClient;
use crate::catalog::Statement;
use crate::models::{ConnectionDescriptor, Dialect};
use crate::value::{parse_timestamp, Row, Value};

/// A single tokio-postgres connection.
///
/// The client pipelines concurrent requests, so one instance serves both the
/// pooled and raw flavors.
pub struct PostgresClient {
    client: Client,
}

impl PostgresClient {
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&descriptor.host)
            .port(descriptor.port)
            .user(&descriptor.username)
            .dbname(&descriptor.database)
            .connect_timeout(std::time::Duration::from_secs(10));
        if !descriptor.password.is_empty() {
            config.password(&descriptor.password);
        }

        let connector = TlsConnector::builder()
            .build()
            .context("Failed to build TLS connector")?;
        let tls = MakeTlsConnector::new(connector);

        let (client, connection) = config
            .connect(tls)
            .await
            .with_context(|| format!("Failed to connect to {}", descriptor.display_url()))?;

        let url = descriptor.display_url();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error ({}): {}", url, e);
            }
        });

        Ok(Self { client })
    }

    async fn bind(&self, statement: &Statement) -> Result<(tokio_postgres::Statement, Vec<Box<dyn ToSql + Sync + Send>>)> {
        let prepared = self
            .client
            .prepare(&statement.sql)
            .await
            .with_context(|| format!("Failed to prepare: {}", statement.sql))?;
        if prepared.params().len() != statement.params.len() {
            anyhow::bail!(
                "statement expects {} parameters, got {}",
                prepared.params().len(),
                statement.params.len()
            );
        }
        let params = prepared
            .params()
            .iter()
            .zip(&statement.params)
            .map(|(ty, value)| to_param(value, ty))
            .collect::<Result<Vec<_>>>()?;
        Ok((prepared, params))
    }
}

#[async_trait]
impl SqlClient for PostgresClient {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .context("PostgreSQL ping failed")?;
        Ok(())
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        let (prepared, params) = self.bind(statement).await?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|v| v.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let rows = self.client.query(&prepared, &refs).await?;
        rows.iter().map(from_pg_row).collect()
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        if statement.params.is_empty() {
            // DDL such as CREATE FUNCTION bodies cannot always be prepared.
            self.client.batch_execute(&statement.sql).await?;
            return Ok(0);
        }
        let (prepared, params) = self.bind(statement).await?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|v| v.as_ref() as &(dyn ToSql + Sync))
            .collect();
        Ok(self.client.execute(&prepared, &refs).await?)
    }
}

/// Raw column bytes for types without a dedicated conversion (enums, domains, citext).
struct Opaque(Vec<u8>);

impl<'a> FromSql<'a> for Opaque {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Opaque(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn from_pg_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(
            column_value(row, idx, column.type_())
                .with_context(|| format!("Failed to decode column '{}'", column.name()))?,
        );
    }
    Ok(Row::new(columns, values))
}

fn column_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|n| Value::Int(n.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|n| Value::Int(n.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(|n| Value::UInt(n.into())),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|n| Value::Float(n.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(|d| Value::Text(d.to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|u| Value::Text(u.hyphenated().to_string())),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Value::TimestampTz),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map(|t| Value::Text(t.format("%H:%M:%S%.f").to_string())),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::Json),
        _ => row
            .try_get::<_, Option<Opaque>>(idx)?
            .map(|raw| Value::Bytes(raw.0)),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn mismatch(value: &Value, ty: &Type) -> anyhow::Error {
    anyhow!("cannot bind {:?} to a {} parameter", value, ty)
}

/// Box a canonical value as the Rust type tokio-postgres expects for `ty`.
fn to_param(value: &Value, ty: &Type) -> Result<Box<dyn ToSql + Sync + Send>> {
    let null = value.is_null();
    let param: Box<dyn ToSql + Sync + Send> = match *ty {
        Type::BOOL => Box::new(if null {
            None
        } else {
            Some(value.as_bool().ok_or_else(|| mismatch(value, ty))?)
        }),
        Type::INT2 => Box::new(if null {
            None
        } else {
            let n = value.as_i64().ok_or_else(|| mismatch(value, ty))?;
            Some(i16::try_from(n).map_err(|_| mismatch(value, ty))?)
        }),
        Type::INT4 => Box::new(if null {
            None
        } else {
            let n = value.as_i64().ok_or_else(|| mismatch(value, ty))?;
            Some(i32::try_from(n).map_err(|_| mismatch(value, ty))?)
        }),
        Type::INT8 => Box::new(if null {
            None
        } else {
            Some(value.as_i64().ok_or_else(|| mismatch(value, ty))?)
        }),
        Type::FLOAT4 => Box::new(if null {
            None
        } else {
            Some(value.as_f64().ok_or_else(|| mismatch(value, ty))? as f32)
        }),
        Type::FLOAT8 => Box::new(if null {
            None
        } else {
            Some(value.as_f64().ok_or_else(|| mismatch(value, ty))?)
        }),
        Type::NUMERIC => Box::new(if null { None } else { Some(to_decimal(value, ty)?) }),
        Type::UUID => Box::new(if null {
            None
        } else {
            let text = value.to_text().ok_or_else(|| mismatch(value, ty))?;
            Some(uuid::Uuid::parse_str(&text).map_err(|_| mismatch(value, ty))?)
        }),
        Type::DATE => Box::new(match value {
            Value::Null => None,
            Value::Date(d) => Some(*d),
            other => Some(to_instant(other, ty)?.date_naive()),
        }),
        Type::TIMESTAMP => Box::new(match value {
            Value::Null => None,
            Value::Timestamp(ts) => Some(*ts),
            other => Some(to_instant(other, ty)?.naive_utc()),
        }),
        Type::TIMESTAMPTZ => Box::new(if null { None } else { Some(to_instant(value, ty)?) }),
        Type::JSON | Type::JSONB => Box::new(match value {
            Value::Null => None,
            Value::Json(json) => Some(json.clone()),
            Value::Text(text) => Some(
                serde_json::from_str::<serde_json::Value>(text)
                    .unwrap_or_else(|_| serde_json::Value::String(text.clone())),
            ),
            other => Some(other.to_json()),
        }),
        Type::BYTEA => Box::new(match value {
            Value::Null => None,
            Value::Bytes(bytes) => Some(bytes.clone()),
            other => other.to_text().map(String::into_bytes),
        }),
        _ => Box::new(value.to_text()),
    };
    Ok(param)
}

fn to_decimal(value: &Value, ty: &Type) -> Result<Decimal> {
    match value {
        Value::Int(n) => Ok(Decimal::from(*n)),
        Value::UInt(n) => Ok(Decimal::from(*n)),
        Value::Float(f) => Decimal::try_from(*f).map_err(|_| mismatch(value, ty)),
        other => other
            .to_text()
            .and_then(|t| t.trim().parse::<Decimal>().ok())
            .ok_or_else(|| mismatch(value, ty)),
    }
}

fn to_instant(value: &Value, ty: &Type) -> Result<DateTime<Utc>> {
    match value {
        Value::TimestampTz(ts) => Ok(*ts),
        Value::Timestamp(ts) => Ok(ts.and_utc()),
        Value::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .map(|ts| ts.and_utc())
            .ok_or_else(|| mismatch(value, ty)),
        Value::Text(text) => parse_timestamp(text).ok_or_else(|| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_binds_to_integer_column() {
        assert!(to_param(&Value::Text("42".into()), &Type::INT4).is_ok());
        assert!(to_param(&Value::Text("forty".into()), &Type::INT4).is_err());
    }

    #[test]
    fn test_out_of_range_integer_is_rejected() {
        assert!(to_param(&Value::Int(70_000), &Type::INT2).is_err());
        assert!(to_param(&Value::Int(70_000), &Type::INT4).is_ok());
    }

    #[test]
    fn test_null_binds_to_any_type() {
        for ty in [Type::BOOL, Type::INT8, Type::UUID, Type::TIMESTAMPTZ, Type::JSONB, Type::TEXT] {
            assert!(to_param(&Value::Null, &ty).is_ok(), "failed for {}", ty);
        }
    }

    #[test]
    fn test_timestamp_text_binds_to_timestamptz() {
        assert!(to_param(&Value::Text("2024-03-01 10:00:00".into()), &Type::TIMESTAMPTZ).is_ok());
        assert!(to_param(&Value::Text("yesterday".into()), &Type::TIMESTAMP).is_err());
    }

    #[test]
    fn test_decimal_from_text_and_float() {
        assert_eq!(
            to_decimal(&Value::Text("12.50".into()), &Type::NUMERIC).unwrap(),
            "12.50".parse::<Decimal>().unwrap()
        );
        assert!(to_decimal(&Value::Float(f64::NAN), &Type::NUMERIC).is_err());
    }

    #[test]
    fn test_uuid_text_binds() {
        assert!(to_param(
            &Value::Text("550e8400-e29b-41d4-a716-446655440000".into()),
            &Type::UUID
        )
        .is_ok());
        assert!(to_param(&Value::Text("nope".into()), &Type::UUID).is_err());
    }
}
