// ABOUTME: Connection provider - turns a connection descriptor into a live SQL client
// ABOUTME: Pooled clients are cached per connection id; raw clients are opened per call

mod mysql;
#[cfg(feature = "oracle")]
mod oracle;
mod postgres;

pub use mysql::{MySqlConnection, MySqlPool};
pub use postgres::PostgresClient;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::Statement;
use crate::error::{SyncError, SyncResult};
use crate::models::{ConnectionDescriptor, Dialect};
use crate::value::Row;

/// Minimal surface every dialect driver exposes to the engine.
#[async_trait]
pub trait SqlClient: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn ping(&self) -> Result<()>;

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>>;

    /// Returns the number of affected rows.
    async fn execute(&self, statement: &Statement) -> Result<u64>;
}

/// Process-wide cache of pooled clients, keyed by connection id.
///
/// Owned by the composition root and handed to the engine components; two
/// tasks that use the same connection share one client.
#[derive(Default)]
pub struct ConnectionProvider {
    pooled: RwLock<HashMap<i64, Arc<dyn SqlClient>>>,
    #[cfg(test)]
    raw_routes: std::sync::Mutex<HashMap<i64, Arc<dyn SqlClient>>>,
}

impl ConnectionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached pooled client for `descriptor`, connecting on first use.
    pub async fn acquire(&self, descriptor: &ConnectionDescriptor) -> SyncResult<Arc<dyn SqlClient>> {
        if let Some(client) = self.pooled.read().await.get(&descriptor.id) {
            return Ok(Arc::clone(client));
        }

        let client = connect_pooled(descriptor).await?;

        let mut pooled = self.pooled.write().await;
        // Another caller may have connected while we were; keep the first.
        let entry = pooled
            .entry(descriptor.id)
            .or_insert_with(|| Arc::clone(&client));
        tracing::debug!("Cached pooled client for {}", descriptor.display_url());
        Ok(Arc::clone(entry))
    }

    /// Open a fresh, unshared client for dialect-specific catalog work.
    pub async fn open_raw(&self, descriptor: &ConnectionDescriptor) -> SyncResult<Box<dyn SqlClient>> {
        #[cfg(test)]
        {
            if let Some(client) = self.routed_raw(descriptor.id) {
                return Ok(client);
            }
        }

        match descriptor.dialect {
            Dialect::Mysql => {
                let conn = MySqlConnection::connect(descriptor)
                    .await
                    .map_err(|e| SyncError::connectivity(&descriptor.name, e))?;
                Ok(Box::new(conn))
            }
            Dialect::Postgres => {
                let client = PostgresClient::connect(descriptor)
                    .await
                    .map_err(|e| SyncError::connectivity(&descriptor.name, e))?;
                Ok(Box::new(client))
            }
            Dialect::Oracle => open_oracle(descriptor).await,
        }
    }

    /// Open a raw client and ping it.
    pub async fn test(&self, descriptor: &ConnectionDescriptor) -> SyncResult<()> {
        let client = self.open_raw(descriptor).await?;
        client
            .ping()
            .await
            .map_err(|e| SyncError::connectivity(&descriptor.name, e))
    }

    /// Pre-seed the cache, replacing any existing entry.
    pub async fn register(&self, id: i64, client: Arc<dyn SqlClient>) {
        self.pooled.write().await.insert(id, client);
    }

    /// Evict and drop the pooled client for `id`.
    ///
    /// Returns whether an entry was present.
    pub async fn close(&self, id: i64) -> bool {
        let removed = self.pooled.write().await.remove(&id);
        if removed.is_some() {
            tracing::info!("Closed pooled connection {}", id);
        }
        removed.is_some()
    }

    pub async fn cached_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.pooled.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Serve `client` from `open_raw` for connection `id`.
    #[cfg(test)]
    pub(crate) fn route_raw(&self, id: i64, client: Arc<dyn SqlClient>) {
        self.raw_routes.lock().unwrap().insert(id, client);
    }

    #[cfg(test)]
    fn routed_raw(&self, id: i64) -> Option<Box<dyn SqlClient>> {
        let client = self.raw_routes.lock().unwrap().get(&id).cloned()?;
        Some(Box::new(testing::Shared(client)))
    }
}

async fn connect_pooled(descriptor: &ConnectionDescriptor) -> SyncResult<Arc<dyn SqlClient>> {
    match descriptor.dialect {
        Dialect::Mysql => {
            let pool = MySqlPool::connect(descriptor)
                .await
                .map_err(|e| SyncError::connectivity(&descriptor.name, e))?;
            Ok(Arc::new(pool))
        }
        Dialect::Postgres => {
            let client = PostgresClient::connect(descriptor)
                .await
                .map_err(|e| SyncError::connectivity(&descriptor.name, e))?;
            Ok(Arc::new(client))
        }
        Dialect::Oracle => open_oracle(descriptor).await.map(Arc::from),
    }
}

#[cfg(feature = "oracle")]
async fn open_oracle(descriptor: &ConnectionDescriptor) -> SyncResult<Box<dyn SqlClient>> {
    let client = oracle::OracleClient::connect(descriptor)
        .await
        .map_err(|e| SyncError::connectivity(&descriptor.name, e))?;
    Ok(Box::new(client))
}

#[cfg(not(feature = "oracle"))]
async fn open_oracle(descriptor: &ConnectionDescriptor) -> SyncResult<Box<dyn SqlClient>> {
    Err(SyncError::config(format!(
        "connection '{}' uses Oracle, but this build was compiled without the `oracle` feature",
        descriptor.name
    )))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory client for exercising the engine without a server.

    use std::sync::Mutex;

    use tokio::sync::Semaphore;

    use super::*;

    type Responder = Box<dyn Fn(&Statement) -> Result<Vec<Row>> + Send + Sync>;

    pub struct ScriptedClient {
        dialect: Dialect,
        responder: Responder,
        pub executed: Mutex<Vec<Statement>>,
        pub queried: Mutex<Vec<Statement>>,
        fail_execute_containing: Mutex<Option<String>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl ScriptedClient {
        pub fn new(
            dialect: Dialect,
            responder: impl Fn(&Statement) -> Result<Vec<Row>> + Send + Sync + 'static,
        ) -> Self {
            Self {
                dialect,
                responder: Box::new(responder),
                executed: Mutex::new(Vec::new()),
                queried: Mutex::new(Vec::new()),
                fail_execute_containing: Mutex::new(None),
                gate: None,
            }
        }

        /// Hold every query until `gate` has a permit to spare.
        pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn fail_executes_containing(&self, needle: &str) {
            *self.fail_execute_containing.lock().unwrap() = Some(needle.to_string());
        }

        pub fn executed_sql(&self) -> Vec<String> {
            self.executed
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.sql.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SqlClient for ScriptedClient {
        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
            self.queried.lock().unwrap().push(statement.clone());
            if let Some(gate) = &self.gate {
                // Permits are returned on drop, so one release opens the gate for good.
                let _permit = gate.acquire().await?;
            }
            (self.responder)(statement)
        }

        async fn execute(&self, statement: &Statement) -> Result<u64> {
            self.executed.lock().unwrap().push(statement.clone());
            if let Some(needle) = self.fail_execute_containing.lock().unwrap().as_deref() {
                if statement.sql.contains(needle) {
                    anyhow::bail!("scripted failure for '{}'", needle);
                }
            }
            Ok(1)
        }
    }

    /// Hands out a shared client where an owned one is expected.
    pub struct Shared(pub Arc<dyn SqlClient>);

    #[async_trait]
    impl SqlClient for Shared {
        fn dialect(&self) -> Dialect {
            self.0.dialect()
        }

        async fn ping(&self) -> Result<()> {
            self.0.ping().await
        }

        async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
            self.0.query(statement).await
        }

        async fn execute(&self, statement: &Statement) -> Result<u64> {
            self.0.execute(statement).await
        }
    }
}
