// ABOUTME: Conflict manager - records divergent rows, notifies admins, applies resolutions
// ABOUTME: Resolution writes the chosen snapshot back to the target, then closes the conflict

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::catalog::Catalog;
use crate::connection::{ConnectionProvider, SqlClient};
use crate::error::SyncError;
use crate::models::{ConflictStatus, DataConflict, LogLevel, NewConflict, Resolution};
use crate::notify::{ConflictNotice, Notifier};
use crate::store::MetadataStore;
use crate::token::{TokenCodec, TokenError};
use crate::value::Value;

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("conflict {0} not found")]
    NotFound(i64),

    #[error("conflict {0} is already resolved")]
    AlreadyResolved(i64),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct ConflictManager {
    store: Arc<dyn MetadataStore>,
    provider: Arc<ConnectionProvider>,
    notifier: Arc<dyn Notifier>,
    tokens: TokenCodec,
    public_url: String,
}

impl ConflictManager {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        provider: Arc<ConnectionProvider>,
        notifier: Arc<dyn Notifier>,
        tokens: TokenCodec,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
            tokens,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Persist a conflict and tell every active admin about it.
    ///
    /// Notification failures are logged against the task and never returned.
    pub async fn record(&self, new: &NewConflict) -> anyhow::Result<DataConflict> {
        let conflict = self
            .store
            .create_conflict(new)
            .with_context(|| format!("Failed to record conflict on '{}'", new.table_name))?;
        tracing::warn!(
            "Conflict {} on {} {}",
            conflict.id,
            conflict.table_name,
            conflict.primary_key
        );
        self.notify_admins(&conflict).await;
        Ok(conflict)
    }

    async fn notify_admins(&self, conflict: &DataConflict) {
        let admins = match self.store.active_admins() {
            Ok(admins) => admins,
            Err(e) => {
                tracing::warn!("Could not load admins for conflict {}: {:#}", conflict.id, e);
                return;
            }
        };
        if admins.is_empty() {
            tracing::debug!("No active admins to notify about conflict {}", conflict.id);
        }

        for admin in admins {
            let token = match self
                .tokens
                .conflict_view_token(conflict.id, admin.id, &admin.username)
            {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!("Could not sign view link for {}: {}", admin.username, e);
                    continue;
                }
            };
            let notice = ConflictNotice::for_conflict(
                &admin.email,
                conflict.id,
                conflict.kind.as_str(),
                &conflict.table_name,
                &self.view_link(&token),
                self.tokens.ttl().num_hours(),
            );
            if let Err(e) = self.notifier.notify_conflict(&notice).await {
                let message = format!("Failed to send conflict notice to {}", admin.email);
                tracing::warn!("{}: {:#}", message, e);
                let details = format!("{:#}", e);
                if let Err(log_err) = self.store.append_sync_log(
                    conflict.task_id,
                    LogLevel::Error,
                    &message,
                    Some(&details),
                ) {
                    tracing::warn!("Failed to write sync log: {:#}", log_err);
                }
            }
        }
    }

    pub fn view_link(&self, token: &str) -> String {
        format!("{}/api/v1/conflicts/view?token={}", self.public_url, token)
    }

    pub fn list(&self, status: Option<ConflictStatus>) -> Result<Vec<DataConflict>, ConflictError> {
        Ok(self.store.list_conflicts(status)?)
    }

    pub fn get(&self, id: i64) -> Result<DataConflict, ConflictError> {
        self.store
            .get_conflict(id)?
            .ok_or(ConflictError::NotFound(id))
    }

    /// Look up the conflict a view link points at.
    pub fn view_by_token(&self, token: &str) -> Result<DataConflict, ConflictError> {
        let claims = self.tokens.decode_conflict_view(token)?;
        self.get(claims.conflict_id)
    }

    /// Apply the chosen snapshot to the target and close the conflict.
    pub async fn resolve(
        &self,
        id: i64,
        resolution: Resolution,
        resolved_by: i64,
    ) -> Result<DataConflict, ConflictError> {
        let conflict = self.get(id)?;
        if conflict.status == ConflictStatus::Resolved {
            return Err(ConflictError::AlreadyResolved(id));
        }

        let task = self
            .store
            .get_task(conflict.task_id)?
            .ok_or_else(|| SyncError::config(format!("task {} no longer exists", conflict.task_id)))?;
        let target = self
            .store
            .get_connection(task.target_db_id)?
            .ok_or_else(|| {
                SyncError::config(format!("connection {} no longer exists", task.target_db_id))
            })?;

        let client = self.provider.acquire(&target).await?;
        apply_snapshot(client.as_ref(), &conflict, resolution).await?;

        if !self
            .store
            .mark_conflict_resolved(id, resolution, resolved_by, Utc::now())?
        {
            return Err(ConflictError::AlreadyResolved(id));
        }
        tracing::info!(
            "Resolved conflict {} on {} with {} data",
            id,
            conflict.table_name,
            resolution
        );
        self.get(id)
    }
}

/// Upsert the chosen side's row image into the target table.
pub async fn apply_snapshot(
    client: &dyn SqlClient,
    conflict: &DataConflict,
    resolution: Resolution,
) -> anyhow::Result<()> {
    let snapshot = match resolution {
        Resolution::Source => &conflict.source_data,
        Resolution::Target => &conflict.target_data,
    };
    let data = parse_object(snapshot)
        .with_context(|| format!("Conflict {} has an unreadable {} snapshot", conflict.id, resolution))?;
    let primary_key = parse_object(&conflict.primary_key)
        .with_context(|| format!("Conflict {} has an unreadable primary key", conflict.id))?;

    let pk_columns: Vec<String> = primary_key.keys().cloned().collect();
    let (columns, values): (Vec<String>, Vec<Value>) = data
        .iter()
        .map(|(column, json)| (column.clone(), Value::from_json(json)))
        .unzip();

    let report = Catalog::new(client)
        .upsert(&conflict.table_name, &columns, &[values], &pk_columns)
        .await?;
    if let Some(error) = report.row_errors.first() {
        bail!("Failed to apply conflict {}: {}", conflict.id, error);
    }
    Ok(())
}

fn parse_object(text: &str) -> anyhow::Result<Map<String, JsonValue>> {
    match serde_json::from_str(text)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(anyhow!("expected a JSON object, found {}", other)),
    }
}
