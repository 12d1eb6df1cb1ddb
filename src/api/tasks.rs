// ABOUTME: Sync task endpoints - CRUD, start/stop/execute, and run logs
// ABOUTME: Scheduling and run tracking go through the shared Scheduler

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::ApiError;
use crate::app::App;
use crate::models::{NewSyncTask, ObjectSyncLog, SyncLog, SyncMode, SyncTask};
use crate::scheduler::parse_schedule;
use crate::sync::SyncStats;

const DEFAULT_LOG_LIMIT: usize = 100;

fn load(app: &App, id: i64) -> Result<SyncTask, ApiError> {
    app.store
        .get_task(id)?
        .ok_or_else(|| ApiError::not_found("sync task", id))
}

pub async fn create(
    State(app): State<App>,
    Json(request): Json<NewSyncTask>,
) -> Result<(StatusCode, Json<SyncTask>), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if request.mode == SyncMode::Scheduled {
        parse_schedule(request.cron_expr.as_deref().unwrap_or_default())?;
    }
    for id in [request.source_db_id, request.target_db_id] {
        if app.store.get_connection(id)?.is_none() {
            return Err(ApiError::bad_request(format!("connection {} does not exist", id)));
        }
    }
    let task = app.store.create_task(&request)?;
    tracing::info!("Created sync task {} ({})", task.id, task.name);
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list(State(app): State<App>) -> Result<Json<Vec<SyncTask>>, ApiError> {
    Ok(Json(app.store.list_tasks()?))
}

pub async fn get(State(app): State<App>, Path(id): Path<i64>) -> Result<Json<SyncTask>, ApiError> {
    Ok(Json(load(&app, id)?))
}

pub async fn delete(
    State(app): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<JsonValue>, ApiError> {
    app.scheduler.unregister(id);
    if !app.store.delete_task(id)? {
        return Err(ApiError::not_found("sync task", id));
    }
    Ok(Json(json!({ "deleted": true })))
}

pub async fn start(
    State(app): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<SyncTask>, ApiError> {
    app.scheduler.start(id)?;
    Ok(Json(load(&app, id)?))
}

pub async fn stop(State(app): State<App>, Path(id): Path<i64>) -> Result<Json<SyncTask>, ApiError> {
    app.scheduler.stop(id)?;
    Ok(Json(load(&app, id)?))
}

pub async fn execute(
    State(app): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<SyncStats>, ApiError> {
    Ok(Json(app.scheduler.execute(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

pub async fn logs(
    State(app): State<App>,
    Path(id): Path<i64>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<SyncLog>>, ApiError> {
    load(&app, id)?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Ok(Json(app.store.list_sync_logs(id, limit)?))
}

pub async fn object_logs(
    State(app): State<App>,
    Path(id): Path<i64>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<ObjectSyncLog>>, ApiError> {
    load(&app, id)?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Ok(Json(app.store.list_object_logs(id, limit)?))
}
