// ABOUTME: Conflict endpoints - listing, resolution, and signed view links

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::ApiError;
use crate::app::App;
use crate::models::{ConflictStatus, DataConflict, Resolution};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<ConflictStatus>,
}

pub async fn list(
    State(app): State<App>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DataConflict>>, ApiError> {
    Ok(Json(app.conflicts.list(query.status)?))
}

pub async fn get(
    State(app): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<DataConflict>, ApiError> {
    Ok(Json(app.conflicts.get(id)?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: Resolution,
    pub resolved_by: i64,
}

pub async fn resolve(
    State(app): State<App>,
    Path(id): Path<i64>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<DataConflict>, ApiError> {
    let resolved = app
        .conflicts
        .resolve(id, request.resolution, request.resolved_by)
        .await?;
    Ok(Json(resolved))
}

#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    pub token: String,
}

pub async fn view(
    State(app): State<App>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<DataConflict>, ApiError> {
    Ok(Json(app.conflicts.view_by_token(&query.token)?))
}
