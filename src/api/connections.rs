// ABOUTME: Connection endpoints - CRUD, connectivity test, and live catalog browsing
// ABOUTME: Passwords never leave the server; edits evict the cached pooled client

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

use super::ApiError;
use crate::app::App;
use crate::catalog::Catalog;
use crate::models::{ConnectionDescriptor, DatabaseObject, NewConnection, ObjectKind};

fn load(app: &App, id: i64) -> Result<ConnectionDescriptor, ApiError> {
    app.store
        .get_connection(id)?
        .ok_or_else(|| ApiError::not_found("connection", id))
}

pub async fn create(
    State(app): State<App>,
    Json(request): Json<NewConnection>,
) -> Result<(StatusCode, Json<ConnectionDescriptor>), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let created = app.store.create_connection(&request)?;
    tracing::info!("Created connection {} ({})", created.id, created.display_url());
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list(State(app): State<App>) -> Result<Json<Vec<ConnectionDescriptor>>, ApiError> {
    Ok(Json(app.store.list_connections()?))
}

pub async fn get(
    State(app): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<ConnectionDescriptor>, ApiError> {
    Ok(Json(load(&app, id)?))
}

pub async fn update(
    State(app): State<App>,
    Path(id): Path<i64>,
    Json(request): Json<NewConnection>,
) -> Result<Json<ConnectionDescriptor>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let updated = app
        .store
        .update_connection(id, &request)?
        .ok_or_else(|| ApiError::not_found("connection", id))?;
    app.provider.close(id).await;
    Ok(Json(updated))
}

pub async fn delete(
    State(app): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<JsonValue>, ApiError> {
    if !app.store.delete_connection(id)? {
        return Err(ApiError::not_found("connection", id));
    }
    app.provider.close(id).await;
    Ok(Json(json!({ "deleted": true })))
}

pub async fn test(
    State(app): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<JsonValue>, ApiError> {
    let descriptor = load(&app, id)?;
    app.provider.test(&descriptor).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Connected to {}", descriptor.display_url()),
    })))
}

pub async fn tables(
    State(app): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<String>>, ApiError> {
    let descriptor = load(&app, id)?;
    let client = app.provider.acquire(&descriptor).await?;
    let tables = Catalog::new(client.as_ref()).list_tables().await?;
    Ok(Json(tables))
}

#[derive(Debug, Deserialize)]
pub struct ObjectsQuery {
    pub kind: Option<ObjectKind>,
}

pub async fn objects(
    State(app): State<App>,
    Path(id): Path<i64>,
    Query(query): Query<ObjectsQuery>,
) -> Result<Json<Vec<DatabaseObject>>, ApiError> {
    let descriptor = load(&app, id)?;
    let client = app.provider.acquire(&descriptor).await?;
    let catalog = Catalog::new(client.as_ref());

    let kinds = match query.kind {
        Some(kind) => vec![kind],
        None => ObjectKind::SYNC_ORDER.to_vec(),
    };
    let mut objects = Vec::new();
    for kind in kinds {
        objects.extend(catalog.objects_of_kind(kind).await?);
    }
    Ok(Json(objects))
}

#[derive(Debug, Deserialize)]
pub struct DefinitionQuery {
    pub name: Option<String>,
    /// Owning table; MySQL needs it to find a trigger.
    pub table_name: Option<String>,
}

pub async fn definition(
    State(app): State<App>,
    Path((id, kind)): Path<(i64, ObjectKind)>,
    Query(query): Query<DefinitionQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    let name = query
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("query parameter 'name' is required"))?;

    let descriptor = load(&app, id)?;
    let client = app.provider.acquire(&descriptor).await?;
    let object = DatabaseObject {
        kind,
        name,
        owning_table: query.table_name.filter(|table| !table.trim().is_empty()),
        schema: String::new(),
    };
    let definition = Catalog::new(client.as_ref()).object_definition(&object).await?;
    Ok(Json(json!({
        "object_type": kind,
        "object_name": object.name,
        "definition": definition,
    })))
}

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct BrowseRequest {
    pub connection_id: i64,
    pub table_name: String,
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: usize,
}

/// One page of a table's rows, in the table's natural order.
pub async fn browse(
    State(app): State<App>,
    Json(request): Json<BrowseRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let table = request.table_name.trim();
    if table.is_empty() {
        return Err(ApiError::bad_request("table_name is required"));
    }
    let page = request.page.max(1);
    let page_size = match request.page_size {
        0 => DEFAULT_PAGE_SIZE,
        size => size.min(MAX_PAGE_SIZE),
    };

    let descriptor = load(&app, request.connection_id)?;
    let client = app.provider.acquire(&descriptor).await?;
    let catalog = Catalog::new(client.as_ref());

    let total = catalog.count_rows(table).await?.max(0) as usize;
    let rows = catalog
        .fetch_page(table, &[], page_size, (page - 1) * page_size)
        .await?;
    let data: Vec<JsonValue> = rows
        .into_iter()
        .map(|row| {
            let row = row.normalized();
            let object: Map<String, JsonValue> = row
                .columns()
                .iter()
                .cloned()
                .zip(row.values().iter().map(|value| value.to_json()))
                .collect();
            JsonValue::Object(object)
        })
        .collect();

    Ok(Json(json!({
        "data": data,
        "pagination": {
            "total": total,
            "page": page,
            "page_size": page_size,
            "total_page": total.div_ceil(page_size),
        },
    })))
}
