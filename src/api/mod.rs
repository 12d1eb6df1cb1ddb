// ABOUTME: HTTP JSON API under /api/v1
// ABOUTME: Thin axum handlers over the store, scheduler, and conflict manager

pub mod conflicts;
pub mod connections;
mod error;
pub mod tasks;

pub use error::ApiError;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app::App;

async fn health() -> Json<JsonValue> {
    Json(json!({
        "status": "healthy",
        "service": "database-syncer",
    }))
}

pub fn router(app: App) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/connections", post(connections::create).get(connections::list))
        .route(
            "/connections/:id",
            get(connections::get)
                .put(connections::update)
                .delete(connections::delete),
        )
        .route("/connections/:id/test", post(connections::test))
        .route("/connections/:id/tables", get(connections::tables))
        .route("/connections/:id/objects", get(connections::objects))
        .route(
            "/connections/:id/objects/:kind/definition",
            get(connections::definition),
        )
        .route("/query", post(connections::browse))
        .route("/sync-tasks", post(tasks::create).get(tasks::list))
        .route("/sync-tasks/:id", get(tasks::get).delete(tasks::delete))
        .route("/sync-tasks/:id/start", post(tasks::start))
        .route("/sync-tasks/:id/stop", post(tasks::stop))
        .route("/sync-tasks/:id/execute", post(tasks::execute))
        .route("/sync-tasks/:id/logs", get(tasks::logs))
        .route("/sync-tasks/:id/object-logs", get(tasks::object_logs))
        .route("/conflicts", get(conflicts::list))
        .route("/conflicts/view", get(conflicts::view))
        .route("/conflicts/:id", get(conflicts::get))
        .route("/conflicts/:id/resolve", post(conflicts::resolve));

    Router::new()
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}
