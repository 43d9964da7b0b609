//! Skill Management API
//!
//! REST endpoints for operating on skill bundles. Authentication and role
//! checks live in front of this router and are not its concern.
//!
//! # Endpoints
//!
//! - `GET /` - List all skills (most recently updated first)
//! - `GET /options` - Cached selection options for session configuration
//! - `POST /import` - Import a skill from an uploaded zip
//! - `GET /{slug}/tree` - Directory tree of a skill
//! - `GET /{slug}/file?path=` - Read a text file
//! - `PUT /{slug}/file` - Update a text file
//! - `POST /{slug}/node` - Create a file or directory
//! - `DELETE /{slug}/node?path=` - Delete a file or directory
//! - `GET /{slug}/export` - Download the skill as a zip
//! - `DELETE /{slug}` - Delete the skill

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::MetadataCache;
use crate::error::SkillError;
use crate::repository::SkillRepository;
use crate::store::SkillStore;

/// Skill API state
pub struct SkillApiState {
    pub store: Arc<SkillStore>,
    pub repo: Arc<dyn SkillRepository>,
    pub cache: Arc<MetadataCache>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(e: &SkillError) -> Response {
    let (status, code) = match e {
        SkillError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        SkillError::PathViolation(_) => (StatusCode::BAD_REQUEST, "path_violation"),
        SkillError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        SkillError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        SkillError::Io(_) | SkillError::Archive(_) | SkillError::Persistence(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };
    (
        status,
        Json(ApiErrorResponse {
            error: code.to_string(),
            message: e.to_string(),
        }),
    )
        .into_response()
}

fn operator(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-operator")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Query parameter for node addressing
#[derive(Debug, Deserialize)]
pub struct NodeQuery {
    pub path: String,
}

/// Update file request
#[derive(Debug, Deserialize)]
pub struct UpdateFileRequest {
    pub path: String,
    pub content: String,
}

/// Create node request
#[derive(Debug, Deserialize)]
pub struct CreateNodeRequest {
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    pub content: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List all skills
/// GET /
pub async fn list_skills(State(state): State<Arc<SkillApiState>>) -> Response {
    match state.repo.list_all().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Cached selection options
/// GET /options
pub async fn skill_options(State(state): State<Arc<SkillApiState>>) -> Response {
    Json(state.cache.options()).into_response()
}

/// Import a skill from zip bytes
/// POST /import
pub async fn import_skill(
    State(state): State<Arc<SkillApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.store.import(&body, operator(&headers).as_deref()).await {
        Ok(record) => {
            info!("Imported skill '{}' via API", record.slug);
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(e) => {
            warn!("Skill import failed: {}", e);
            error_response(&e)
        }
    }
}

/// Directory tree of a skill
/// GET /{slug}/tree
pub async fn skill_tree(
    State(state): State<Arc<SkillApiState>>,
    Path(slug): Path<String>,
) -> Response {
    match state.store.tree(&slug).await {
        Ok(tree) => Json(tree).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Read a text file
/// GET /{slug}/file?path=
pub async fn read_file(
    State(state): State<Arc<SkillApiState>>,
    Path(slug): Path<String>,
    Query(query): Query<NodeQuery>,
) -> Response {
    match state.store.read_file(&slug, &query.path).await {
        Ok(node) => Json(node).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Update a text file
/// PUT /{slug}/file
pub async fn update_file(
    State(state): State<Arc<SkillApiState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateFileRequest>,
) -> Response {
    match state
        .store
        .update_file(&slug, &req.path, &req.content, operator(&headers).as_deref())
        .await
    {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Create a file or directory
/// POST /{slug}/node
pub async fn create_node(
    State(state): State<Arc<SkillApiState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateNodeRequest>,
) -> Response {
    match state
        .store
        .create_node(
            &slug,
            &req.path,
            req.is_dir,
            req.content.as_deref(),
            operator(&headers).as_deref(),
        )
        .await
    {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({ "success": true })))
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Delete a file or directory
/// DELETE /{slug}/node?path=
pub async fn delete_node(
    State(state): State<Arc<SkillApiState>>,
    Path(slug): Path<String>,
    Query(query): Query<NodeQuery>,
) -> Response {
    match state.store.delete_node(&slug, &query.path).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Download the skill as a zip
/// GET /{slug}/export
pub async fn export_skill(
    State(state): State<Arc<SkillApiState>>,
    Path(slug): Path<String>,
) -> Response {
    let (path, filename) = match state.store.export(&slug).await {
        Ok(out) => out,
        Err(e) => return error_response(&e),
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            return error_response(&SkillError::Io(e));
        }
    };
    // The export is a private temp file; remove it once the bytes are owned
    let _ = tokio::fs::remove_file(&path).await;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(bytes.into())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Delete the skill
/// DELETE /{slug}
pub async fn delete_skill(
    State(state): State<Arc<SkillApiState>>,
    Path(slug): Path<String>,
) -> Response {
    match state.store.delete(&slug).await {
        Ok(()) => {
            info!("Deleted skill '{}' via API", slug);
            Json(serde_json::json!({ "success": true, "message": format!("Skill '{}' deleted", slug) }))
                .into_response()
        }
        Err(e) => {
            warn!("Failed to delete skill '{}': {}", slug, e);
            error_response(&e)
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the skills API router
pub fn skills_router(state: Arc<SkillApiState>) -> Router {
    Router::new()
        .route("/", get(list_skills))
        .route("/options", get(skill_options))
        .route("/import", post(import_skill))
        .route("/{slug}/tree", get(skill_tree))
        .route("/{slug}/file", get(read_file).put(update_file))
        .route("/{slug}/node", post(create_node).delete(delete_node))
        .route("/{slug}/export", get(export_skill))
        .route("/{slug}", axum::routing::delete(delete_skill))
        .with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
