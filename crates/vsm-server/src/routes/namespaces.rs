//! Namespace routes: `/v1/namespaces/*`
//!
//! The wildcard segment carries the namespace path without its leading
//! slash; `GET /v1/namespaces/team/app` addresses `/team/app` and
//! `GET /v1/namespaces/` addresses the root.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use vsm_core::context::RequestContext;
use vsm_core::datastore::namespace_to_store_path;
use vsm_core::model::{NamespaceEntry, Operation};

use crate::auth::AuthContext;
use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/namespaces` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_namespace).get(get_root_namespace))
        .route("/{*path}", get(get_namespace).delete(delete_namespace))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNamespaceRequest {
    /// Absolute namespace path, e.g. `/team/app`.
    pub path: String,
    #[serde(default)]
    pub authorization_policy_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceResponse {
    pub path: String,
    pub owner_entry_id: String,
    pub authorization_policy_ids: Vec<String>,
    pub child_paths: Vec<String>,
}

impl From<NamespaceEntry> for NamespaceResponse {
    fn from(entry: NamespaceEntry) -> Self {
        Self {
            path: entry.path,
            owner_entry_id: entry.owner_entry_id,
            authorization_policy_ids: entry.authorization_policy_ids,
            child_paths: entry.child_paths,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Create a namespace owned by the caller.
async fn create_namespace(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateNamespaceRequest>,
) -> Result<(StatusCode, Json<NamespaceResponse>), AppError> {
    let ctx = RequestContext::new(auth.identity.clone());
    state
        .authz
        .check(
            &ctx,
            Operation::Create,
            &namespace_to_store_path(&body.path),
        )
        .await?;

    let entry = NamespaceEntry {
        path: body.path,
        owner_entry_id: auth.identity.entry_id,
        authorization_policy_ids: body.authorization_policy_ids,
        child_paths: Vec::new(),
    };

    let id = state.namespace_manager.create_namespace(&entry).await?;
    let created = state.namespace_manager.get_namespace(&id).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Fetch the root namespace.
async fn get_root_namespace(
    state: State<Arc<AppState>>,
    auth: Extension<AuthContext>,
) -> Result<Json<NamespaceResponse>, AppError> {
    fetch(state, auth, "/".to_owned()).await
}

/// Fetch a namespace with its immediate children.
async fn get_namespace(
    state: State<Arc<AppState>>,
    auth: Extension<AuthContext>,
    Path(path): Path<String>,
) -> Result<Json<NamespaceResponse>, AppError> {
    fetch(state, auth, format!("/{path}")).await
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    path: String,
) -> Result<Json<NamespaceResponse>, AppError> {
    let ctx = RequestContext::new(auth.identity.clone());
    state
        .authz
        .check(&ctx, Operation::Read, &namespace_to_store_path(&path))
        .await?;

    let entry = state.namespace_manager.get_namespace(&path).await?;
    Ok(Json(entry.into()))
}

/// Delete an empty namespace.
async fn delete_namespace(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(path): Path<String>,
) -> Result<StatusCode, AppError> {
    let path = format!("/{path}");
    let ctx = RequestContext::new(auth.identity.clone());
    state
        .authz
        .check(&ctx, Operation::Delete, &namespace_to_store_path(&path))
        .await?;

    state.namespace_manager.delete_namespace(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}
