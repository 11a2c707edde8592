//! Secret routes: `/v1/secrets/*`
//!
//! Creation dispatches to the registered secret type named in the request;
//! reads and deletes resolve the stored entry first and dispatch to its
//! type. Binary payloads cross the wire base64-encoded.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use vsm_core::context::RequestContext;
use vsm_core::datastore::{secret_id_to_path, SECRETS_PREFIX};
use vsm_core::model::{Operation, SecretEntry};

use crate::auth::AuthContext;
use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/secrets` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_secret))
        .route("/{id}", get(get_secret).delete(delete_secret))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecretRequest {
    /// Optional client-chosen id; server-assigned when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Registered secret-type name.
    #[serde(rename = "type")]
    pub secret_type: String,
    /// Type-specific metadata document (JSON text).
    #[serde(default)]
    pub meta_data: String,
    /// Payload bytes, base64-encoded. Ignored by generating types.
    #[serde(default)]
    pub secret_data: String,
    #[serde(default)]
    pub authorization_policy_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecretResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub secret_type: String,
    pub owner_entry_id: String,
    pub meta_data: String,
    /// Plaintext payload, base64-encoded.
    pub secret_data: String,
    pub authorization_policy_ids: Vec<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Create a secret through its type handler.
async fn create_secret(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateSecretRequest>,
) -> Result<(StatusCode, Json<CreateSecretResponse>), AppError> {
    let id = match body.id {
        Some(id) => {
            validate_secret_id(&id)?;
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let secret_data = BASE64
        .decode(body.secret_data.as_bytes())
        .map_err(|_| AppError::BadRequest("secretData must be base64".to_owned()))?;

    let ctx = RequestContext::new(auth.identity.clone());
    state
        .authz
        .check(&ctx, Operation::Create, SECRETS_PREFIX)
        .await?;

    let handler = state.registry.lookup(&body.secret_type)?;
    let entry = SecretEntry {
        id,
        secret_type: body.secret_type,
        owner_entry_id: auth.identity.entry_id,
        meta_data: body.meta_data,
        secret_data,
        authorization_policy_ids: body.authorization_policy_ids,
    };

    let id = handler.create_secret(&ctx, &entry).await?;
    Ok((StatusCode::CREATED, Json(CreateSecretResponse { id })))
}

/// Read a secret, returning its decrypted payload.
async fn get_secret(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<SecretResponse>, AppError> {
    validate_secret_id(&id)?;
    let path = secret_id_to_path(&id);

    let ctx = RequestContext::new(auth.identity.clone());
    state.authz.check(&ctx, Operation::Read, &path).await?;

    let stored = state
        .data_store
        .read_entry(&path)
        .await
        .map_err(vsm_core::error::SecretError::Store)?;
    let entry = stored.to_secret_entry();

    let handler = state.registry.lookup(&entry.secret_type)?;
    let fetched = handler.get_secret(&ctx, &entry).await?;

    Ok(Json(SecretResponse {
        id: fetched.id,
        secret_type: fetched.secret_type,
        owner_entry_id: fetched.owner_entry_id,
        meta_data: fetched.meta_data,
        secret_data: BASE64.encode(&fetched.secret_data),
        authorization_policy_ids: fetched.authorization_policy_ids,
    }))
}

/// Delete a secret: metadata and key shares.
async fn delete_secret(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    validate_secret_id(&id)?;
    let path = secret_id_to_path(&id);

    let ctx = RequestContext::new(auth.identity.clone());
    state.authz.check(&ctx, Operation::Delete, &path).await?;

    let stored = state
        .data_store
        .read_entry(&path)
        .await
        .map_err(vsm_core::error::SecretError::Store)?;
    let entry = stored.to_secret_entry();

    let handler = state.registry.lookup(&entry.secret_type)?;
    handler.delete_secret(&ctx, &entry).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Secret ids become path leaves; keep them to one safe segment.
fn validate_secret_id(id: &str) -> Result<(), AppError> {
    if id.is_empty() {
        return Err(AppError::BadRequest("secret id must not be empty".to_owned()));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(AppError::BadRequest(
            "secret id may only contain alphanumeric characters, '_', and '-'".to_owned(),
        ));
    }
    Ok(())
}
