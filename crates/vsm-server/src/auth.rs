//! Authentication and the bundled authorization manager.
//!
//! The HTTP layer resolves the `X-Vsm-Token` header through a
//! [`UserManager`] and injects the caller's identity into the request
//! extensions; handlers build their [`RequestContext`] from it.
//!
//! [`OwnerAuthorizer`] is the minimal [`AuthorizationManager`]
//! implementation shipped with the server: the root identity may do
//! anything, and any other caller may act on a path only when they own the
//! nearest existing entry on it. Policy evaluation proper is an external
//! capability and can be injected in its place.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::RwLock;

use vsm_core::context::{AuthorizationManager, Identity, RequestContext, UserManager};
use vsm_core::datastore::{parent_of, DataStoreAdapter};
use vsm_core::error::AuthzDenied;
use vsm_core::model::Operation;

use crate::state::AppState;

/// Header carrying the caller's bearer token.
pub const TOKEN_HEADER: &str = "X-Vsm-Token";

/// Authentication context injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
}

/// Middleware that resolves the `X-Vsm-Token` header to an identity.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let Some(token) = token else {
        return unauthenticated(format!("missing {TOKEN_HEADER} header"));
    };

    match state.user_manager.resolve(&token).await {
        Some(identity) => {
            req.extensions_mut().insert(AuthContext { identity });
            next.run(req).await
        }
        None => unauthenticated("invalid token".to_owned()),
    }
}

fn unauthenticated(message: String) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({
            "error": "unauthenticated",
            "message": message,
        })),
    )
        .into_response()
}

/// In-memory token to identity mapping.
///
/// The root token is issued at startup; additional tokens can be issued for
/// other identities at runtime.
#[derive(Debug, Default)]
pub struct TokenUserManager {
    tokens: RwLock<HashMap<String, Identity>>,
}

impl TokenUserManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `identity` and return it.
    pub async fn issue(&self, identity: Identity) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.tokens.write().await.insert(token.clone(), identity);
        token
    }
}

#[async_trait::async_trait]
impl UserManager for TokenUserManager {
    async fn resolve(&self, token: &str) -> Option<Identity> {
        self.tokens.read().await.get(token).cloned()
    }
}

/// Owner-or-root authorization over the data store.
pub struct OwnerAuthorizer {
    data_store: Arc<dyn DataStoreAdapter>,
    root_entry_id: String,
}

impl OwnerAuthorizer {
    #[must_use]
    pub fn new(data_store: Arc<dyn DataStoreAdapter>, root_entry_id: impl Into<String>) -> Self {
        Self {
            data_store,
            root_entry_id: root_entry_id.into(),
        }
    }
}

#[async_trait::async_trait]
impl AuthorizationManager for OwnerAuthorizer {
    async fn check(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        path: &str,
    ) -> Result<(), AuthzDenied> {
        let caller = &ctx.identity().entry_id;
        if *caller == self.root_entry_id {
            return Ok(());
        }

        let denied = || AuthzDenied {
            operation,
            path: path.to_owned(),
        };

        // The owner of the nearest existing entry on the path decides.
        let mut current = path.to_owned();
        loop {
            match self.data_store.read_entry(&current).await {
                Ok(entry) => {
                    if entry.owner_entry_id == *caller {
                        return Ok(());
                    }
                    return Err(denied());
                }
                Err(_) => {
                    let parent = parent_of(&current);
                    if parent.is_empty() {
                        return Err(denied());
                    }
                    current = parent.to_owned();
                }
            }
        }
    }
}

impl std::fmt::Debug for OwnerAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerAuthorizer")
            .field("root_entry_id", &self.root_entry_id)
            .finish_non_exhaustive()
    }
}
