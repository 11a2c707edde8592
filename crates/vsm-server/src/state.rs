//! Shared application state.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use vsm_core::config::Config;
use vsm_core::context::{AuthorizationManager, UserManager};
use vsm_core::datastore::DataStoreAdapter;
use vsm_core::namespace::NamespaceManager;
use vsm_core::secret::SecretTypeRegistry;
use vsm_core::vks::VirtualKeyStore;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Secret-type name to handler registry; immutable after init.
    pub registry: Arc<SecretTypeRegistry>,
    /// Hierarchical namespace registry.
    pub namespace_manager: Arc<NamespaceManager>,
    /// Metadata and ciphertext persistence.
    pub data_store: Arc<dyn DataStoreAdapter>,
    /// Threshold DEK custody.
    pub key_store: Arc<VirtualKeyStore>,
    /// Allow/deny decisions for sensitive operations.
    pub authz: Arc<dyn AuthorizationManager>,
    /// Token to identity resolution.
    pub user_manager: Arc<dyn UserManager>,
    /// Loaded server configuration.
    pub config: Arc<Config>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
