//! VSM server entry point.
//!
//! Bootstraps the data store, the key-store backends, the virtual key
//! store, and the secret-type registry from the YAML configuration, then
//! starts the Axum HTTP server with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use vsm_core::config::{Config, DEFAULT_CONFIG_FILE};
use vsm_core::context::Identity;
use vsm_core::datastore::{DataStoreAdapter, MemoryDataStore};
use vsm_core::error::ConfigError;
use vsm_core::model::NamespaceEntry;
use vsm_core::namespace::NamespaceManager;
use vsm_core::secret::{register_builtin_types, SecretTypeInit, SecretTypeRegistry};
use vsm_core::vks::VirtualKeyStore;
use vsm_keystore::{FileKeyStore, KeyStoreBackend, MemoryKeyStore};

use vsm_server::auth::{auth_middleware, OwnerAuthorizer, TokenUserManager};
use vsm_server::routes;
use vsm_server::state::AppState;

/// Entry id of the bootstrap admin identity.
const ROOT_ENTRY_ID: &str = "root";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging before anything can fail.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = load_config()?;

    if config.server.https.enabled {
        warn!(
            port = config.server.https.port,
            "TLS termination is not handled in-process; put a TLS proxy in front of the HTTP listener"
        );
    }

    let state = build_app_state(&config).await?;

    let app = build_router(Arc::clone(&state));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.http.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(addr = %addr, "VSM server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("VSM server stopped");
    Ok(())
}

/// Resolve the configuration: explicit path argument, `VSM_CONFIG`, or the
/// default file. A missing default file falls back to the built-in
/// development configuration (memory stores).
fn load_config() -> anyhow::Result<Config> {
    let explicit = std::env::args().nth(1).or_else(|| std::env::var("VSM_CONFIG").ok());

    match explicit {
        Some(path) => {
            let config = Config::from_file(&path)
                .with_context(|| format!("failed to load config '{path}'"))?;
            info!(path = %path, "configuration loaded");
            Ok(config)
        }
        None => match Config::from_file(DEFAULT_CONFIG_FILE) {
            Ok(config) => {
                info!(path = DEFAULT_CONFIG_FILE, "configuration loaded");
                Ok(config)
            }
            Err(ConfigError::Io { .. }) => {
                warn!("no config file found, using in-memory development defaults");
                Ok(Config::default())
            }
            Err(e) => Err(e).context("failed to load default config"),
        },
    }
}

/// Build the shared application state from the configuration.
async fn build_app_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let config = Arc::new(config.clone());

    // Data store.
    let data_store: Arc<dyn DataStoreAdapter> = match config.data_store.store_type.as_str() {
        "memory" => {
            info!("using in-memory data store (data will not persist)");
            Arc::new(MemoryDataStore::new())
        }
        #[cfg(feature = "postgres-datastore")]
        "postgres" => {
            info!("using PostgreSQL data store");
            Arc::new(
                vsm_core::datastore::PostgresDataStore::connect(
                    &config.data_store.connection_string,
                )
                .await
                .context("failed to connect to PostgreSQL data store")?,
            )
        }
        #[cfg(not(feature = "postgres-datastore"))]
        "postgres" => {
            anyhow::bail!(
                "postgres data store requested but feature 'postgres-datastore' is not enabled"
            );
        }
        other => anyhow::bail!("unknown data store type '{other}'"),
    };

    // Key-store backends, one per configured entry, index = list position.
    let mut backends: Vec<Arc<dyn KeyStoreBackend>> = Vec::new();
    for (index, ks) in config.virtual_key_store.key_stores.iter().enumerate() {
        let backend: Arc<dyn KeyStoreBackend> = match ks.store_type.as_str() {
            "memory" => Arc::new(MemoryKeyStore::new()),
            "file" => {
                if ks.connection_string.is_empty() {
                    anyhow::bail!("key store {index}: file backend requires a connectionString");
                }
                Arc::new(
                    FileKeyStore::open(ks.connection_string.clone())
                        .await
                        .with_context(|| format!("failed to open key store {index}"))?,
                )
            }
            #[cfg(feature = "postgres-keystore")]
            "postgres" => Arc::new(
                vsm_keystore::PostgresKeyStore::connect(&ks.connection_string)
                    .await
                    .with_context(|| format!("failed to connect key store {index}"))?,
            ),
            #[cfg(not(feature = "postgres-keystore"))]
            "postgres" => {
                anyhow::bail!(
                    "key store {index}: postgres backend requested but feature 'postgres-keystore' is not enabled"
                );
            }
            other => anyhow::bail!("key store {index}: unknown type '{other}'"),
        };
        backends.push(backend);
    }

    let key_store = Arc::new(
        VirtualKeyStore::new(backends, config.virtual_key_store.key_store_threshold)
            .context("invalid virtual key store configuration")?,
    );
    info!(
        share_count = key_store.share_count(),
        threshold = key_store.threshold(),
        "virtual key store ready"
    );

    // Collaborators.
    let authz: Arc<dyn vsm_core::context::AuthorizationManager> =
        Arc::new(OwnerAuthorizer::new(Arc::clone(&data_store), ROOT_ENTRY_ID));
    let user_manager = Arc::new(TokenUserManager::new());
    let root_token = user_manager.issue(Identity::new(ROOT_ENTRY_ID)).await;
    // Dev-grade bootstrap: the operator reads the root token from the log,
    // the way an init response would hand it over.
    warn!(token = %root_token, "root token issued; store it securely");

    // Secret types.
    let init = SecretTypeInit {
        data_store: Arc::clone(&data_store),
        key_store: Arc::clone(&key_store),
        authz: Arc::clone(&authz),
        config: Arc::clone(&config),
    };
    let mut registry = SecretTypeRegistry::new();
    register_builtin_types(&mut registry, &init).context("secret type registration failed")?;
    info!(types = ?registry.type_names(), "secret types registered");

    // Namespace manager + root bootstrap.
    let namespace_manager = Arc::new(NamespaceManager::new(Arc::clone(&data_store)));
    bootstrap_root_namespace(&namespace_manager).await?;

    Ok(Arc::new(AppState {
        registry: Arc::new(registry),
        namespace_manager,
        data_store,
        key_store,
        authz,
        user_manager: user_manager as Arc<dyn vsm_core::context::UserManager>,
        config,
    }))
}

/// Create the root namespace `/` owned by the root identity when absent.
async fn bootstrap_root_namespace(manager: &NamespaceManager) -> anyhow::Result<()> {
    use vsm_core::error::NamespaceError;

    let root = NamespaceEntry {
        path: "/".to_owned(),
        owner_entry_id: ROOT_ENTRY_ID.to_owned(),
        authorization_policy_ids: Vec::new(),
        child_paths: Vec::new(),
    };
    match manager.create_namespace(&root).await {
        Ok(_) => {
            info!("root namespace created");
            Ok(())
        }
        Err(NamespaceError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(e).context("root namespace bootstrap failed"),
    }
}

/// Build the Axum router with all routes and middleware.
fn build_router(state: Arc<AppState>) -> Router {
    let authenticated_routes = Router::new()
        .nest("/v1/secrets", routes::secrets::router())
        .nest("/v1/namespaces", routes::namespaces::router())
        // Secret creation can be CPU-heavy (RSA keygen); bound it.
        .layer(tower::limit::ConcurrencyLimitLayer::new(16))
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    Router::new()
        .nest("/v1/sys", routes::sys::router())
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
