//! Secret types and the process-wide registry.
//!
//! A secret type is a handler implementing the capability set
//! {type name, create, get, delete} for one category of secret. All types
//! share the same encrypt-then-persist / fetch-then-decrypt envelope (see
//! [`envelope`]); specialized types differ only in how they produce the
//! plaintext (generated password, generated RSA key, signed certificate).
//!
//! The registry maps type names to handlers. It is populated once during
//! server initialization and immutable afterwards; handlers receive their
//! collaborators ([`SecretTypeInit`]) at construction rather than through
//! process globals.

pub mod data;
pub mod envelope;
pub mod password;
pub mod rsa_key;
pub mod x509;

pub use data::DataSecretType;
pub use password::PasswordSecretType;
pub use rsa_key::RsaKeySecretType;
pub use x509::X509CertificateSecretType;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::context::{AuthorizationManager, RequestContext};
use crate::datastore::DataStoreAdapter;
use crate::error::SecretError;
use crate::model::SecretEntry;
use crate::vks::VirtualKeyStore;

/// Collaborators injected into every secret type at construction.
#[derive(Clone)]
pub struct SecretTypeInit {
    pub data_store: Arc<dyn DataStoreAdapter>,
    pub key_store: Arc<VirtualKeyStore>,
    pub authz: Arc<dyn AuthorizationManager>,
    pub config: Arc<Config>,
}

impl std::fmt::Debug for SecretTypeInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretTypeInit").finish_non_exhaustive()
    }
}

/// One category of secret: its name and the create/get/delete contract.
#[async_trait::async_trait]
pub trait SecretType: Send + Sync {
    /// The registered type name.
    fn type_name(&self) -> &str;

    /// Produce the secret payload, seal it, and persist metadata and key
    /// shares. Returns the entry id.
    async fn create_secret(
        &self,
        ctx: &RequestContext,
        entry: &SecretEntry,
    ) -> Result<String, SecretError>;

    /// Unseal the entry's payload and return the entry with plaintext
    /// substituted. The caller owns the returned plaintext.
    async fn get_secret(
        &self,
        ctx: &RequestContext,
        entry: &SecretEntry,
    ) -> Result<SecretEntry, SecretError>;

    /// Remove the entry's metadata and key shares.
    async fn delete_secret(
        &self,
        ctx: &RequestContext,
        entry: &SecretEntry,
    ) -> Result<(), SecretError>;
}

/// Name-to-handler registry, populated at init and then immutable.
#[derive(Default)]
pub struct SecretTypeRegistry {
    handlers: HashMap<String, Arc<dyn SecretType>>,
}

impl SecretTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own type name.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::AlreadyRegistered`] if the name is taken.
    pub fn register(&mut self, handler: Arc<dyn SecretType>) -> Result<(), SecretError> {
        let name = handler.type_name().to_owned();
        if self.handlers.contains_key(&name) {
            return Err(SecretError::AlreadyRegistered { name });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Look up a handler by type name.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::UnknownType`] for unregistered names.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn SecretType>, SecretError> {
        self.handlers
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| SecretError::UnknownType {
                name: name.to_owned(),
            })
    }

    /// All registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for SecretTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretTypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

/// Register the bundled secret types.
///
/// # Errors
///
/// Returns [`SecretError::AlreadyRegistered`] if called on a registry that
/// already holds one of the bundled names.
pub fn register_builtin_types(
    registry: &mut SecretTypeRegistry,
    init: &SecretTypeInit,
) -> Result<(), SecretError> {
    registry.register(Arc::new(DataSecretType::new(init.clone())))?;
    registry.register(Arc::new(PasswordSecretType::new(init.clone())))?;
    registry.register(Arc::new(RsaKeySecretType::new(init.clone())))?;
    registry.register(Arc::new(X509CertificateSecretType::new(init.clone())))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct StubType {
        name: &'static str,
    }

    #[async_trait::async_trait]
    impl SecretType for StubType {
        fn type_name(&self) -> &str {
            self.name
        }

        async fn create_secret(
            &self,
            _ctx: &RequestContext,
            entry: &SecretEntry,
        ) -> Result<String, SecretError> {
            Ok(entry.id.clone())
        }

        async fn get_secret(
            &self,
            _ctx: &RequestContext,
            entry: &SecretEntry,
        ) -> Result<SecretEntry, SecretError> {
            Ok(entry.clone())
        }

        async fn delete_secret(
            &self,
            _ctx: &RequestContext,
            _entry: &SecretEntry,
        ) -> Result<(), SecretError> {
            Ok(())
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = SecretTypeRegistry::new();
        registry.register(Arc::new(StubType { name: "Stub" })).unwrap();
        let handler = registry.lookup("Stub").unwrap();
        assert_eq!(handler.type_name(), "Stub");
    }

    #[test]
    fn double_registration_fails() {
        let mut registry = SecretTypeRegistry::new();
        registry.register(Arc::new(StubType { name: "Stub" })).unwrap();
        let err = registry
            .register(Arc::new(StubType { name: "Stub" }))
            .unwrap_err();
        assert!(matches!(err, SecretError::AlreadyRegistered { .. }));
    }

    #[test]
    fn unknown_lookup_fails() {
        let registry = SecretTypeRegistry::new();
        let err = match registry.lookup("Nope") {
            Err(err) => err,
            Ok(_) => panic!("expected lookup to fail"),
        };
        assert!(matches!(err, SecretError::UnknownType { .. }));
    }

    #[test]
    fn type_names_are_sorted() {
        let mut registry = SecretTypeRegistry::new();
        registry.register(Arc::new(StubType { name: "Zed" })).unwrap();
        registry.register(Arc::new(StubType { name: "Alpha" })).unwrap();
        assert_eq!(registry.type_names(), vec!["Alpha", "Zed"]);
    }
}
