//! Server configuration.
//!
//! The configuration is a hierarchical YAML document with camelCase keys:
//!
//! ```yaml
//! server:
//!   http:
//!     enabled: true
//!     port: 8200
//!   https:
//!     enabled: false
//!     port: 8443
//!     caCert: /etc/vsm/ca.pem
//!     caKey: /etc/vsm/ca-key.pem
//!     serverCert: /etc/vsm/server.pem
//!     serverKey: /etc/vsm/server-key.pem
//!   rootInitPubKey: /etc/vsm/root.pub
//!   rootInitPriKey: /etc/vsm/root.pem
//! dataStore:
//!   type: memory
//!   connectionString: ""
//! virtualKeyStore:
//!   keyStoreCount: 3
//!   keyStoreThreshold: 2
//!   keyStores:
//!     - type: file
//!       connectionString: /var/lib/vsm/ks0
//!     - type: file
//!       connectionString: /var/lib/vsm/ks1
//!     - type: file
//!       connectionString: /var/lib/vsm/ks2
//! ```
//!
//! The order of `keyStores` assigns each backend its stable index; it must
//! not change once shares have been written.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub data_store: DataStoreConfig,
    pub virtual_key_store: VirtualKeyStoreConfig,
}

/// `server` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub https: HttpsConfig,
    /// Bootstrap admin identity, public half.
    pub root_init_pub_key: String,
    /// Bootstrap admin identity, private half.
    #[serde(rename = "rootInitPriKey")]
    pub root_init_private_key: String,
}

/// `server.http` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8200,
        }
    }
}

/// `server.https` section.
///
/// `ca_cert` and `ca_key` also name the CA material used to sign issued
/// X.509 certificate secrets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpsConfig {
    pub enabled: bool,
    pub port: u16,
    pub ca_cert: String,
    pub ca_key: String,
    pub server_cert: String,
    pub server_key: String,
}

/// `dataStore` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataStoreConfig {
    /// Store kind: `memory` or `postgres`.
    #[serde(rename = "type")]
    pub store_type: String,
    pub connection_string: String,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            store_type: "memory".to_owned(),
            connection_string: String::new(),
        }
    }
}

/// `virtualKeyStore` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualKeyStoreConfig {
    /// Number of key-store backends (`n`).
    pub key_store_count: usize,
    /// Shares required for reconstruction (`t`).
    pub key_store_threshold: usize,
    /// One backend per entry; list position is the backend index.
    pub key_stores: Vec<KeyStoreConfig>,
}

impl Default for VirtualKeyStoreConfig {
    fn default() -> Self {
        Self {
            key_store_count: 1,
            key_store_threshold: 1,
            key_stores: vec![KeyStoreConfig::default()],
        }
    }
}

/// One `virtualKeyStore.keyStores` element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyStoreConfig {
    /// Backend kind: `memory`, `file`, or `postgres`.
    #[serde(rename = "type")]
    pub store_type: String,
    pub connection_string: String,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            store_type: "memory".to_owned(),
            connection_string: String::new(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Io`] if the file cannot be read.
    /// - [`ConfigError::Parse`] if the document is not valid YAML.
    /// - [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the structural invariants of the document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a constraint is violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let vks = &self.virtual_key_store;
        if vks.key_store_count == 0 {
            return Err(ConfigError::Invalid {
                reason: "virtualKeyStore.keyStoreCount must be at least 1".to_owned(),
            });
        }
        if vks.key_store_threshold < 1 || vks.key_store_threshold > vks.key_store_count {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "virtualKeyStore.keyStoreThreshold must be between 1 and {}, got {}",
                    vks.key_store_count, vks.key_store_threshold
                ),
            });
        }
        if vks.key_stores.len() != vks.key_store_count {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "virtualKeyStore.keyStores has {} entries, expected keyStoreCount = {}",
                    vks.key_stores.len(),
                    vks.key_store_count
                ),
            });
        }
        if !self.server.http.enabled && !self.server.https.enabled {
            return Err(ConfigError::Invalid {
                reason: "at least one of server.http and server.https must be enabled".to_owned(),
            });
        }
        Ok(())
    }
}
