//! Domain model shared across the secret pipeline and namespace manager.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One logical secret.
///
/// `secret_data` holds ciphertext at rest; the only time it carries
/// plaintext is transiently inside a handler, or in the entry returned by a
/// `get_secret` call, whose caller then owns the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    /// Opaque unique id, server-assigned; also the leaf of the secret's path.
    pub id: String,
    /// Registered secret-type name.
    #[serde(rename = "type")]
    pub secret_type: String,
    /// Entry id of the creator.
    pub owner_entry_id: String,
    /// Type-specific metadata document (JSON text, opaque to the core).
    pub meta_data: String,
    /// Secret payload. Ciphertext at rest, plaintext only transiently.
    pub secret_data: Vec<u8>,
    /// References to authorization policies, opaque to the core.
    pub authorization_policy_ids: Vec<String>,
}

/// One node in the namespace path tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    /// Absolute, `/`-rooted path. `/` is the root.
    pub path: String,
    /// Entry id of the owner.
    pub owner_entry_id: String,
    /// References to authorization policies, opaque to the core.
    pub authorization_policy_ids: Vec<String>,
    /// Immediate children, derived at read time and never stored.
    #[serde(default)]
    pub child_paths: Vec<String>,
}

/// An operation subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Read,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_display_labels() {
        assert_eq!(Operation::Create.to_string(), "create");
        assert_eq!(Operation::Read.to_string(), "read");
        assert_eq!(Operation::Delete.to_string(), "delete");
    }

    #[test]
    fn secret_entry_serde_uses_type_field() {
        let entry = SecretEntry {
            id: "s1".to_owned(),
            secret_type: "Data".to_owned(),
            owner_entry_id: "user0".to_owned(),
            meta_data: String::new(),
            secret_data: vec![1, 2, 3],
            authorization_policy_ids: vec![],
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains("\"type\":\"Data\""));
    }
}
