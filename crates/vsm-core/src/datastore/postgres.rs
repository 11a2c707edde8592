//! PostgreSQL data store.
//!
//! Persists all entries in a single `vsm_entries` table keyed by path.
//! `secret_data` is opaque ciphertext by the time it reaches this layer.
//!
//! Feature-gated behind `postgres-datastore`. Uses `sqlx` with the Tokio
//! runtime for fully async operations.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DataStoreError;

use super::{child_prefix, is_immediate_child, DataStoreAdapter, DataStoreEntry};

/// A data store backed by PostgreSQL, addressed by a connection string.
#[derive(Clone)]
pub struct PostgresDataStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDataStore")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

type EntryRow = (String, String, String, String, Vec<u8>, String);

impl PostgresDataStore {
    /// Connect to PostgreSQL and run the initial migration.
    ///
    /// # Errors
    ///
    /// Returns [`DataStoreError::Backend`] if the connection or migration
    /// fails.
    pub async fn connect(connection_string: &str) -> Result<Self, DataStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| DataStoreError::Backend {
                reason: format!("connection failed: {e}"),
            })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vsm_entries (\
                path            TEXT  PRIMARY KEY, \
                owner_entry_id  TEXT  NOT NULL, \
                entry_type      TEXT  NOT NULL, \
                meta_data       TEXT  NOT NULL, \
                secret_data     BYTEA NOT NULL, \
                policy_ids      TEXT  NOT NULL\
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| DataStoreError::Backend {
            reason: format!("migration failed: {e}"),
        })?;

        // Prefix index for the child scan.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vsm_entries_path_prefix \
             ON vsm_entries (path text_pattern_ops)",
        )
        .execute(&pool)
        .await
        .map_err(|e| DataStoreError::Backend {
            reason: format!("index creation failed: {e}"),
        })?;

        Ok(Self { pool })
    }

    fn row_to_entry(row: EntryRow) -> Result<DataStoreEntry, DataStoreError> {
        let (path, owner_entry_id, entry_type, meta_data, secret_data, policy_ids) = row;
        let authorization_policy_ids: Vec<String> =
            serde_json::from_str(&policy_ids).map_err(|e| DataStoreError::Backend {
                reason: format!("corrupt policy id list for '{path}': {e}"),
            })?;
        Ok(DataStoreEntry {
            path,
            owner_entry_id,
            entry_type,
            meta_data,
            secret_data,
            authorization_policy_ids,
        })
    }
}

#[async_trait::async_trait]
impl DataStoreAdapter for PostgresDataStore {
    async fn create_entry(&self, entry: &DataStoreEntry) -> Result<(), DataStoreError> {
        let policy_ids = serde_json::to_string(&entry.authorization_policy_ids).map_err(|e| {
            DataStoreError::Backend {
                reason: format!("policy id serialization failed: {e}"),
            }
        })?;

        let result = sqlx::query(
            "INSERT INTO vsm_entries \
             (path, owner_entry_id, entry_type, meta_data, secret_data, policy_ids) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (path) DO NOTHING",
        )
        .bind(&entry.path)
        .bind(&entry.owner_entry_id)
        .bind(&entry.entry_type)
        .bind(&entry.meta_data)
        .bind(&entry.secret_data)
        .bind(&policy_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| DataStoreError::Backend {
            reason: e.to_string(),
        })?;

        if result.rows_affected() == 0 {
            return Err(DataStoreError::AlreadyExists {
                path: entry.path.clone(),
            });
        }
        Ok(())
    }

    async fn read_entry(&self, path: &str) -> Result<DataStoreEntry, DataStoreError> {
        let row: Option<EntryRow> = sqlx::query_as(
            "SELECT path, owner_entry_id, entry_type, meta_data, secret_data, policy_ids \
             FROM vsm_entries WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DataStoreError::Backend {
            reason: e.to_string(),
        })?;

        match row {
            Some(row) => Self::row_to_entry(row),
            None => Err(DataStoreError::NotFound {
                path: path.to_owned(),
            }),
        }
    }

    async fn delete_entry(&self, path: &str) -> Result<(), DataStoreError> {
        let result = sqlx::query("DELETE FROM vsm_entries WHERE path = $1")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|e| DataStoreError::Backend {
                reason: e.to_string(),
            })?;

        if result.rows_affected() == 0 {
            return Err(DataStoreError::NotFound {
                path: path.to_owned(),
            });
        }
        Ok(())
    }

    async fn search_children(
        &self,
        parent_path: &str,
    ) -> Result<Vec<DataStoreEntry>, DataStoreError> {
        let prefix = child_prefix(parent_path);
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT path, owner_entry_id, entry_type, meta_data, secret_data, policy_ids \
             FROM vsm_entries WHERE path LIKE $1 ORDER BY path",
        )
        .bind(format!("{prefix}%"))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DataStoreError::Backend {
            reason: e.to_string(),
        })?;

        rows.into_iter()
            .map(Self::row_to_entry)
            .filter(|res| match res {
                Ok(entry) => is_immediate_child(&entry.path, &prefix),
                Err(_) => true,
            })
            .collect()
    }
}
