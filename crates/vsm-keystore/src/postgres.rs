//! External key-store backend backed by PostgreSQL.
//!
//! Stores one row per share path in a `vsm_key_shares` table, addressed by
//! a connection string. A deployment pointing its backends at independent
//! database instances keeps the threshold guarantee: no single instance
//! holds enough shares to reconstruct a key.
//!
//! Feature-gated behind `postgres-backend`. Uses `sqlx` with the Tokio
//! runtime for fully async operations.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::{validate_path, KeyStoreBackend, KeyStoreError};

/// A key-store backend backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresKeyStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresKeyStore")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

impl PostgresKeyStore {
    /// Connect to PostgreSQL and run the initial migration.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Backend`] if the connection or migration
    /// fails.
    pub async fn connect(connection_string: &str) -> Result<Self, KeyStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| KeyStoreError::Backend {
                path: String::new(),
                reason: format!("connection failed: {e}"),
            })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vsm_key_shares (\
                path  TEXT  PRIMARY KEY, \
                share BYTEA NOT NULL\
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| KeyStoreError::Backend {
            path: String::new(),
            reason: format!("migration failed: {e}"),
        })?;

        Ok(Self { pool })
    }

    fn backend_err(path: &str, err: &sqlx::Error) -> KeyStoreError {
        KeyStoreError::Backend {
            path: path.to_owned(),
            reason: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl KeyStoreBackend for PostgresKeyStore {
    async fn create(&self, path: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        validate_path(path)?;
        let result = sqlx::query(
            "INSERT INTO vsm_key_shares (path, share) VALUES ($1, $2) \
             ON CONFLICT (path) DO NOTHING",
        )
        .bind(path)
        .bind(bytes)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::backend_err(path, &e))?;

        if result.rows_affected() == 0 {
            return Err(KeyStoreError::AlreadyExists {
                path: path.to_owned(),
            });
        }
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, KeyStoreError> {
        validate_path(path)?;
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT share FROM vsm_key_shares WHERE path = $1")
                .bind(path)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Self::backend_err(path, &e))?;

        row.map(|(share,)| share).ok_or_else(|| KeyStoreError::NotFound {
            path: path.to_owned(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), KeyStoreError> {
        validate_path(path)?;
        let result = sqlx::query("DELETE FROM vsm_key_shares WHERE path = $1")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::backend_err(path, &e))?;

        if result.rows_affected() == 0 {
            return Err(KeyStoreError::NotFound {
                path: path.to_owned(),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), KeyStoreError> {
        self.pool.close().await;
        Ok(())
    }
}
