//! Opaque-blob secret type.
//!
//! The reference consumer of the envelope pipeline: the caller supplies the
//! payload bytes and gets them back verbatim on read. Every other secret
//! type is this plus a payload generator.

use crate::context::RequestContext;
use crate::error::SecretError;
use crate::model::SecretEntry;

use super::{envelope, SecretType, SecretTypeInit};

/// Registered name of the opaque-blob type.
pub const DATA_SECRET_TYPE: &str = "Data";

/// Envelope pipeline over caller-supplied bytes.
pub struct DataSecretType {
    init: SecretTypeInit,
}

impl DataSecretType {
    #[must_use]
    pub fn new(init: SecretTypeInit) -> Self {
        Self { init }
    }
}

#[async_trait::async_trait]
impl SecretType for DataSecretType {
    fn type_name(&self) -> &str {
        DATA_SECRET_TYPE
    }

    async fn create_secret(
        &self,
        ctx: &RequestContext,
        entry: &SecretEntry,
    ) -> Result<String, SecretError> {
        envelope::seal_secret(ctx, &self.init, entry, &entry.secret_data).await
    }

    async fn get_secret(
        &self,
        ctx: &RequestContext,
        entry: &SecretEntry,
    ) -> Result<SecretEntry, SecretError> {
        let plaintext = envelope::unseal_secret(ctx, &self.init, entry).await?;
        let mut result = entry.clone();
        result.secret_data = plaintext;
        Ok(result)
    }

    async fn delete_secret(
        &self,
        ctx: &RequestContext,
        entry: &SecretEntry,
    ) -> Result<(), SecretError> {
        envelope::remove_secret(ctx, &self.init, entry).await
    }
}
