//! Password secret type.
//!
//! Generates a random alphanumeric password server-side; the caller never
//! supplies the payload. Metadata: `{"length": 24}`, default 16.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::context::RequestContext;
use crate::error::SecretError;
use crate::model::SecretEntry;

use super::{envelope, SecretType, SecretTypeInit};

/// Registered name of the password type.
pub const PASSWORD_SECRET_TYPE: &str = "Password";

const DEFAULT_LENGTH: usize = 16;
const MAX_LENGTH: usize = 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PasswordMetaData {
    length: usize,
}

impl Default for PasswordMetaData {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
        }
    }
}

/// Server-side password generation over the envelope pipeline.
pub struct PasswordSecretType {
    init: SecretTypeInit,
}

impl PasswordSecretType {
    #[must_use]
    pub fn new(init: SecretTypeInit) -> Self {
        Self { init }
    }
}

fn parse_meta_data(meta_data: &str) -> Result<PasswordMetaData, SecretError> {
    let meta: PasswordMetaData = if meta_data.trim().is_empty() {
        PasswordMetaData::default()
    } else {
        serde_json::from_str(meta_data).map_err(|e| SecretError::InputValidation {
            reason: format!("malformed password metadata: {e}"),
        })?
    };
    if meta.length == 0 || meta.length > MAX_LENGTH {
        return Err(SecretError::InputValidation {
            reason: format!("password length must be between 1 and {MAX_LENGTH}"),
        });
    }
    Ok(meta)
}

#[async_trait::async_trait]
impl SecretType for PasswordSecretType {
    fn type_name(&self) -> &str {
        PASSWORD_SECRET_TYPE
    }

    async fn create_secret(
        &self,
        ctx: &RequestContext,
        entry: &SecretEntry,
    ) -> Result<String, SecretError> {
        let meta = parse_meta_data(&entry.meta_data)?;

        let password: Zeroizing<Vec<u8>> = Zeroizing::new(
            OsRng
                .sample_iter(&Alphanumeric)
                .take(meta.length)
                .collect(),
        );

        envelope::seal_secret(ctx, &self.init, entry, &password).await
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
