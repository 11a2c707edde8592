//! X.509 certificate secret type.
//!
//! Issues a certificate for a stored RSA private key and keeps the PEM
//! through the envelope like any other secret. The pipeline:
//!
//! 1. parse and validate the metadata;
//! 2. resolve the subject private key: authorization check on the parent of
//!    the referenced key's path, then read and unseal the key through the
//!    ordinary envelope and parse its PKCS#1 PEM;
//! 3. build the certificate template (random 128-bit serial, subject DN
//!    from metadata, one year validity, cert-sign + digital-signature key
//!    usage, server-auth + client-auth extended usage);
//! 4. load the CA certificate and key from the paths named in
//!    `server.https`;
//! 5. sign with the CA key, wrap the DER as a `CERTIFICATE` PEM block;
//! 6. seal the PEM through the envelope.
//!
//! The authorization check runs before anything is read or written, so a
//! denied caller observes no side effects.

use std::io::ErrorKind;

use rand::Rng;
use rcgen::{
    Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_RSA_SHA256,
};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::context::RequestContext;
use crate::datastore::{parent_of, secret_id_to_path};
use crate::error::{CryptoError, SecretError};
use crate::model::{Operation, SecretEntry};

use super::{envelope, SecretType, SecretTypeInit};

/// Registered name of the X.509 certificate type.
pub const X509_CERTIFICATE_SECRET_TYPE: &str = "X509Certificate";

/// Issued certificates are valid for one year.
const VALIDITY_DAYS: i64 = 365;

/// Certificate metadata. `common_name`, `organization`, and
/// `private_key_id` are required; the remaining subject fields are
/// optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct X509CertificateMetaData {
    pub common_name: String,
    pub organization: String,
    pub organizational_unit: String,
    pub country: String,
    pub locality: String,
    /// Id of a stored `RSAPrivateKey` secret to certify.
    pub private_key_id: String,
}

/// Certificate issuance over the envelope pipeline.
pub struct X509CertificateSecretType {
    init: SecretTypeInit,
}

impl X509CertificateSecretType {
    #[must_use]
    pub fn new(init: SecretTypeInit) -> Self {
        Self { init }
    }

    /// Synthesize the certificate PEM for the given metadata.
    async fn generate_cert(
        &self,
        ctx: &RequestContext,
        meta: &X509CertificateMetaData,
    ) -> Result<Vec<u8>, SecretError> {
        let subject_key = self.subject_key_pair(ctx, &meta.private_key_id).await?;
        let params = build_template(meta)?;
        let (ca_cert, ca_key) = self.load_ca(ctx).await?;

        let cert = params
            .signed_by(&subject_key, &ca_cert, &ca_key)
            .map_err(|e| CryptoError::Certificate {
                reason: format!("signing failed: {e}"),
            })?;

        Ok(cert.pem().into_bytes())
    }

    /// Resolve the referenced private key: authorization gate, envelope
    /// unseal, PKCS#1 parse.
    async fn subject_key_pair(
        &self,
        ctx: &RequestContext,
        private_key_id: &str,
    ) -> Result<KeyPair, SecretError> {
        let key_path = secret_id_to_path(private_key_id);

        // The caller must be allowed to read the subtree holding the key.
        // Checked before any read or write happens on its behalf.
        self.init
            .authz
            .check(ctx, Operation::Read, parent_of(&key_path))
            .await?;

        if ctx.is_cancelled() {
            return Err(SecretError::Canceled);
        }
        let stored = self.init.data_store.read_entry(&key_path).await?;
        let key_entry = stored.to_secret_entry();

        let pem = Zeroizing::new(envelope::unseal_secret(ctx, &self.init, &key_entry).await?);
        let pem_str = std::str::from_utf8(&pem).map_err(|_| CryptoError::KeyParse {
            reason: "subject private key is not UTF-8 PEM".to_owned(),
        })?;
        let rsa_key = RsaPrivateKey::from_pkcs1_pem(pem_str).map_err(|e| CryptoError::KeyParse {
            reason: format!("subject private key: {e}"),
        })?;

        rsa_to_key_pair(&rsa_key)
    }

    /// Load the CA certificate and key named in `server.https`.
    async fn load_ca(&self, ctx: &RequestContext) -> Result<(Certificate, KeyPair), SecretError> {
        let https = &self.init.config.server.https;
        if https.ca_cert.is_empty() {
            return Err(SecretError::ConfigMissing {
                key: "server.https.caCert".to_owned(),
            });
        }
        if https.ca_key.is_empty() {
            return Err(SecretError::ConfigMissing {
                key: "server.https.caKey".to_owned(),
            });
        }

        if ctx.is_cancelled() {
            return Err(SecretError::Canceled);
        }
        let ca_cert_pem = read_config_file(&https.ca_cert, "server.https.caCert").await?;

        if ctx.is_cancelled() {
            return Err(SecretError::Canceled);
        }
        let ca_key_pem =
            Zeroizing::new(read_config_file(&https.ca_key, "server.https.caKey").await?);

        // Keep the CA's subject as the issuer of everything we sign.
        let ca_params =
            CertificateParams::from_ca_cert_pem(&ca_cert_pem).map_err(|e| {
                CryptoError::KeyParse {
                    reason: format!("CA certificate: {e}"),
                }
            })?;

        let ca_rsa = parse_rsa_private_key(&ca_key_pem)?;
        let ca_key = rsa_to_key_pair(&ca_rsa)?;
        let ca_cert = ca_params
            .self_signed(&ca_key)
            .map_err(|e| CryptoError::Certificate {
                reason: format!("CA reconstruction failed: {e}"),
            })?;

        Ok((ca_cert, ca_key))
    }
}

#[async_trait::async_trait]
impl SecretType for X509CertificateSecretType {
    fn type_name(&self) -> &str {
        X509_CERTIFICATE_SECRET_TYPE
    }

    async fn create_secret(
        &self,
        ctx: &RequestContext,
        entry: &SecretEntry,
    ) -> Result<String, SecretError> {
        let meta: X509CertificateMetaData =
            serde_json::from_str(&entry.meta_data).map_err(|e| SecretError::InputValidation {
                reason: format!("malformed certificate metadata: {e}"),
            })?;

        if meta.common_name.is_empty() {
            return Err(SecretError::InputValidation {
                reason: "commonName is required".to_owned(),
            });
        }
        if meta.organization.is_empty() {
            return Err(SecretError::InputValidation {
                reason: "organization is required".to_owned(),
            });
        }
        if meta.private_key_id.is_empty() {
            return Err(SecretError::InputValidation {
                reason: "privateKeyId is required".to_owned(),
            });
        }

        let cert_pem = self.generate_cert(ctx, &meta).await?;
        envelope::seal_secret(ctx, &self.init, entry, &cert_pem).await
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

/// Certificate template per issuance policy: random 128-bit serial, subject
/// DN from metadata (empty optional fields skipped), one year validity,
/// cert-sign + digital-signature key usage, server/client auth EKUs.
fn build_template(meta: &X509CertificateMetaData) -> Result<CertificateParams, SecretError> {
    let mut params =
        CertificateParams::new(Vec::<String>::new()).map_err(|e| CryptoError::Certificate {
            reason: format!("template construction failed: {e}"),
        })?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, meta.common_name.clone());
    dn.push(DnType::OrganizationName, meta.organization.clone());
    if !meta.organizational_unit.is_empty() {
        dn.push(DnType::OrganizationalUnitName, meta.organizational_unit.clone());
    }
    if !meta.country.is_empty() {
        dn.push(DnType::CountryName, meta.country.clone());
    }
    if !meta.locality.is_empty() {
        dn.push(DnType::LocalityName, meta.locality.clone());
    }
    params.distinguished_name = dn;

    let serial: [u8; 16] = rand::thread_rng().gen();
    params.serial_number = Some(SerialNumber::from(serial.to_vec()));

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(VALIDITY_DAYS);

    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];

    Ok(params)
}

/// Parse an RSA private key PEM, accepting both PKCS#1 and PKCS#8 framing.
fn parse_rsa_private_key(pem: &str) -> Result<RsaPrivateKey, SecretError> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| {
            CryptoError::KeyParse {
                reason: format!("RSA private key: {e}"),
            }
            .into()
        })
}

/// Bridge an RSA key into a signing key pair (SHA256-with-RSA).
fn rsa_to_key_pair(key: &RsaPrivateKey) -> Result<KeyPair, SecretError> {
    let pkcs8 = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyParse {
            reason: format!("PKCS#8 re-encoding failed: {e}"),
        })?;
    KeyPair::from_pem_and_sign_algo(&pkcs8, &PKCS_RSA_SHA256)
        .map_err(|e| {
            CryptoError::KeyParse {
                reason: format!("signing key construction failed: {e}"),
            }
            .into()
        })
}

/// Read a config-referenced file; a missing file is missing configuration.
async fn read_config_file(path: &str, key: &str) -> Result<String, SecretError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(SecretError::ConfigMissing {
            key: key.to_owned(),
        }),
        Err(e) => Err(SecretError::Internal {
            reason: format!("failed to read '{key}': {e}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::OsRng;
    use rsa::pkcs1::EncodeRsaPrivateKey;

    use crate::config::Config;
    use crate::context::{AuthorizationManager, Identity};
    use crate::datastore::{DataStoreAdapter, MemoryDataStore};
    use crate::error::{AuthzDenied, DataStoreError};
    use crate::secret::rsa_key::{RsaKeySecretType, RSA_PRIVATE_KEY_SECRET_TYPE};
    use crate::vks::VirtualKeyStore;

    use vsm_keystore::{KeyStoreBackend, MemoryKeyStore};

    use super::*;

    struct AllowAll;

    #[async_trait::async_trait]
    impl AuthorizationManager for AllowAll {
        async fn check(
            &self,
            _ctx: &RequestContext,
            _operation: Operation,
            _path: &str,
        ) -> Result<(), AuthzDenied> {
            Ok(())
        }
    }

    struct DenyAll;

    #[async_trait::async_trait]
    impl AuthorizationManager for DenyAll {
        async fn check(
            &self,
            _ctx: &RequestContext,
            operation: Operation,
            path: &str,
        ) -> Result<(), AuthzDenied> {
            Err(AuthzDenied {
                operation,
                path: path.to_owned(),
            })
        }
    }

    const TEST_CA_CN: &str = "VSM Test CA";

    /// Write a self-signed RSA CA into `dir`, returning (cert, key) paths.
    fn write_test_ca(dir: &std::path::Path) -> (String, String) {
        let ca_rsa = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let ca_key = rsa_to_key_pair(&ca_rsa).unwrap();

        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, TEST_CA_CN);
        dn.push(DnType::OrganizationName, "VSM");
        params.distinguished_name = dn;
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca_cert = params.self_signed(&ca_key).unwrap();

        let cert_path = dir.join("ca.pem");
        let key_path = dir.join("ca-key.pem");
        std::fs::write(&cert_path, ca_cert.pem()).unwrap();
        std::fs::write(
            &key_path,
            ca_rsa
                .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
                .unwrap()
                .as_bytes(),
        )
        .unwrap();
        (
            cert_path.to_string_lossy().into_owned(),
            key_path.to_string_lossy().into_owned(),
        )
    }

    fn make_init(
        authz: Arc<dyn AuthorizationManager>,
        ca_cert: &str,
        ca_key: &str,
    ) -> SecretTypeInit {
        let backends = (0..3)
            .map(|_| Arc::new(MemoryKeyStore::new()) as Arc<dyn KeyStoreBackend>)
            .collect();
        let mut config = Config::default();
        config.server.https.ca_cert = ca_cert.to_owned();
        config.server.https.ca_key = ca_key.to_owned();
        let data_store: Arc<dyn DataStoreAdapter> = Arc::new(MemoryDataStore::new());
        SecretTypeInit {
            data_store,
            key_store: Arc::new(VirtualKeyStore::new(backends, 2).unwrap()),
            authz,
            config: Arc::new(config),
        }
    }

    async fn store_subject_key(init: &SecretTypeInit, id: &str) {
        let handler = RsaKeySecretType::new(init.clone());
        let entry = SecretEntry {
            id: id.to_owned(),
            secret_type: RSA_PRIVATE_KEY_SECRET_TYPE.to_owned(),
            owner_entry_id: "user0".to_owned(),
            meta_data: String::new(),
            secret_data: Vec::new(),
            authorization_policy_ids: Vec::new(),
        };
        handler.create_secret(&ctx(), &entry).await.unwrap();
    }

    fn cert_entry(id: &str, meta_data: &str) -> SecretEntry {
        SecretEntry {
            id: id.to_owned(),
            secret_type: X509_CERTIFICATE_SECRET_TYPE.to_owned(),
            owner_entry_id: "user0".to_owned(),
            meta_data: meta_data.to_owned(),
            secret_data: Vec::new(),
            authorization_policy_ids: Vec::new(),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Identity::new("user0"))
    }

    #[tokio::test]
    async fn issues_certificate_signed_by_configured_ca() {
        let dir = tempfile::tempdir().unwrap();
        let (ca_cert, ca_key) = write_test_ca(dir.path());
        let init = make_init(Arc::new(AllowAll), &ca_cert, &ca_key);
        store_subject_key(&init, "subject-key").await;

        let handler = X509CertificateSecretType::new(init.clone());
        let meta = r#"{
            "commonName": "app.internal.test",
            "organization": "VSM",
            "organizationalUnit": "Platform",
            "country": "US",
            "locality": "Palo Alto",
            "privateKeyId": "subject-key"
        }"#;

        let id = handler
            .create_secret(&ctx(), &cert_entry("app-cert", meta))
            .await
            .unwrap();
        assert_eq!(id, "app-cert");

        let stored = init.data_store.read_entry("secrets/app-cert").await.unwrap();
        let fetched = handler
            .get_secret(&ctx(), &stored.to_secret_entry())
            .await
            .unwrap();

        let pem = String::from_utf8(fetched.secret_data).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));

        let (_, parsed_pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).unwrap();
        let cert = parsed_pem.parse_x509().unwrap();

        let subject_cn = cert
            .subject()
            .iter_common_name()
            .next()
            .unwrap()
            .as_str()
            .unwrap();
        assert_eq!(subject_cn, "app.internal.test");

        let issuer_cn = cert
            .issuer()
            .iter_common_name()
            .next()
            .unwrap()
            .as_str()
            .unwrap();
        assert_eq!(issuer_cn, TEST_CA_CN);

        let validity = cert.validity();
        let lifetime = validity.not_after.timestamp() - validity.not_before.timestamp();
        assert_eq!(lifetime, VALIDITY_DAYS * 24 * 3600);
    }

    #[tokio::test]
    async fn denied_caller_observes_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let (ca_cert, ca_key) = write_test_ca(dir.path());
        let init = make_init(Arc::new(DenyAll), &ca_cert, &ca_key);

        let handler = X509CertificateSecretType::new(init.clone());
        let meta = r#"{
            "commonName": "app.internal.test",
            "organization": "VSM",
            "privateKeyId": "someone-elses-key"
        }"#;

        let err = handler
            .create_secret(&ctx(), &cert_entry("app-cert", meta))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::Unauthorized(_)));

        // Nothing was written on the denied caller's behalf.
        let err = init
            .data_store
            .read_entry("secrets/app-cert")
            .await
            .unwrap_err();
        assert!(matches!(err, DataStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_required_metadata_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (ca_cert, ca_key) = write_test_ca(dir.path());
        let handler =
            X509CertificateSecretType::new(make_init(Arc::new(AllowAll), &ca_cert, &ca_key));

        for meta in [
            r#"{"organization": "VSM", "privateKeyId": "k"}"#,
            r#"{"commonName": "cn", "privateKeyId": "k"}"#,
            r#"{"commonName": "cn", "organization": "VSM"}"#,
            "not json",
        ] {
            let err = handler
                .create_secret(&ctx(), &cert_entry("c", meta))
                .await
                .unwrap_err();
            assert!(matches!(err, SecretError::InputValidation { .. }));
        }
    }

    #[tokio::test]
    async fn unconfigured_ca_fails_config_missing() {
        let init = make_init(Arc::new(AllowAll), "", "");
        store_subject_key(&init, "subject-key").await;

        let handler = X509CertificateSecretType::new(init);
        let meta = r#"{
            "commonName": "cn",
            "organization": "VSM",
            "privateKeyId": "subject-key"
        }"#;

        let err = handler
            .create_secret(&ctx(), &cert_entry("c", meta))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::ConfigMissing { .. }));
    }

    #[tokio::test]
    async fn missing_subject_key_fails_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (ca_cert, ca_key) = write_test_ca(dir.path());
        let handler =
            X509CertificateSecretType::new(make_init(Arc::new(AllowAll), &ca_cert, &ca_key));

        let meta = r#"{
            "commonName": "cn",
            "organization": "VSM",
            "privateKeyId": "ghost"
        }"#;

        let err = handler
            .create_secret(&ctx(), &cert_entry("c", meta))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SecretError::Store(DataStoreError::NotFound { .. })
        ));
    }
}
