//! Certificate authority for TLS interception.
//!
//! The proxy answers CONNECT with a per-host leaf certificate minted on
//! demand and signed by a process-local CA. The CA is either loaded from
//! PEM files or generated at startup; leaves carry the host as their single
//! SAN, inherit the CA's key algorithm, and are cached for the lifetime of
//! the process.

use anyhow::Context;
use parking_lot::RwLock;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256,
};
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use time::{Duration, OffsetDateTime};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

static CRYPTO_PROVIDER_INIT: Once = Once::new();

/// Install a process-wide rustls `CryptoProvider`. Both the `ring` and
/// `aws-lc-rs` backends end up in the dependency graph (pulled in
/// transitively by different crates), which makes rustls's automatic
/// feature-based selection ambiguous; install one explicitly instead.
fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

pub struct CertificateAuthority {
    ca_cert: Certificate,
    ca_key: KeyPair,
    leaf_cache: RwLock<HashMap<String, TlsAcceptor>>,
}

impl CertificateAuthority {
    /// Generate a throwaway CA for this process.
    pub fn generate() -> Result<CertificateAuthority, anyhow::Error> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "Hoverfly Authority");
        dn.push(DnType::OrganizationName, "Hoverfly");
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(3650);

        let ca_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .context("Failed to generate CA key")?;
        let ca_cert = params
            .self_signed(&ca_key)
            .context("Failed to self-sign CA certificate")?;

        Ok(CertificateAuthority {
            ca_cert,
            ca_key,
            leaf_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Load the CA from PEM files. Failure here is fatal at startup.
    pub fn from_pem_files(
        cert_path: &str,
        key_path: &str,
    ) -> Result<CertificateAuthority, anyhow::Error> {
        let cert_pem = std::fs::read_to_string(cert_path)
            .with_context(|| format!("Failed to read CA certificate '{cert_path}'"))?;
        let key_pem = std::fs::read_to_string(key_path)
            .with_context(|| format!("Failed to read CA key '{key_path}'"))?;

        let ca_key = KeyPair::from_pem(&key_pem).context("Failed to parse CA key")?;
        let params = CertificateParams::from_ca_cert_pem(&cert_pem)
            .context("Failed to parse CA certificate")?;
        let ca_cert = params
            .self_signed(&ca_key)
            .context("Failed to rebuild CA certificate")?;

        Ok(CertificateAuthority {
            ca_cert,
            ca_key,
            leaf_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn ca_cert_pem(&self) -> String {
        self.ca_cert.pem()
    }

    /// A TLS acceptor presenting a leaf for `host`, minting one on first
    /// use. A double-mint on race is fine; the last write wins.
    pub fn acceptor_for(&self, host: &str) -> Result<TlsAcceptor, anyhow::Error> {
        if let Some(acceptor) = self.leaf_cache.read().get(host) {
            return Ok(acceptor.clone());
        }

        let acceptor = self.mint_leaf(host)?;
        self.leaf_cache
            .write()
            .insert(host.to_string(), acceptor.clone());
        debug!(host, "minted leaf certificate");
        Ok(acceptor)
    }

    fn mint_leaf(&self, host: &str) -> Result<TlsAcceptor, anyhow::Error> {
        ensure_crypto_provider();

        let mut params = CertificateParams::new(vec![host.to_string()])
            .with_context(|| format!("Invalid SAN host '{host}'"))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        params.distinguished_name = dn;

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::days(365);

        let leaf_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .context("Failed to generate leaf key")?;
        let leaf = params
            .signed_by(&leaf_key, &self.ca_cert, &self.ca_key)
            .context("Failed to sign leaf certificate")?;

        let chain = vec![leaf.der().clone(), self.ca_cert.der().clone()];
        let key = PrivatePkcs8KeyDer::from(leaf_key.serialize_der());

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, key.into())
            .context("Failed to build TLS configuration for minted leaf")?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }

    pub fn cached_leaf_count(&self) -> usize {
        self.leaf_cache.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_generated_ca_is_pem() {
        let ca = CertificateAuthority::generate().unwrap();
        assert!(ca.ca_cert_pem().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn test_leaves_are_cached_per_host() {
        let ca = CertificateAuthority::generate().unwrap();
        assert_eq!(ca.cached_leaf_count(), 0);

        ca.acceptor_for("example.com").unwrap();
        ca.acceptor_for("example.com").unwrap();
        assert_eq!(ca.cached_leaf_count(), 1);

        ca.acceptor_for("other.org").unwrap();
        assert_eq!(ca.cached_leaf_count(), 2);
    }

    #[test]
    fn test_ca_loads_from_pem_files() {
        let ca = CertificateAuthority::generate().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let cert_path = dir.path().join("ca.pem");
        let key_path = dir.path().join("ca.key");
        std::fs::File::create(&cert_path)
            .unwrap()
            .write_all(ca.ca_cert_pem().as_bytes())
            .unwrap();
        std::fs::File::create(&key_path)
            .unwrap()
            .write_all(ca.ca_key.serialize_pem().as_bytes())
            .unwrap();

        let reloaded = CertificateAuthority::from_pem_files(
            cert_path.to_str().unwrap(),
            key_path.to_str().unwrap(),
        )
        .unwrap();
        reloaded.acceptor_for("example.com").unwrap();
    }

    #[test]
    fn test_missing_ca_files_are_an_error() {
        assert!(CertificateAuthority::from_pem_files("/no/cert.pem", "/no/key.pem").is_err());
    }
}
