//! TLS material for STARTTLS and implicit-TLS listeners
//!
//! Server-side certificate loading plus the client configuration used by the
//! outbound delivery client, which accepts any certificate the remote MTA
//! presents.

use crate::error::{MailError, Result};
use rustls::{ClientConfig, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Server-side TLS configuration shared by the SMTP and IMAP listeners.
#[derive(Clone)]
pub struct TlsConfig {
    server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    /// Create TLS config from PEM certificate chain and PKCS#8 key files.
    pub fn from_pem_files<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<Self> {
        info!("Loading TLS certificate from {:?}", cert_path.as_ref());

        let read = |path: &Path| {
            std::fs::read_to_string(path)
                .map_err(|e| MailError::Tls(format!("Cannot read {}: {}", path.display(), e)))
        };
        let cert_pem = read(cert_path.as_ref())?;
        let key_pem = read(key_path.as_ref())?;

        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Build from in-memory PEM material (configured files or a generated
    /// development certificate).
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let chain = certs(&mut BufReader::new(cert_pem.as_bytes()))
            .map_err(|e| MailError::Tls(format!("Certificate PEM is malformed: {}", e)))?;
        if chain.is_empty() {
            return Err(MailError::Tls(
                "Certificate PEM holds no certificates".to_string(),
            ));
        }
        debug!("Certificate chain has {} entries", chain.len());

        let key = pkcs8_private_keys(&mut BufReader::new(key_pem.as_bytes()))
            .map_err(|e| MailError::Tls(format!("Key PEM is malformed: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| MailError::Tls("Key PEM holds no PKCS#8 key".to_string()))?;

        let config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(
                chain.into_iter().map(rustls::Certificate).collect(),
                rustls::PrivateKey(key),
            )
            .map_err(|e| MailError::Tls(format!("Certificate/key pair rejected: {}", e)))?;

        Ok(Self {
            server_config: Arc::new(config),
        })
    }

    /// Create a TLS acceptor for STARTTLS and implicit-TLS listeners.
    pub fn acceptor(&self) -> tokio_rustls::TlsAcceptor {
        tokio_rustls::TlsAcceptor::from(self.server_config.clone())
    }
}

/// Client configuration that accepts any server certificate.
///
/// Outbound STARTTLS is opportunistic: encryption over an unverified channel
/// beats cleartext, and remote MTAs routinely present self-signed material.
pub fn insecure_client_config() -> Arc<ClientConfig> {
    struct AcceptAnyCert;

    impl rustls::client::ServerCertVerifier for AcceptAnyCert {
        fn verify_server_cert(
            &self,
            _end_entity: &rustls::Certificate,
            _intermediates: &[rustls::Certificate],
            _server_name: &rustls::ServerName,
            _scts: &mut dyn Iterator<Item = &[u8]>,
            _ocsp_response: &[u8],
            _now: SystemTime,
        ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
            Ok(rustls::client::ServerCertVerified::assertion())
        }
    }

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();

    Arc::new(config)
}

/// Generate a self-signed certificate for development and testing.
///
/// Returns `(cert_pem, key_pem)`.
pub fn generate_self_signed_cert(domain: &str) -> Result<(String, String)> {
    use rcgen::{CertificateParams, DistinguishedName};

    info!("Generating self-signed certificate for {}", domain);

    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params.subject_alt_names = vec![
        rcgen::SanType::DnsName(domain.to_string()),
        rcgen::SanType::DnsName(format!("*.{}", domain)),
    ];

    let cert = rcgen::Certificate::from_params(params)
        .map_err(|e| MailError::Tls(format!("Failed to generate certificate: {}", e)))?;

    let cert_pem = cert
        .serialize_pem()
        .map_err(|e| MailError::Tls(format!("Failed to serialize certificate: {}", e)))?;
    let key_pem = cert.serialize_private_key_pem();

    Ok((cert_pem, key_pem))
}
