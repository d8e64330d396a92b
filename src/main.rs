mod config;
mod dns;
mod error;
mod imap;
mod security;
mod smtp;
mod storage;
mod stream;

use crate::config::{Config, StorageBackend};
use crate::dns::{DohResolver, MxResolver, SimpleResolver};
use crate::error::MailError;
use crate::imap::ImapServer;
use crate::security::{tls, AuthProvider, MemoryAuthProvider, TlsConfig};
use crate::smtp::{EmailDeliveryClient, SmtpDeliveryClient, SmtpServer};
use crate::storage::{FilesystemMailboxStore, MailboxStore, MemoryMailboxStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = if std::path::Path::new("config.toml").exists() {
        Config::from_file("config.toml")?
    } else {
        Config::default()
    };

    // Initialize logging
    let level: Level = config.logging.level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .pretty()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Starting mailroom");
    info!("  Hostname: {}", config.server.hostname);
    info!("  SMTP port: {}", config.smtp.port);
    info!(
        "  IMAP ports: {} (STARTTLS) / {} (implicit TLS)",
        config.imap.imap_port, config.imap.imaps_port
    );

    // Auth provider seeded from the [[users]] section
    let auth: Arc<dyn AuthProvider> = Arc::new(MemoryAuthProvider::new(
        config
            .users
            .iter()
            .map(|u| (u.address.clone(), u.secret.clone())),
    ));
    info!("  Users: {}", config.users.len());

    // Mailbox store
    let store: Arc<dyn MailboxStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryMailboxStore::new(auth.clone())),
        StorageBackend::Filesystem => {
            let root = config.storage.root.clone().ok_or_else(|| {
                MailError::Config("storage.root is required for the filesystem backend".into())
            })?;
            info!("  Storage root: {}", root);
            Arc::new(FilesystemMailboxStore::new(root, auth.clone()))
        }
    };

    // TLS material: configured PEM files, or a generated development
    // certificate when none are set.
    let tls_config = match (&config.tls.cert_path, &config.tls.key_path) {
        (Some(cert), Some(key)) => TlsConfig::from_pem_files(cert, key)?,
        _ => {
            info!("No TLS material configured, generating a self-signed certificate");
            let (cert_pem, key_pem) = tls::generate_self_signed_cert(&config.server.hostname)?;
            TlsConfig::from_pem(&cert_pem, &key_pem)?
        }
    };

    // MX resolver and outbound delivery
    let resolver: Arc<dyn MxResolver> = match &config.delivery.doh_upstream {
        Some(upstream) => {
            info!("  DoH upstream: {}", upstream);
            Arc::new(DohResolver::new(upstream.clone()))
        }
        None => Arc::new(SimpleResolver),
    };

    let delivery: Arc<dyn EmailDeliveryClient> = Arc::new(
        SmtpDeliveryClient::new(resolver)
            .with_hostname(config.server.hostname.clone())
            .with_mx_port(config.delivery.mx_port)
            .with_connect_timeout(Duration::from_secs(config.delivery.connect_timeout_secs))
            .with_tls(config.delivery.use_tls),
    );

    let smtp_server = SmtpServer::new(
        config.server.hostname.clone(),
        config.smtp.port,
        tls_config.clone(),
        auth.clone(),
        store.clone(),
        Some(delivery),
    );

    let imap_server = ImapServer::new(
        config.server.hostname.clone(),
        config.imap.imap_port,
        config.imap.imaps_port,
        tls_config,
        auth,
        store,
    );

    tokio::try_join!(smtp_server.run(), imap_server.run())?;

    Ok(())
}
