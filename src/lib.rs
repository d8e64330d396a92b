//! mailroom: self-contained SMTP/IMAP mail stack
//!
//! A compact mail server for self-hosted deployments, integration testing,
//! and embedded mail infrastructure.
//!
//! # Features
//!
//! - **SMTP server**: receives mail with STARTTLS and AUTH LOGIN/PLAIN,
//!   stores for local users and relays for authenticated senders
//! - **SMTP delivery client**: outbound sessions with MX selection and
//!   opportunistic STARTTLS
//! - **IMAP server**: cleartext-with-STARTTLS and implicit-TLS listeners
//!   over a single INBOX per user
//! - **Pluggable storage**: in-memory or one-file-per-message on disk
//!
//! # Example
//!
//! ```no_run
//! use mailroom::config::Config;
//! use mailroom::security::{tls, MemoryAuthProvider, TlsConfig};
//! use mailroom::smtp::SmtpServer;
//! use mailroom::storage::MemoryMailboxStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let auth = Arc::new(MemoryAuthProvider::new([(
//!         "alice@example.com".to_string(),
//!         "pass123".to_string(),
//!     )]));
//!     let store = Arc::new(MemoryMailboxStore::new(auth.clone()));
//!
//!     let (cert, key) = tls::generate_self_signed_cert(&config.server.hostname)?;
//!     let tls_config = TlsConfig::from_pem(&cert, &key)?;
//!
//!     let server = SmtpServer::new(
//!         config.server.hostname.clone(),
//!         config.smtp.port,
//!         tls_config,
//!         auth,
//!         store,
//!         None,
//!     );
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`smtp`]: Inbound sessions and outbound delivery
//! - [`imap`]: Mailbox access protocol
//! - [`dns`]: MX resolution (DNS-over-HTTPS and A/AAAA fallback)
//! - [`storage`]: Mailbox store backends
//! - [`security`]: TLS material and authentication

pub mod config;
pub mod dns;
pub mod error;
pub mod imap;
pub mod security;
pub mod smtp;
pub mod storage;
pub mod stream;

// Re-export commonly used types
pub use config::Config;
pub use error::{MailError, Result};
