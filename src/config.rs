use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub delivery: DeliveryConfig,
    pub imap: ImapConfig,
    pub storage: StorageConfig,
    pub tls: TlsPathsConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_mx_port")]
    pub mx_port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// DNS-over-HTTPS endpoint, e.g. "https://cloudflare-dns.com/dns-query".
    /// When unset, MX resolution falls back to A/AAAA of the domain itself.
    pub doh_upstream: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImapConfig {
    pub imap_port: u16,
    pub imaps_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub root: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Filesystem,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsPathsConfig {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub address: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_mx_port() -> u16 {
    25
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_use_tls() -> bool {
    true
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::MailError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| crate::error::MailError::Config(e.to_string()))
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig {
                hostname: "localhost".to_string(),
            },
            smtp: SmtpConfig { port: 2525 },
            delivery: DeliveryConfig {
                mx_port: 25,
                connect_timeout_secs: 30,
                use_tls: true,
                doh_upstream: None,
            },
            imap: ImapConfig {
                imap_port: 1143,
                imaps_port: 1993,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                root: None,
            },
            tls: TlsPathsConfig {
                cert_path: None,
                key_path: None,
            },
            users: Vec::new(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
