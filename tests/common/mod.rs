//! Shared helpers for the integration tests: server spawning on ephemeral
//! ports and minimal line-oriented SMTP/IMAP test clients.
#![allow(dead_code)]

use mailroom::imap::ImapServer;
use mailroom::security::tls::{generate_self_signed_cert, insecure_client_config};
use mailroom::security::{AuthProvider, MemoryAuthProvider, TlsConfig};
use mailroom::smtp::{EmailDeliveryClient, SmtpServer};
use mailroom::storage::{MailboxStore, MemoryMailboxStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

pub fn test_tls_config() -> TlsConfig {
    let (cert_pem, key_pem) = generate_self_signed_cert("localhost").unwrap();
    TlsConfig::from_pem(&cert_pem, &key_pem).unwrap()
}

pub fn test_auth(users: &[(&str, &str)]) -> Arc<dyn AuthProvider> {
    Arc::new(MemoryAuthProvider::new(
        users
            .iter()
            .map(|(address, secret)| (address.to_string(), secret.to_string())),
    ))
}

/// Spawn an SMTP server on an ephemeral port backed by an in-memory store.
pub async fn spawn_smtp_server(
    users: &[(&str, &str)],
    delivery: Option<Arc<dyn EmailDeliveryClient>>,
) -> (SocketAddr, Arc<dyn MailboxStore>) {
    let auth = test_auth(users);
    let store: Arc<dyn MailboxStore> = Arc::new(MemoryMailboxStore::new(auth.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = SmtpServer::new(
        "localhost".to_string(),
        addr.port(),
        test_tls_config(),
        auth,
        store.clone(),
        delivery,
    );
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    (addr, store)
}

/// Spawn an IMAP server on ephemeral ports. Returns the cleartext and
/// implicit-TLS addresses plus the shared store.
pub async fn spawn_imap_server(
    users: &[(&str, &str)],
) -> (SocketAddr, SocketAddr, Arc<dyn MailboxStore>) {
    let auth = test_auth(users);
    let store: Arc<dyn MailboxStore> = Arc::new(MemoryMailboxStore::new(auth.clone()));

    let imap_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let imaps_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let imap_addr = imap_listener.local_addr().unwrap();
    let imaps_addr = imaps_listener.local_addr().unwrap();

    let server = ImapServer::new(
        "localhost".to_string(),
        imap_addr.port(),
        imaps_addr.port(),
        test_tls_config(),
        auth,
        store.clone(),
    );
    tokio::spawn(async move {
        let _ = server.serve(imap_listener, imaps_listener).await;
    });

    (imap_addr, imaps_addr, store)
}

/// Upgrade a client-side connection to TLS, accepting any certificate.
pub async fn client_tls_handshake(tcp: TcpStream) -> TlsStream<TcpStream> {
    let connector = TlsConnector::from(insecure_client_config());
    let server_name = rustls::ServerName::try_from("localhost").unwrap();
    connector.connect(server_name, tcp).await.unwrap()
}

/// Minimal line-oriented protocol client.
pub struct LineClient<S> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    pub async fn send_line(&mut self, line: &str) {
        self.stream
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.stream.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    /// Read one SMTP reply, collecting `250-` style continuation lines.
    pub async fn read_smtp_reply(&mut self) -> String {
        let mut reply = String::new();
        loop {
            let line = self.read_line().await;
            reply.push_str(&line);
            reply.push('\n');

            // "250-..." continues, "250 ..." (or a bare code) ends the reply.
            if line.len() < 4 || line.as_bytes()[3] == b' ' {
                break;
            }
        }
        reply.trim_end().to_string()
    }

    /// Read IMAP response lines until the line tagged with `tag`.
    pub async fn read_until_tag(&mut self, tag: &str) -> String {
        let mut response = String::new();
        loop {
            let line = self.read_line().await;
            let done = line.starts_with(tag);
            response.push_str(&line);
            response.push('\n');
            if done {
                return response;
            }
        }
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}
