//! IMAP listeners
//!
//! Two accept loops: cleartext-with-STARTTLS on the IMAP port and implicit
//! TLS on the IMAPS port. Each accepted connection runs an independent
//! session; closing a listener does not terminate in-flight sessions.

use crate::error::Result;
use crate::imap::session::ImapSession;
use crate::security::{AuthProvider, TlsConfig};
use crate::storage::MailboxStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct ImapServer {
    hostname: String,
    imap_port: u16,
    imaps_port: u16,
    tls_config: TlsConfig,
    auth_provider: Arc<dyn AuthProvider>,
    store: Arc<dyn MailboxStore>,
}

impl ImapServer {
    pub fn new(
        hostname: String,
        imap_port: u16,
        imaps_port: u16,
        tls_config: TlsConfig,
        auth_provider: Arc<dyn AuthProvider>,
        store: Arc<dyn MailboxStore>,
    ) -> Self {
        Self {
            hostname,
            imap_port,
            imaps_port,
            tls_config,
            auth_provider,
            store,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let imap_listener = TcpListener::bind(("0.0.0.0", self.imap_port)).await?;
        let imaps_listener = TcpListener::bind(("0.0.0.0", self.imaps_port)).await?;
        info!(
            "IMAP server listening on port {} (STARTTLS) and {} (implicit TLS)",
            self.imap_port, self.imaps_port
        );
        self.serve(imap_listener, imaps_listener).await
    }

    /// Run both accept loops over already-bound listeners. An accept error is
    /// fatal for the owning listener only; the other keeps serving.
    pub async fn serve(
        &self,
        imap_listener: TcpListener,
        imaps_listener: TcpListener,
    ) -> Result<()> {
        let (imap, imaps) = tokio::join!(
            self.accept_loop(imap_listener, false),
            self.accept_loop(imaps_listener, true),
        );
        imap?;
        imaps?;
        Ok(())
    }

    async fn accept_loop(&self, listener: TcpListener, implicit_tls: bool) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!("New IMAP connection from {}", addr);

                    let session = ImapSession::new(
                        self.hostname.clone(),
                        self.tls_config.clone(),
                        self.auth_provider.clone(),
                        self.store.clone(),
                    );

                    tokio::spawn(async move {
                        if let Err(e) = session.handle(socket, implicit_tls).await {
                            error!("IMAP session error: {}", e);
                        }
                        info!("IMAP connection from {} closed", addr);
                    });
                }
                Err(e) => {
                    error!("Failed to accept IMAP connection: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
}
