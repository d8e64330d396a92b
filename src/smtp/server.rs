use crate::error::Result;
use crate::security::{AuthProvider, TlsConfig};
use crate::smtp::delivery::EmailDeliveryClient;
use crate::smtp::session::SmtpSession;
use crate::storage::MailboxStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct SmtpServer {
    hostname: String,
    port: u16,
    tls_config: TlsConfig,
    auth_provider: Arc<dyn AuthProvider>,
    store: Arc<dyn MailboxStore>,
    delivery: Option<Arc<dyn EmailDeliveryClient>>,
}

impl SmtpServer {
    pub fn new(
        hostname: String,
        port: u16,
        tls_config: TlsConfig,
        auth_provider: Arc<dyn AuthProvider>,
        store: Arc<dyn MailboxStore>,
        delivery: Option<Arc<dyn EmailDeliveryClient>>,
    ) -> Self {
        Self {
            hostname,
            port,
            tls_config,
            auth_provider,
            store,
            delivery,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        info!("SMTP server listening on port {}", self.port);
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener; each connection gets an
    /// independent session task.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!("New SMTP connection from {}", addr);

                    let session = SmtpSession::new(
                        self.hostname.clone(),
                        self.tls_config.clone(),
                        self.auth_provider.clone(),
                        self.store.clone(),
                        self.delivery.clone(),
                    );

                    tokio::spawn(async move {
                        if let Err(e) = session.handle(socket).await {
                            error!("SMTP session error: {}", e);
                        }
                        info!("SMTP connection from {} closed", addr);
                    });
                }
                Err(e) => {
                    error!("Failed to accept SMTP connection: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
}
