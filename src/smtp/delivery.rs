//! Outbound SMTP delivery
//!
//! Drives one delivery attempt against the recipient domain's mail exchanger:
//! MX selection, connect, EHLO, opportunistic STARTTLS with re-EHLO, envelope
//! transmission, dot-stuffed body, QUIT. Any unexpected reply or transport
//! error fails the attempt; no retry or bounce is generated here.

use crate::dns::{pick_mx, MxResolver};
use crate::error::{MailError, Result};
use crate::security::tls::insecure_client_config;
use crate::stream::MailStream;
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};

/// One-shot delivery of a message to every recipient of a single domain.
#[async_trait]
pub trait EmailDeliveryClient: Send + Sync {
    /// Returns true when the remote server accepted the message.
    async fn send_email(&self, domain: &str, from: &str, recipients: &[String], body: &str)
        -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClientState {
    Greet,
    Ehlo,
    TlsWait,
    AfterMail,
    AfterDataReq,
    AfterData,
    Closing,
}

pub struct SmtpDeliveryClient {
    hostname: String,
    resolver: Arc<dyn MxResolver>,
    mx_port: u16,
    connect_timeout: Duration,
    use_tls: bool,
}

impl SmtpDeliveryClient {
    /// EHLO identity defaults to the machine hostname; override it with
    /// [`with_hostname`](Self::with_hostname).
    pub fn new(resolver: Arc<dyn MxResolver>) -> Self {
        Self {
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            resolver,
            mx_port: 25,
            connect_timeout: Duration::from_secs(30),
            use_tls: true,
        }
    }

    pub fn with_hostname(mut self, hostname: String) -> Self {
        self.hostname = hostname;
        self
    }

    pub fn with_mx_port(mut self, port: u16) -> Self {
        self.mx_port = port;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    async fn drive_session(
        &self,
        tcp: TcpStream,
        domain: &str,
        from: &str,
        recipients: &[String],
        body: &str,
    ) -> Result<bool> {
        let mut stream = MailStream::Plain(tcp);
        let mut state = ClientState::Greet;
        let mut capabilities: HashSet<String> = HashSet::new();
        let mut upgraded = false;
        let mut next_rcpt = 0usize;

        'session: loop {
            let mut reader = BufReader::new(&mut stream);
            let mut line = String::new();

            loop {
                line.clear();
                let n = reader.read_line(&mut line).await?;
                if n == 0 {
                    warn!("Remote server closed connection in state {:?}", state);
                    return Ok(false);
                }

                let reply = line.trim_end();
                debug!("< {}", reply);

                match state {
                    ClientState::Greet if reply.starts_with("220") => {
                        write_line(&mut reader, &format!("EHLO {}", self.hostname)).await?;
                        state = ClientState::Ehlo;
                    }
                    ClientState::Ehlo if reply.starts_with("250") => {
                        if reply.len() > 4 {
                            capabilities.insert(reply[4..].trim().to_uppercase());
                        }
                        // "250-" continues the capability list, "250 " ends it.
                        if reply.starts_with("250-") {
                            continue;
                        }

                        if self.use_tls && !upgraded && capabilities.contains("STARTTLS") {
                            write_line(&mut reader, "STARTTLS").await?;
                            state = ClientState::TlsWait;
                        } else {
                            write_line(&mut reader, &format!("MAIL FROM:<{}>", from)).await?;
                            state = ClientState::AfterMail;
                        }
                    }
                    ClientState::TlsWait if reply.starts_with("220") => {
                        drop(reader);
                        self.upgrade_to_tls(&mut stream, domain).await?;
                        upgraded = true;
                        capabilities.clear();

                        stream
                            .write_all(format!("EHLO {}\r\n", self.hostname).as_bytes())
                            .await?;
                        state = ClientState::Ehlo;
                        continue 'session;
                    }
                    ClientState::AfterMail if reply.starts_with("250") => {
                        if next_rcpt < recipients.len() {
                            write_line(
                                &mut reader,
                                &format!("RCPT TO:<{}>", recipients[next_rcpt]),
                            )
                            .await?;
                            next_rcpt += 1;
                        } else {
                            write_line(&mut reader, "DATA").await?;
                            state = ClientState::AfterDataReq;
                        }
                    }
                    ClientState::AfterDataReq if reply.starts_with("354") => {
                        self.write_body(&mut reader, body).await?;
                        state = ClientState::AfterData;
                    }
                    ClientState::AfterData if reply.starts_with("250") => {
                        write_line(&mut reader, "QUIT").await?;
                        state = ClientState::Closing;
                    }
                    ClientState::Closing if reply.starts_with("221") => {
                        return Ok(true);
                    }
                    _ => {
                        warn!("Unexpected reply in state {:?}: {}", state, reply);
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// CRLF-normalize and dot-stuff the body, then terminate with the
    /// lone-dot line.
    async fn write_body<W>(&self, writer: &mut W, body: &str) -> Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        let mut lines: Vec<&str> = body.split('\n').collect();
        // A trailing newline already terminates the last line; don't send it
        // as an extra blank one.
        if lines.last() == Some(&"") {
            lines.pop();
        }

        for line in lines {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.starts_with('.') {
                writer.write_all(b".").await?;
            }
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\r\n").await?;
        }
        writer.write_all(b".\r\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn upgrade_to_tls(&self, stream: &mut MailStream, domain: &str) -> Result<()> {
        let tcp = stream.take_plain().ok_or_else(|| {
            MailError::SmtpProtocol("STARTTLS on an already-encrypted stream".to_string())
        })?;

        let server_name = rustls::ServerName::try_from(domain)
            .map_err(|e| MailError::Tls(format!("Invalid TLS server name {}: {}", domain, e)))?;

        let connector = TlsConnector::from(insecure_client_config());
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| MailError::Tls(format!("TLS handshake failed: {}", e)))?;

        *stream = MailStream::ClientTls(Box::new(tls_stream));
        debug!("Outbound connection upgraded to TLS");
        Ok(())
    }
}

#[async_trait]
impl EmailDeliveryClient for SmtpDeliveryClient {
    async fn send_email(
        &self,
        domain: &str,
        from: &str,
        recipients: &[String],
        body: &str,
    ) -> bool {
        let records = self.resolver.resolve_mx(domain).await;
        let mx = match pick_mx(&records) {
            Some(mx) => mx,
            None => {
                error!("No MX records resolved for {}", domain);
                return false;
            }
        };

        let addr = SocketAddr::new(mx.address, self.mx_port);
        info!(
            "Delivering to {} via {} (preference {})",
            domain, addr, mx.preference
        );

        let tcp = match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", addr, e);
                return false;
            }
            Err(_) => {
                error!("Connect to {} timed out", addr);
                return false;
            }
        };

        match self.drive_session(tcp, domain, from, recipients, body).await {
            Ok(accepted) => {
                if accepted {
                    info!("Message accepted by {} for {:?}", domain, recipients);
                }
                accepted
            }
            Err(e) => {
                error!("Delivery session to {} failed: {}", domain, e);
                false
            }
        }
    }
}

async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    debug!("> {}", line);
    writer.write_all(format!("{}\r\n", line).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
