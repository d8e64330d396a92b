//! Inbound SMTP session
//!
//! One state-machine instance per accepted connection: greeting, capability
//! negotiation, STARTTLS upgrade, AUTH LOGIN/PLAIN, envelope collection, body
//! accumulation, local storage, and relay fan-out for authenticated local
//! senders.

use crate::error::Result;
use crate::security::auth::{decode_login_credential, decode_plain_auth};
use crate::security::{AuthProvider, TlsConfig};
use crate::smtp::commands::SmtpCommand;
use crate::smtp::delivery::EmailDeliveryClient;
use crate::storage::MailboxStore;
use crate::stream::MailStream;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Result of processing commands on one stream incarnation
enum SessionResult {
    Continue, // restart processing (after STARTTLS upgrade)
    Quit,     // session ended
}

pub struct SmtpSession {
    hostname: String,
    tls_config: TlsConfig,
    auth_provider: Arc<dyn AuthProvider>,
    store: Arc<dyn MailboxStore>,
    delivery: Option<Arc<dyn EmailDeliveryClient>>,

    tls: bool,
    authenticated: bool,
    auth_user: Option<String>,
    mail_from: Option<String>,
    mail_from_local: bool,
    rcpt: Vec<String>,
    data: String,
}

impl SmtpSession {
    pub fn new(
        hostname: String,
        tls_config: TlsConfig,
        auth_provider: Arc<dyn AuthProvider>,
        store: Arc<dyn MailboxStore>,
        delivery: Option<Arc<dyn EmailDeliveryClient>>,
    ) -> Self {
        Self {
            hostname,
            tls_config,
            auth_provider,
            store,
            delivery,
            tls: false,
            authenticated: false,
            auth_user: None,
            mail_from: None,
            mail_from_local: false,
            rcpt: Vec::new(),
            data: String::new(),
        }
    }

    /// Handle the session, potentially upgrading to TLS mid-stream.
    pub async fn handle(mut self, stream: TcpStream) -> Result<()> {
        let mut stream = MailStream::Plain(stream);

        stream
            .write_all(format!("220 {} ESMTP Ready\r\n", self.hostname).as_bytes())
            .await?;

        loop {
            match self.process_commands(&mut stream).await? {
                SessionResult::Continue => continue,
                SessionResult::Quit => break,
            }
        }

        Ok(())
    }

    async fn process_commands(&mut self, stream: &mut MailStream) -> Result<SessionResult> {
        // The reader must be dropped to regain the stream for a STARTTLS
        // upgrade; &mut *stream reborrows so the stream stays reachable.
        let mut reader = BufReader::new(&mut *stream);
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                debug!("Client disconnected");
                return Ok(SessionResult::Quit);
            }

            let trimmed = line.trim_end_matches(['\r', '\n']).trim();
            debug!("Received: {}", trimmed);

            match SmtpCommand::parse(trimmed) {
                SmtpCommand::Helo(_) | SmtpCommand::Ehlo(_) => {
                    let mut response = format!("250-{}\r\n", self.hostname);
                    if !self.tls {
                        response.push_str("250-STARTTLS\r\n");
                    }
                    response.push_str("250-AUTH LOGIN PLAIN\r\n");
                    response.push_str("250 OK\r\n");
                    reader.write_all(response.as_bytes()).await?;
                }
                SmtpCommand::Starttls => {
                    if self.tls {
                        reader.write_all(b"503 TLS already active\r\n").await?;
                        continue;
                    }

                    reader.write_all(b"220 Ready to start TLS\r\n").await?;
                    reader.flush().await?;
                    drop(reader);

                    self.upgrade_to_tls(stream).await?;
                    return Ok(SessionResult::Continue);
                }
                SmtpCommand::Quit => {
                    reader.write_all(b"221 Bye\r\n").await?;
                    reader.flush().await?;
                    return Ok(SessionResult::Quit);
                }
                SmtpCommand::Auth(mechanism, initial) => match mechanism.as_str() {
                    "LOGIN" => self.handle_auth_login(&mut reader).await?,
                    "PLAIN" => self.handle_auth_plain(&mut reader, initial).await?,
                    _ => {
                        reader.write_all(b"502 Not implemented\r\n").await?;
                    }
                },
                SmtpCommand::MailFrom(address) => {
                    let local = self.auth_provider.has_user(&address);
                    if local && !self.authenticated {
                        warn!("Rejecting MAIL FROM local sender {} without auth", address);
                        reader.write_all(b"530 Authentication required\r\n").await?;
                        continue;
                    }

                    info!("MAIL FROM: {}", address);
                    self.mail_from = Some(address);
                    self.mail_from_local = local;
                    reader.write_all(b"250 OK\r\n").await?;
                }
                SmtpCommand::RcptTo(address) => {
                    if self.auth_provider.has_user(&address) {
                        info!("RCPT TO: {}", address);
                        self.rcpt.push(address);
                        reader.write_all(b"250 OK\r\n").await?;
                    } else if !self.authenticated || !self.mail_from_local {
                        warn!("Rejecting external recipient {} without auth", address);
                        reader.write_all(b"530 Authentication required\r\n").await?;
                    } else {
                        // Recorded for relay; the reply still reports the
                        // address as unknown locally.
                        info!("RCPT TO (relay): {}", address);
                        self.rcpt.push(address);
                        reader.write_all(b"550 5.1.1 User unknown\r\n").await?;
                    }
                }
                SmtpCommand::Data => {
                    reader
                        .write_all(b"354 End with <CRLF>.<CRLF>\r\n")
                        .await?;
                    self.receive_data(&mut reader).await?;
                }
                SmtpCommand::Unknown(cmd) => {
                    debug!("Unknown command: {}", cmd);
                    reader.write_all(b"502 Not implemented\r\n").await?;
                }
            }
        }
    }

    async fn upgrade_to_tls(&mut self, stream: &mut MailStream) -> Result<()> {
        let tcp = stream.take_plain().ok_or_else(|| {
            crate::error::MailError::SmtpProtocol(
                "STARTTLS on an already-encrypted stream".to_string(),
            )
        })?;

        let acceptor = self.tls_config.acceptor();
        let tls_stream = acceptor.accept(tcp).await.map_err(|e| {
            error!("TLS handshake failed: {}", e);
            crate::error::MailError::Tls(format!("TLS handshake failed: {}", e))
        })?;

        *stream = MailStream::ServerTls(Box::new(tls_stream));
        self.tls = true;
        info!("Connection upgraded to TLS");
        Ok(())
    }

    /// AUTH LOGIN: base64 prompts for username and password on separate lines.
    async fn handle_auth_login<S>(&mut self, reader: &mut BufReader<S>) -> Result<()>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        if !self.tls {
            reader.write_all(b"538 Encryption required\r\n").await?;
            return Ok(());
        }

        // 334 base64("Username:")
        reader.write_all(b"334 VXNlcm5hbWU6\r\n").await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let username = match decode_login_credential(line.trim()) {
            Some(username) => username,
            None => {
                reader.write_all(b"535 Auth failed\r\n").await?;
                return Ok(());
            }
        };

        if !self.auth_provider.has_user(&username) {
            warn!("AUTH LOGIN for unknown user {}", username);
            reader.write_all(b"535 Auth failed\r\n").await?;
            return Ok(());
        }
        self.auth_user = Some(username.clone());

        // 334 base64("Password:")
        reader.write_all(b"334 UGFzc3dvcmQ6\r\n").await?;

        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let password = decode_login_credential(line.trim()).unwrap_or_default();

        if self.auth_provider.validate(&username, &password) {
            self.authenticated = true;
            info!("Authentication successful for {}", username);
            reader.write_all(b"235 Auth OK\r\n").await?;
        } else {
            warn!("Authentication failed for {}", username);
            reader.write_all(b"535 Auth failed\r\n").await?;
        }

        Ok(())
    }

    /// AUTH PLAIN with inline base64 credentials.
    async fn handle_auth_plain<S>(
        &mut self,
        reader: &mut BufReader<S>,
        initial: Option<String>,
    ) -> Result<()>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        if !self.tls {
            reader.write_all(b"538 Encryption required\r\n").await?;
            return Ok(());
        }

        let credentials = initial.and_then(|payload| decode_plain_auth(&payload));
        match credentials {
            Some((_authzid, username, password))
                if self.auth_provider.validate(&username, &password) =>
            {
                self.authenticated = true;
                self.auth_user = Some(username.clone());
                info!("Authentication successful for {}", username);
                reader.write_all(b"235 Auth OK\r\n").await?;
            }
            _ => {
                warn!("AUTH PLAIN failed");
                reader.write_all(b"535 Auth failed\r\n").await?;
            }
        }

        Ok(())
    }

    /// Accumulate body lines until the lone-dot terminator, then store and
    /// relay.
    async fn receive_data<S>(&mut self, reader: &mut BufReader<S>) -> Result<()>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(crate::error::MailError::SmtpProtocol(
                    "Connection closed during DATA".to_string(),
                ));
            }

            let content = line.trim_end_matches(['\r', '\n']);
            if content == "." {
                info!("End of DATA, total size: {} bytes", self.data.len());
                break;
            }

            // Undo SMTP transparency stuffing.
            let content = if content.starts_with("..") {
                &content[1..]
            } else {
                content
            };
            self.data.push_str(content);
            self.data.push('\n');
        }

        let reply: &[u8] = match self.on_receive_email().await {
            Ok(()) => b"250 OK\r\n",
            Err(e) => {
                error!("Failed to handle received message: {}", e);
                b"451 Temporary failure\r\n"
            }
        };
        reader.write_all(reply).await?;

        // Reset the envelope so the session can carry another message.
        self.data.clear();
        self.mail_from = None;
        self.mail_from_local = false;
        self.rcpt.clear();

        Ok(())
    }

    /// Store for local recipients and relay for external ones.
    ///
    /// Relay happens only when the envelope sender is a known local user, the
    /// session is authenticated, and the authenticated identity matches the
    /// sender. Relay failures are logged and do not affect the SMTP reply.
    async fn on_receive_email(&self) -> Result<()> {
        let mail_from = self.mail_from.clone().unwrap_or_default();
        let from_local = self.auth_provider.has_user(&mail_from);
        let local_recipients = self.auth_provider.existing_users(&self.rcpt);
        let sender_authorized =
            self.authenticated && self.auth_user.as_deref() == Some(mail_from.as_str());

        if from_local && local_recipients.is_empty() && !sender_authorized {
            warn!(
                "Dropping message from {} with no local recipients and no matching auth",
                mail_from
            );
            return Ok(());
        }

        if !local_recipients.is_empty() {
            let stored = self.store.store(&mail_from, &self.rcpt, &self.data).await?;
            info!("Stored message from {} for {:?}", mail_from, stored);
        }

        if from_local && sender_authorized && local_recipients.len() < self.rcpt.len() {
            self.relay_external(&mail_from, &local_recipients).await;
        }

        Ok(())
    }

    async fn relay_external(&self, mail_from: &str, local_recipients: &[String]) {
        let delivery = match &self.delivery {
            Some(delivery) => delivery,
            None => {
                warn!("External recipients present but no delivery client configured");
                return;
            }
        };

        let locals: HashSet<&String> = local_recipients.iter().collect();
        let mut by_domain: HashMap<String, Vec<String>> = HashMap::new();
        for recipient in &self.rcpt {
            if locals.contains(recipient) {
                continue;
            }
            match recipient.split_once('@') {
                Some((_, domain)) => by_domain
                    .entry(domain.to_string())
                    .or_default()
                    .push(recipient.clone()),
                None => warn!("Cannot relay recipient without domain: {}", recipient),
            }
        }

        for (domain, group) in by_domain {
            // Split local-vs-external again so a racing user addition can
            // never turn a stored recipient into a relayed one.
            let still_local: HashSet<String> =
                self.auth_provider.existing_users(&group).into_iter().collect();
            let externals: Vec<String> = group
                .into_iter()
                .filter(|r| !still_local.contains(r))
                .collect();
            if externals.is_empty() {
                continue;
            }

            info!("Relaying to {} for {:?}", domain, externals);
            if !delivery
                .send_email(&domain, mail_from, &externals, &self.data)
                .await
            {
                error!("Relay to {} failed for {:?}", domain, externals);
            }
        }
    }
}
