//! IMAP session
//!
//! Per-connection command loop over a small IMAP4rev1 subset: STARTTLS,
//! credential login, single-INBOX selection, and message enumeration and
//! fetch. Messages are numbered positionally (1-based) in the replies.

use crate::error::Result;
use crate::imap::commands::{self, ImapCommand};
use crate::security::{AuthProvider, TlsConfig};
use crate::storage::MailboxStore;
use crate::stream::MailStream;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

enum SessionResult {
    Continue, // restart processing (after STARTTLS upgrade)
    Quit,
}

pub struct ImapSession {
    hostname: String,
    tls_config: TlsConfig,
    auth_provider: Arc<dyn AuthProvider>,
    store: Arc<dyn MailboxStore>,

    tls: bool,
    authenticated: bool,
    user: Option<String>,
}

impl ImapSession {
    pub fn new(
        hostname: String,
        tls_config: TlsConfig,
        auth_provider: Arc<dyn AuthProvider>,
        store: Arc<dyn MailboxStore>,
    ) -> Self {
        Self {
            hostname,
            tls_config,
            auth_provider,
            store,
            tls: false,
            authenticated: false,
            user: None,
        }
    }

    /// Handle the session. With `implicit_tls` the TLS handshake happens
    /// before the greeting (the IMAPS listener); otherwise the connection
    /// starts in cleartext and may upgrade via STARTTLS.
    pub async fn handle(mut self, stream: TcpStream, implicit_tls: bool) -> Result<()> {
        let mut stream = if implicit_tls {
            let acceptor = self.tls_config.acceptor();
            let tls_stream = acceptor.accept(stream).await.map_err(|e| {
                error!("Implicit TLS handshake failed: {}", e);
                crate::error::MailError::Tls(format!("TLS handshake failed: {}", e))
            })?;
            self.tls = true;
            MailStream::ServerTls(Box::new(tls_stream))
        } else {
            MailStream::Plain(stream)
        };

        stream
            .write_all(format!("* OK [{}] IMAP4rev1 Ready\r\n", self.hostname).as_bytes())
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
        let mut reader = BufReader::new(&mut *stream);
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                debug!("Client disconnected");
                return Ok(SessionResult::Quit);
            }

            let trimmed = line.trim();
            debug!("Received: {}", trimmed);

            let (tag, command) = match commands::parse(trimmed) {
                Some(parsed) => parsed,
                None => {
                    reader.write_all(b"* BAD Unsupported command\r\n").await?;
                    continue;
                }
            };

            match command {
                ImapCommand::Capability => {
                    let response = format!(
                        "* CAPABILITY IMAP4rev1 UIDPLUS STARTTLS\r\n{} OK CAPABILITY completed\r\n",
                        tag
                    );
                    reader.write_all(response.as_bytes()).await?;
                }
                ImapCommand::Starttls => {
                    if self.tls {
                        let response = format!("{} BAD TLS already active\r\n", tag);
                        reader.write_all(response.as_bytes()).await?;
                        continue;
                    }

                    let response = format!("{} OK Begin TLS negotiation\r\n", tag);
                    reader.write_all(response.as_bytes()).await?;
                    reader.flush().await?;
                    drop(reader);

                    self.upgrade_to_tls(stream).await?;
                    return Ok(SessionResult::Continue);
                }
                ImapCommand::Login { username, password } => {
                    if !self.tls {
                        let response =
                            format!("{} NO STARTTLS required before login\r\n", tag);
                        reader.write_all(response.as_bytes()).await?;
                        continue;
                    }

                    if self.auth_provider.validate(&username, &password) {
                        info!("LOGIN successful for {}", username);
                        self.authenticated = true;
                        self.user = Some(username);
                        let response = format!("{} OK LOGIN completed\r\n", tag);
                        reader.write_all(response.as_bytes()).await?;
                    } else {
                        warn!("LOGIN failed for {}", username);
                        let response = format!("{} NO LOGIN failed\r\n", tag);
                        reader.write_all(response.as_bytes()).await?;
                    }
                }
                ImapCommand::List => {
                    let response = format!(
                        "* LIST (\\HasNoChildren) \"/\" INBOX\r\n{} OK LIST completed\r\n",
                        tag
                    );
                    reader.write_all(response.as_bytes()).await?;
                }
                ImapCommand::Select => {
                    let user = match self.require_auth(&mut reader, &tag).await? {
                        Some(user) => user,
                        None => continue,
                    };

                    let count = self.store.count_messages(&user).await?;
                    let response = format!(
                        "* {} EXISTS\r\n* FLAGS (\\Seen)\r\n{} OK [READ-WRITE] SELECT completed\r\n",
                        count, tag
                    );
                    reader.write_all(response.as_bytes()).await?;
                }
                ImapCommand::UidSearch => {
                    let user = match self.require_auth(&mut reader, &tag).await? {
                        Some(user) => user,
                        None => continue,
                    };

                    let uids = self.store.list_message_uids(&user).await?;
                    let mut response = String::from("* SEARCH");
                    for i in 1..=uids.len() {
                        response.push_str(&format!(" {}", i));
                    }
                    response.push_str(&format!("\r\n{} OK SEARCH completed\r\n", tag));
                    reader.write_all(response.as_bytes()).await?;
                }
                ImapCommand::UidFetch => {
                    let user = match self.require_auth(&mut reader, &tag).await? {
                        Some(user) => user,
                        None => continue,
                    };

                    let uids = self.store.list_message_uids(&user).await?;
                    for (index, uid) in uids.iter().enumerate() {
                        let body = match self.store.get_message(&user, uid).await? {
                            Some(body) => body,
                            None => continue,
                        };

                        let seq = index + 1;
                        let header = format!(
                            "* {} FETCH (UID {} RFC822 {{{}}}\r\n",
                            seq,
                            seq,
                            body.len()
                        );
                        reader.write_all(header.as_bytes()).await?;
                        reader.write_all(body.as_bytes()).await?;
                        reader.write_all(b")\r\n").await?;
                    }
                    let response = format!("{} OK FETCH completed\r\n", tag);
                    reader.write_all(response.as_bytes()).await?;
                }
                ImapCommand::Logout => {
                    let response =
                        format!("* BYE Logging out\r\n{} OK LOGOUT completed\r\n", tag);
                    reader.write_all(response.as_bytes()).await?;
                    reader.flush().await?;
                    info!("Session logged out");
                    return Ok(SessionResult::Quit);
                }
                ImapCommand::Unknown(cmd) => {
                    debug!("Unsupported command: {}", cmd);
                    let response = format!("{} BAD Unsupported command\r\n", tag);
                    reader.write_all(response.as_bytes()).await?;
                }
            }
        }
    }

    async fn require_auth<S>(
        &self,
        reader: &mut BufReader<S>,
        tag: &str,
    ) -> Result<Option<String>>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        if self.authenticated {
            if let Some(user) = &self.user {
                return Ok(Some(user.clone()));
            }
        }

        let response = format!(
            "{} NO AUTHENTICATIONFAILED Authentication required\r\n",
            tag
        );
        reader.write_all(response.as_bytes()).await?;
        Ok(None)
    }

    async fn upgrade_to_tls(&mut self, stream: &mut MailStream) -> Result<()> {
        let tcp = stream.take_plain().ok_or_else(|| {
            crate::error::MailError::ImapProtocol(
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
}
