use crate::error::{MailError, Result};
use crate::security::AuthProvider;
use crate::storage::{normalize_mailbox, render_message, MailboxStore};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::info;

/// Process-wide append counter; the low three digits disambiguate appends
/// that land in the same millisecond.
static APPEND_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem mailbox store.
///
/// Rooted at a pre-existing directory. For mailbox `u@d` messages are written
/// to `<root>/<norm(d)>/<norm(u)>/<uid>.eml`, where the UID is the
/// millisecond timestamp concatenated with a 3-digit sequence number. The UID
/// doubles as the filename stem, so it is stable across restarts.
pub struct FilesystemMailboxStore {
    root: PathBuf,
    auth: Arc<dyn AuthProvider>,
}

impl FilesystemMailboxStore {
    pub fn new(root: impl Into<PathBuf>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            root: root.into(),
            auth,
        }
    }

    /// Storage directory for a mailbox address.
    pub fn mailbox_dir(&self, mailbox: &str) -> PathBuf {
        let key = normalize_mailbox(mailbox);
        match key.domain {
            Some(domain) => self.root.join(domain).join(key.user),
            None => self.root.join(key.user),
        }
    }

    fn next_uid() -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let seq = APPEND_SEQ.fetch_add(1, Ordering::Relaxed) % 1000;
        format!("{}{:03}", millis, seq)
    }
}

#[async_trait]
impl MailboxStore for FilesystemMailboxStore {
    fn resolve_mailboxes(&self, recipients: &[String]) -> Vec<String> {
        self.auth.existing_users(recipients)
    }

    async fn store(&self, from: &str, to: &[String], body: &str) -> Result<Vec<String>> {
        let message = render_message(from, to, body);
        let mut stored = Vec::new();

        for recipient in to {
            if !self.auth.has_user(recipient) {
                continue;
            }

            let dir = self.mailbox_dir(recipient);
            fs::create_dir_all(&dir).await.map_err(|e| {
                MailError::Storage(format!("Failed to create directory {:?}: {}", dir, e))
            })?;

            let uid = Self::next_uid();
            let path = dir.join(format!("{}.eml", uid));
            fs::write(&path, &message).await.map_err(|e| {
                MailError::Storage(format!("Failed to write {:?}: {}", path, e))
            })?;

            info!("Stored email for {} as {}", recipient, path.display());
            stored.push(recipient.clone());
        }

        Ok(stored)
    }

    async fn list_message_uids(&self, mailbox: &str) -> Result<Vec<String>> {
        let dir = self.mailbox_dir(mailbox);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };

        let mut uids: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("eml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                uids.push(stem.to_string());
            }
        }

        // A stem that fails to parse sorts as 0.
        uids.sort_by_key(|uid| uid.parse::<u128>().unwrap_or(0));
        Ok(uids)
    }

    async fn get_message(&self, mailbox: &str, uid: &str) -> Result<Option<String>> {
        let path = self.mailbox_dir(mailbox).join(format!("{}.eml", uid));

        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MailError::Storage(format!(
                "Failed to read {:?}: {}",
                path, e
            ))),
        }
    }
}
