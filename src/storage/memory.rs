use crate::error::Result;
use crate::security::AuthProvider;
use crate::storage::{render_message, MailboxStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory mailbox store.
///
/// Messages live in a map from mailbox address to an ordered sequence of
/// bodies; the UID is the decimal insertion index. Intended for integration
/// tests and ephemeral deployments.
pub struct MemoryMailboxStore {
    auth: Arc<dyn AuthProvider>,
    mailboxes: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryMailboxStore {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            auth,
            mailboxes: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MailboxStore for MemoryMailboxStore {
    fn resolve_mailboxes(&self, recipients: &[String]) -> Vec<String> {
        self.auth.existing_users(recipients)
    }

    async fn store(&self, from: &str, to: &[String], body: &str) -> Result<Vec<String>> {
        let message = render_message(from, to, body);
        let mut stored = Vec::new();

        let mut mailboxes = self.mailboxes.lock().unwrap();
        for recipient in to {
            if !self.auth.has_user(recipient) {
                debug!("Skipping unknown recipient {}", recipient);
                continue;
            }
            mailboxes
                .entry(recipient.clone())
                .or_default()
                .push(message.clone());
            stored.push(recipient.clone());
        }

        Ok(stored)
    }

    async fn list_message_uids(&self, mailbox: &str) -> Result<Vec<String>> {
        let mailboxes = self.mailboxes.lock().unwrap();
        let count = mailboxes.get(mailbox).map(|m| m.len()).unwrap_or(0);
        Ok((0..count).map(|i| i.to_string()).collect())
    }

    async fn get_message(&self, mailbox: &str, uid: &str) -> Result<Option<String>> {
        let index: usize = match uid.parse() {
            Ok(i) => i,
            Err(_) => return Ok(None),
        };

        let mailboxes = self.mailboxes.lock().unwrap();
        Ok(mailboxes
            .get(mailbox)
            .and_then(|messages| messages.get(index))
            .cloned())
    }
}
