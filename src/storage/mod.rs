//! Mailbox storage
//!
//! Append-only per-mailbox message logs, the rendezvous between inbound SMTP
//! deposit and IMAP retrieval. Two backends:
//! - [`memory`]: map from mailbox to ordered bodies, UID = insertion index
//! - [`filesystem`]: one `.eml` file per message under a per-mailbox directory

pub mod address;
pub mod filesystem;
pub mod memory;

pub use address::{normalize_mailbox, MailboxKey};
pub use filesystem::FilesystemMailboxStore;
pub use memory::MemoryMailboxStore;

use crate::error::Result;
use async_trait::async_trait;

/// Durable append, enumeration, and retrieval of messages per mailbox.
///
/// UIDs are unique and monotonically non-decreasing within a mailbox, and
/// stable across process restarts for durable backends. Appends are
/// at-least-once; the store does not de-duplicate.
#[async_trait]
pub trait MailboxStore: Send + Sync {
    /// Filter `recipients` down to addresses with a local mailbox.
    fn resolve_mailboxes(&self, recipients: &[String]) -> Vec<String>;

    /// Append the message to every recipient with a local mailbox, prefixing
    /// the synthesized `From:`/`To:` headers. Returns the addresses that were
    /// stored; unknown recipients are silently skipped.
    async fn store(&self, from: &str, to: &[String], body: &str) -> Result<Vec<String>>;

    /// UIDs of the mailbox ordered ascending by append time. An unknown or
    /// empty mailbox yields an empty list, not an error.
    async fn list_message_uids(&self, mailbox: &str) -> Result<Vec<String>>;

    /// Number of stored messages, equal to the UID list length.
    async fn count_messages(&self, mailbox: &str) -> Result<usize> {
        Ok(self.list_message_uids(mailbox).await?.len())
    }

    /// Retrieve a stored message by UID, or `None` if no such UID.
    async fn get_message(&self, mailbox: &str, uid: &str) -> Result<Option<String>>;
}

/// Body written to the underlying medium: synthesized envelope headers
/// followed by the message as received.
pub(crate) fn render_message(from: &str, to: &[String], body: &str) -> String {
    format!("From: {}\nTo: {}\n{}", from, to.join(", "), body)
}
