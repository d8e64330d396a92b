//! IMAP server implementation
//!
//! A small IMAP4rev1 subset exposing the mailbox store: CAPABILITY, STARTTLS,
//! LOGIN, LIST, SELECT, UID SEARCH, UID FETCH, LOGOUT.

pub mod commands;
pub mod server;
pub mod session;

pub use commands::ImapCommand;
pub use server::ImapServer;
pub use session::ImapSession;
