//! IMAP command parsing
//!
//! Each client line is `<tag> <command> [args…]`; commands are matched
//! case-insensitively. Anything outside the supported subset surfaces as
//! `Unknown` and is answered with `BAD`.

/// IMAP commands handled by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ImapCommand {
    Capability,
    Starttls,
    Login { username: String, password: String },
    List,
    Select,
    UidSearch,
    UidFetch,
    Logout,
    Unknown(String),
}

/// Parse a command line into `(tag, command)`. `None` for a blank line.
pub fn parse(line: &str) -> Option<(String, ImapCommand)> {
    let mut tokens = line.split_whitespace();
    let tag = tokens.next()?.to_string();
    let verb = tokens.next().unwrap_or("").to_uppercase();

    let command = match verb.as_str() {
        "CAPABILITY" => ImapCommand::Capability,
        "STARTTLS" => ImapCommand::Starttls,
        "LOGIN" => {
            let username = tokens.next().map(unquote).unwrap_or_default();
            let password = tokens.next().map(unquote).unwrap_or_default();
            ImapCommand::Login { username, password }
        }
        "LIST" => ImapCommand::List,
        "SELECT" => ImapCommand::Select,
        "UID" => match tokens.next().unwrap_or("").to_uppercase().as_str() {
            "SEARCH" => ImapCommand::UidSearch,
            "FETCH" => ImapCommand::UidFetch,
            other => ImapCommand::Unknown(format!("UID {}", other)),
        },
        "LOGOUT" => ImapCommand::Logout,
        other => ImapCommand::Unknown(other.to_string()),
    };

    Some((tag, command))
}

fn unquote(token: &str) -> String {
    token.trim_matches('"').to_string()
}
