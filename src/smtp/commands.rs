//! SMTP command parsing
//!
//! Parses inbound command lines into [`SmtpCommand`]. Lines that do not match
//! a supported command surface as `Unknown` so the session can answer
//! `502 Not implemented` without special cases.

/// SMTP protocol commands handled by the inbound session.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Quit,
    /// STARTTLS command to upgrade connection to TLS
    Starttls,
    /// AUTH command with mechanism and optional initial response
    Auth(String, Option<String>),
    Unknown(String),
}

impl SmtpCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        let mut parts = line.splitn(2, ' ');
        let command = parts.next().unwrap_or("").to_uppercase();
        let args = parts.next().map(|s| s.trim()).unwrap_or("");

        match command.as_str() {
            "HELO" => SmtpCommand::Helo(args.to_string()),
            "EHLO" => SmtpCommand::Ehlo(args.to_string()),
            "MAIL" => match parse_path(args, "FROM:") {
                Some(from) => SmtpCommand::MailFrom(from),
                None => SmtpCommand::Unknown(line.to_string()),
            },
            "RCPT" => match parse_path(args, "TO:") {
                Some(to) => SmtpCommand::RcptTo(to),
                None => SmtpCommand::Unknown(line.to_string()),
            },
            "DATA" => SmtpCommand::Data,
            "QUIT" => SmtpCommand::Quit,
            "STARTTLS" => SmtpCommand::Starttls,
            "AUTH" => {
                let mut auth_parts = args.splitn(2, ' ');
                let mechanism = auth_parts.next().unwrap_or("").to_uppercase();
                let initial_response = auth_parts.next().map(|s| s.to_string());
                SmtpCommand::Auth(mechanism, initial_response)
            }
            _ => SmtpCommand::Unknown(line.to_string()),
        }
    }
}

/// Extract the address from `FROM:<a@b>` / `TO:<a@b>` arguments.
fn parse_path(args: &str, keyword: &str) -> Option<String> {
    if !args.to_uppercase().starts_with(keyword) {
        return None;
    }

    let rest = args[keyword.len()..].trim();
    let address = match (rest.find('<'), rest.rfind('>')) {
        (Some(open), Some(close)) if open < close => &rest[open + 1..close],
        _ => rest,
    };

    Some(address.to_string())
}
