//! Mailbox address normalization
//!
//! Derives the on-disk mailbox key for an address. The normalization is lossy
//! and deterministic: two addresses with the same key share the same storage
//! directory.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalized storage key for a mailbox address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxKey {
    pub user: String,
    pub domain: Option<String>,
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn strip_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Derive the normalized mailbox key for `address`.
///
/// Local part: diacritics stripped, lowercased, trimmed, everything after `+`
/// discarded, dots removed, any remaining non-word character replaced with
/// `_`. Domain: lowercased, non-word characters other than `.` replaced with
/// `_`, leading dots trimmed.
pub fn normalize_mailbox(address: &str) -> MailboxKey {
    let (local, domain) = match address.split_once('@') {
        Some((local, domain)) => (local, Some(domain)),
        None => (address, None),
    };

    let local = strip_diacritics(local).to_lowercase();
    let local = local.trim();
    let local = local.split('+').next().unwrap_or("");
    let user: String = local
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if is_word(c) { c } else { '_' })
        .collect();

    let domain = domain.map(|d| {
        let d = strip_diacritics(d).to_lowercase();
        let d: String = d
            .trim()
            .chars()
            .map(|c| if is_word(c) || c == '.' { c } else { '_' })
            .collect();
        d.trim_start_matches('.').to_string()
    });

    MailboxKey { user, domain }
}
