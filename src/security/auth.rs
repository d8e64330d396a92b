//! Authentication provider
//!
//! Membership and credential checks for mailbox addresses. The SMTP session
//! consults it during AUTH and to decide which recipients are local; the IMAP
//! session consults it at LOGIN.
//!
//! # Supported SMTP mechanisms
//! - PLAIN (RFC 4616)
//! - LOGIN (common but not standardized)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::HashMap;

/// Set membership and credential validation over mailbox addresses.
///
/// Unknown addresses yield `false`; no errors are surfaced.
pub trait AuthProvider: Send + Sync {
    /// Membership test for a mailbox address.
    fn has_user(&self, address: &str) -> bool;

    /// Credential check.
    fn validate(&self, address: &str, secret: &str) -> bool;

    /// Filter retaining known addresses, order-preserving.
    fn existing_users(&self, addresses: &[String]) -> Vec<String> {
        addresses
            .iter()
            .filter(|a| self.has_user(a))
            .cloned()
            .collect()
    }
}

/// In-memory `(address, secret)` table.
pub struct MemoryAuthProvider {
    users: HashMap<String, String>,
}

impl MemoryAuthProvider {
    pub fn new(users: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

impl AuthProvider for MemoryAuthProvider {
    fn has_user(&self, address: &str) -> bool {
        self.users.contains_key(address)
    }

    fn validate(&self, address: &str, secret: &str) -> bool {
        self.users.get(address).map(|s| s == secret).unwrap_or(false)
    }
}

/// Decode a single base64 credential line (AUTH LOGIN continuation).
pub fn decode_login_credential(line: &str) -> Option<String> {
    let bytes = BASE64.decode(line.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

/// Decode an AUTH PLAIN payload into `(authzid, username, password)`.
///
/// The payload is base64 over `authzid NUL authcid NUL password`.
pub fn decode_plain_auth(data: &str) -> Option<(String, String, String)> {
    let decoded = BASE64.decode(data.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    let mut parts = decoded.split('\0');
    let authzid = parts.next()?.to_string();
    let username = parts.next()?.to_string();
    let password = parts.next()?.to_string();

    Some((authzid, username, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> MemoryAuthProvider {
        MemoryAuthProvider::new([
            ("alice@example.com".to_string(), "pass123".to_string()),
            ("bob@example.com".to_string(), "hunter2".to_string()),
        ])
    }

    #[test]
    fn test_has_user() {
        let auth = provider();
        assert!(auth.has_user("alice@example.com"));
        assert!(!auth.has_user("mallory@example.com"));
    }

    #[test]
    fn test_validate() {
        let auth = provider();
        assert!(auth.validate("alice@example.com", "pass123"));
        assert!(!auth.validate("alice@example.com", "wrong"));
        assert!(!auth.validate("mallory@example.com", "pass123"));
    }

    #[test]
    fn test_existing_users_preserves_order() {
        let auth = provider();
        let filtered = auth.existing_users(&[
            "bob@example.com".to_string(),
            "mallory@example.com".to_string(),
            "alice@example.com".to_string(),
        ]);
        assert_eq!(filtered, vec!["bob@example.com", "alice@example.com"]);
    }

    #[test]
    fn test_decode_plain_auth() {
        // base64("\0alice@example.com\0pass123")
        let payload = BASE64.encode("\0alice@example.com\0pass123");
        let (authzid, user, pass) = decode_plain_auth(&payload).unwrap();
        assert_eq!(authzid, "");
        assert_eq!(user, "alice@example.com");
        assert_eq!(pass, "pass123");
    }

    #[test]
    fn test_decode_plain_auth_malformed() {
        assert!(decode_plain_auth("not base64!!!").is_none());
        let no_nuls = BASE64.encode("alice");
        assert!(decode_plain_auth(&no_nuls).is_none());
    }

    #[test]
    fn test_decode_login_credential() {
        let encoded = BASE64.encode("alice@example.com");
        assert_eq!(
            decode_login_credential(&encoded).unwrap(),
            "alice@example.com"
        );
        assert!(decode_login_credential("%%%").is_none());
    }
}
