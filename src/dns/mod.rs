//! MX resolution for outbound delivery
//!
//! Two resolvers:
//! - [`doh`]: MX records fetched over DNS-over-HTTPS, then A/AAAA of each
//!   exchange hostname
//! - [`simple`]: A/AAAA of the domain itself at preference 0, the fallback
//!   when no DoH upstream is configured
//!
//! Resolution failure yields an empty list; callers treat empty as
//! undeliverable.

pub mod doh;
pub mod simple;

pub use doh::DohResolver;
pub use simple::SimpleResolver;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::net::IpAddr;

/// One reachable mail exchanger address with its routing preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MxRecord {
    pub preference: u16,
    pub address: IpAddr,
}

#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Resolve the mail exchangers for `domain`, sorted ascending by
    /// preference. Empty on failure.
    async fn resolve_mx(&self, domain: &str) -> Vec<MxRecord>;
}

/// Choose the delivery target: lowest preference wins, ties broken uniformly
/// at random.
pub fn pick_mx(records: &[MxRecord]) -> Option<MxRecord> {
    let best = records.iter().map(|r| r.preference).min()?;
    let tied: Vec<&MxRecord> = records.iter().filter(|r| r.preference == best).collect();
    tied.choose(&mut rand::thread_rng()).map(|r| **r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(preference: u16, last_octet: u8) -> MxRecord {
        MxRecord {
            preference,
            address: IpAddr::from([127, 0, 0, last_octet]),
        }
    }

    #[test]
    fn test_pick_mx_prefers_lowest() {
        let records = vec![record(20, 1), record(10, 2), record(30, 3)];
        let picked = pick_mx(&records).unwrap();
        assert_eq!(picked.preference, 10);
    }

    #[test]
    fn test_pick_mx_uniform_over_ties() {
        let records = vec![record(10, 1), record(10, 2), record(20, 3)];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let picked = pick_mx(&records).unwrap();
            assert_eq!(picked.preference, 10);
            seen.insert(picked.address);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_pick_mx_empty() {
        assert!(pick_mx(&[]).is_none());
    }
}
