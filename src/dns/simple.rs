use crate::dns::{MxRecord, MxResolver};
use async_trait::async_trait;
use tracing::warn;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Fallback resolver: A/AAAA of the domain itself, all at preference 0.
pub struct SimpleResolver;

#[async_trait]
impl MxResolver for SimpleResolver {
    async fn resolve_mx(&self, domain: &str) -> Vec<MxRecord> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

        match resolver.lookup_ip(domain).await {
            Ok(lookup) => lookup
                .iter()
                .map(|ip| MxRecord {
                    preference: 0,
                    address: ip,
                })
                .collect(),
            Err(e) => {
                warn!("A/AAAA lookup failed for {}: {}", domain, e);
                Vec::new()
            }
        }
    }
}
