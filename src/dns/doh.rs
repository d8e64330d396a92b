//! DNS-over-HTTPS MX resolution
//!
//! Queries the configured upstream (e.g. `https://cloudflare-dns.com/dns-query`)
//! for MX records using the JSON wire format, then resolves A/AAAA for each
//! exchange hostname. Malformed answer records are skipped; a hostname that
//! fails to resolve is logged and skipped without aborting the whole result.

use crate::dns::{MxRecord, MxResolver};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    data: String,
}

pub struct DohResolver {
    client: Client,
    upstream: String,
}

impl DohResolver {
    pub fn new(upstream: String) -> Self {
        Self {
            client: Client::new(),
            upstream,
        }
    }

    async fn query_mx(&self, domain: &str) -> Result<Vec<MxRecord>> {
        let response: DohResponse = self
            .client
            .get(self.upstream.as_str())
            .query(&[("name", domain), ("type", "MX")])
            .header("accept", "application/dns-json")
            .send()
            .await?
            .json()
            .await?;

        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let mut records = Vec::new();

        for answer in &response.answer {
            // MX RR data is "<preference> <exchange>".
            let mut tokens = answer.data.split_whitespace();
            let (preference, exchange) = match (tokens.next(), tokens.next()) {
                (Some(pref), Some(host)) => (pref, host),
                _ => {
                    debug!("Skipping malformed MX answer: {:?}", answer.data);
                    continue;
                }
            };

            let preference: u16 = match preference.parse() {
                Ok(p) => p,
                Err(_) => {
                    debug!("Skipping MX answer with bad preference: {:?}", answer.data);
                    continue;
                }
            };

            let exchange = exchange.trim_end_matches('.');
            if exchange.is_empty() {
                debug!("Skipping MX answer with empty exchange: {:?}", answer.data);
                continue;
            }

            match resolver.lookup_ip(exchange).await {
                Ok(lookup) => {
                    for ip in lookup.iter() {
                        records.push(MxRecord {
                            preference,
                            address: ip,
                        });
                    }
                }
                Err(e) => {
                    warn!("Failed to resolve MX target {}: {}", exchange, e);
                }
            }
        }

        records.sort_by_key(|r| r.preference);
        Ok(records)
    }
}

#[async_trait]
impl MxResolver for DohResolver {
    async fn resolve_mx(&self, domain: &str) -> Vec<MxRecord> {
        match self.query_mx(domain).await {
            Ok(records) => {
                debug!("Resolved {} MX address(es) for {}", records.len(), domain);
                records
            }
            Err(e) => {
                error!("DoH MX lookup failed for {}: {}", domain, e);
                Vec::new()
            }
        }
    }
}
