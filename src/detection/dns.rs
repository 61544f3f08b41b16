//! Detection through a resolver that echoes the caller's address.
//!
//! OpenDNS answers `myip.opendns.com` with the address the query came from,
//! so asking one of its resolvers directly (bypassing the system resolver
//! and any cache) yields the host's public address.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::debug;

use super::AddressStrategy;
use crate::error::StrategyError;

const DNS_PORT: u16 = 53;

pub struct DnsStrategy {
    resolver: TokioAsyncResolver,
    query: String,
}

impl DnsStrategy {
    pub fn new(nameserver: IpAddr, query: impl Into<String>, timeout: Duration) -> Self {
        let servers = NameServerConfigGroup::from_ips_clear(&[nameserver], DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, vec![], servers);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        // retries are handled by the detection chain
        opts.attempts = 1;
        opts.cache_size = 0;

        let mut query = query.into();
        if !query.ends_with('.') {
            query.push('.');
        }

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            query,
        }
    }
}

#[async_trait]
impl AddressStrategy for DnsStrategy {
    fn name(&self) -> &str {
        "dns"
    }

    async fn lookup(&self) -> Result<String, StrategyError> {
        let lookup = self
            .resolver
            .lookup_ip(self.query.as_str())
            .await
            .map_err(|e| StrategyError::Lookup(e.to_string()))?;
        let addr = lookup
            .iter()
            .next()
            .ok_or_else(|| StrategyError::Lookup(format!("no records for {}", self.query)))?;
        debug!("Resolver answered {} for {}", addr, self.query);
        Ok(addr.to_string())
    }
}
