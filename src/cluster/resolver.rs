//! Best-effort reverse resolution of node addresses to hostnames.

use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;

use super::types::{NodeRecord, Topology};

/// Turns an IP literal into a hostname, if one can be found.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Returns `None` when the address has no name or the lookup failed.
    async fn resolve(&self, ip: &str) -> Option<String>;
}

/// Resolver that never looks anything up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralResolver;

#[async_trait]
impl HostResolver for LiteralResolver {
    async fn resolve(&self, _ip: &str) -> Option<String> {
        None
    }
}

/// PTR lookups through the system resolver configuration.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf() -> Result<Self, trust_dns_resolver::error::ResolveError> {
        Ok(Self {
            resolver: TokioAsyncResolver::tokio_from_system_conf()?,
        })
    }
}

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, ip: &str) -> Option<String> {
        let addr: IpAddr = match ip.parse() {
            Ok(addr) => addr,
            Err(e) => {
                debug!(ip = %ip, error = %e, "Not an IP literal, skipping reverse lookup");
                return None;
            }
        };

        match self.resolver.reverse_lookup(addr).await {
            Ok(names) => names
                .iter()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .find(|name| !name.is_empty()),
            Err(e) => {
                debug!(ip = %ip, error = %e, "Reverse lookup failed");
                None
            }
        }
    }
}

impl Topology {
    /// Return a copy of this topology with each node's `address` resolved.
    ///
    /// Nodes whose lookup fails keep their IP literal. Lookups run one
    /// after another in line order.
    pub async fn resolve_hosts<R: HostResolver + ?Sized>(self, resolver: &R) -> Topology {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            let address = resolver.resolve(&node.ip).await.unwrap_or_else(|| node.ip.clone());
            nodes.push(NodeRecord { address, ..node });
        }
        Topology { nodes }
    }
}
