//! Hostname resolution used by the safety gate

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;
use tracing::{debug, warn};

/// An address family, which corresponds to a DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Family {
    /// A records
    #[strum(serialize = "A")]
    V4,
    /// AAAA records
    #[strum(serialize = "AAAA")]
    V6,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no {family} records for {host}")]
    NoRecords { host: String, family: Family },

    #[error("{family} lookup for {host} failed: {message}")]
    LookupFailed {
        host: String,
        family: Family,
        message: String,
    },
}

/// A source of DNS answers.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Returns the addresses of `host` for a single address family. An empty
    /// answer should be reported as [`ResolveError::NoRecords`].
    async fn lookup(&self, host: &str, family: Family) -> Result<Vec<IpAddr>, ResolveError>;
}

/// Resolver backed by the system DNS configuration.
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
}

impl HickoryResolver {
    /// Reads the system resolver configuration, falling back to the library's
    /// default upstreams when it cannot be read (e.g., in minimal containers).
    pub fn from_system_conf() -> HickoryResolver {
        let inner = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(err) => {
                warn!("failed to read system resolver configuration, using defaults: {}", err);

                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };

        HickoryResolver { inner }
    }
}

#[async_trait]
impl Resolve for HickoryResolver {
    async fn lookup(&self, host: &str, family: Family) -> Result<Vec<IpAddr>, ResolveError> {
        let failed = |err: hickory_resolver::error::ResolveError| ResolveError::LookupFailed {
            host: host.to_string(),
            family,
            message: err.to_string(),
        };

        let addrs: Vec<IpAddr> = match family {
            Family::V4 => self
                .inner
                .ipv4_lookup(host)
                .await
                .map_err(failed)?
                .iter()
                .map(|a| IpAddr::V4(a.0))
                .collect(),
            Family::V6 => self
                .inner
                .ipv6_lookup(host)
                .await
                .map_err(failed)?
                .iter()
                .map(|aaaa| IpAddr::V6(aaaa.0))
                .collect(),
        };

        debug!("{} {} -> {:?}", family, host, addrs);

        if addrs.is_empty() {
            return Err(ResolveError::NoRecords {
                host: host.to_string(),
                family,
            });
        }

        Ok(addrs)
    }
}

/// A fixed table of answers. Hosts that are not in the table have no records.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> StaticResolver {
        StaticResolver::default()
    }

    pub fn with_host<I: IntoIterator<Item = IpAddr>>(mut self, host: &str, addrs: I) -> Self {
        self.hosts
            .entry(host.to_ascii_lowercase())
            .or_default()
            .extend(addrs);

        self
    }
}

#[async_trait]
impl Resolve for StaticResolver {
    async fn lookup(&self, host: &str, family: Family) -> Result<Vec<IpAddr>, ResolveError> {
        let addrs: Vec<IpAddr> = self
            .hosts
            .get(&host.to_ascii_lowercase())
            .map(|addrs| {
                addrs
                    .iter()
                    .copied()
                    .filter(|ip| match family {
                        Family::V4 => ip.is_ipv4(),
                        Family::V6 => ip.is_ipv6(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if addrs.is_empty() {
            Err(ResolveError::NoRecords {
                host: host.to_string(),
                family,
            })
        } else {
            Ok(addrs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_splits_families() {
        let resolver = StaticResolver::new().with_host(
            "Dual.Example",
            ["93.184.216.34".parse().unwrap(), "2606:2800:220:1::1".parse().unwrap()],
        );

        let v4 = resolver.lookup("dual.example", Family::V4).await.unwrap();
        assert_eq!(v4, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);

        let v6 = resolver.lookup("dual.example", Family::V6).await.unwrap();
        assert_eq!(v6, vec!["2606:2800:220:1::1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_static_resolver_unknown_host() {
        let resolver = StaticResolver::new();

        let err = resolver.lookup("missing.example", Family::V6).await;

        assert!(matches!(
            err,
            Err(ResolveError::NoRecords {
                family: Family::V6,
                ..
            })
        ));
    }
}
