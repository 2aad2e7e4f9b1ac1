//! SSRF protection: decides whether a URL may be contacted.
//!
//! A URL passes the gate when:
//! 1. it parses, has a host, and uses `https` (or `http` when the policy
//!    allows insecure schemes),
//! 2. it carries no `user:password@` credentials,
//! 3. its raw authority contains no control characters, and
//! 4. at least one address the host resolves to (A and AAAA) lies outside the
//!    loopback, private and link-local ranges.
//!
//! Only the addresses that passed are handed back; the fetcher pins its
//! connection to them, so a later DNS answer cannot redirect the request.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use url::{Host, Url};

use super::resolver::{Family, Resolve, ResolveError};

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("malformed url: {0}")]
    Malformed(#[from] url::ParseError),

    #[error("url has no host")]
    MissingHost,

    #[error("scheme \"{0}\" is not allowed, only http(s) can be fetched")]
    UnsupportedScheme(String),

    #[error("plain http is only allowed in development mode")]
    InsecureScheme,

    #[error("urls with embedded credentials are not allowed")]
    EmbeddedCredentials,

    #[error("hostname contains control characters")]
    ControlCharacters,

    #[error("{host} only resolves to blocked addresses ({})", format_addrs(.addrs))]
    Blocked { host: String, addrs: Vec<IpAddr> },

    #[error("no dns records for {0}")]
    NoDnsRecords(String),
}

fn format_addrs(addrs: &[IpAddr]) -> String {
    addrs
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Relaxations of the gate. Both are meant for local development only and are
/// off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafetyPolicy {
    /// Permit `http://` URLs.
    pub allow_insecure_scheme: bool,
    /// Treat loopback addresses as public. Private and link-local ranges stay
    /// blocked regardless.
    pub allow_loopback: bool,
}

/// A URL that passed the gate, together with the addresses that may be used to
/// reach it.
#[derive(Debug, Clone)]
pub struct ValidatedUrl {
    pub url: Url,
    pub resolved_ips: Vec<IpAddr>,
}

/// Returns true if `ip` is loopback, private, link-local (which includes the
/// cloud metadata address) or unspecified. IPv4-mapped IPv6 addresses are
/// judged by their IPv4 form.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_blocked_v4(v4),
            None => is_blocked_v6(v6),
        },
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        // 0.0.0.0/8
        || ip.octets()[0] == 0
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];

    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7, unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10, link local
        || (first & 0xffc0) == 0xfe80
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

// The url crate silently drops tabs and newlines while parsing, so control
// characters have to be looked for in the raw text.
fn raw_authority(raw: &str) -> &str {
    let rest = match raw.find("://") {
        Some(i) => &raw[i + 3..],
        None => raw,
    };

    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());

    &rest[..end]
}

#[derive(Clone)]
pub struct SafetyGate {
    policy: SafetyPolicy,
    resolver: Arc<dyn Resolve>,
}

impl SafetyGate {
    pub fn new(policy: SafetyPolicy, resolver: Arc<dyn Resolve>) -> SafetyGate {
        SafetyGate { policy, resolver }
    }

    pub fn policy(&self) -> SafetyPolicy {
        self.policy
    }

    /// Validates a URL supplied as text.
    pub async fn validate(&self, raw: &str) -> Result<ValidatedUrl, SafetyError> {
        if raw_authority(raw).chars().any(char::is_control) {
            return Err(SafetyError::ControlCharacters);
        }

        let url = Url::parse(raw)?;

        self.check(&url).await
    }

    /// Validates an already parsed URL, e.g. a redirect target.
    pub async fn check(&self, url: &Url) -> Result<ValidatedUrl, SafetyError> {
        match url.scheme() {
            "https" => {}
            "http" if self.policy.allow_insecure_scheme => {}
            "http" => return Err(SafetyError::InsecureScheme),
            scheme => return Err(SafetyError::UnsupportedScheme(scheme.to_string())),
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(SafetyError::EmbeddedCredentials);
        }

        let host = url.host().ok_or(SafetyError::MissingHost)?;

        let resolved_ips = match host {
            Host::Ipv4(ip) => self.filter_blocked(&ip.to_string(), vec![IpAddr::V4(ip)])?,
            Host::Ipv6(ip) => self.filter_blocked(&ip.to_string(), vec![IpAddr::V6(ip)])?,
            Host::Domain(name) => {
                if name.chars().any(char::is_control) {
                    return Err(SafetyError::ControlCharacters);
                }

                let addrs = self.resolve(name).await?;

                self.filter_blocked(name, addrs)?
            }
        };

        Ok(ValidatedUrl {
            url: url.clone(),
            resolved_ips,
        })
    }

    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, SafetyError> {
        let (v4, v6) = tokio::join!(
            self.resolver.lookup(host, Family::V4),
            self.resolver.lookup(host, Family::V6)
        );

        let mut addrs = Vec::new();

        for answer in [v4, v6] {
            match answer {
                Ok(found) => addrs.extend(found),
                Err(err @ ResolveError::LookupFailed { .. }) => debug!("{}", err),
                Err(ResolveError::NoRecords { .. }) => {}
            }
        }

        if addrs.is_empty() {
            return Err(SafetyError::NoDnsRecords(host.to_string()));
        }

        Ok(addrs)
    }

    fn filter_blocked(&self, host: &str, addrs: Vec<IpAddr>) -> Result<Vec<IpAddr>, SafetyError> {
        let allowed: Vec<IpAddr> = addrs
            .iter()
            .copied()
            .filter(|ip| !is_blocked_ip(*ip) || (self.policy.allow_loopback && is_loopback(*ip)))
            .collect();

        if allowed.is_empty() {
            debug!("refusing {}: every address is blocked ({:?})", host, addrs);

            return Err(SafetyError::Blocked {
                host: host.to_string(),
                addrs,
            });
        }

        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::StaticResolver;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn gate(resolver: StaticResolver) -> SafetyGate {
        SafetyGate::new(SafetyPolicy::default(), Arc::new(resolver))
    }

    #[test]
    fn test_blocked_ranges() {
        for blocked in [
            "127.0.0.1",
            "127.255.0.9",
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "::1",
            "::",
            "fc00::1",
            "fd12:3456::1",
            "fe80::1",
            "::ffff:127.0.0.1",
            "::ffff:10.0.0.1",
        ] {
            assert!(is_blocked_ip(ip(blocked)), "{} should be blocked", blocked);
        }

        for public in [
            "93.184.216.34",
            "172.32.0.1",
            "8.8.8.8",
            "2606:4700::1111",
            "::ffff:8.8.8.8",
        ] {
            assert!(!is_blocked_ip(ip(public)), "{} should be allowed", public);
        }
    }

    #[tokio::test]
    async fn test_every_private_answer_is_refused() {
        let resolver = StaticResolver::new()
            .with_host("internal.example", [ip("10.0.0.5"), ip("fd00::5")])
            .with_host("loop.example", [ip("127.0.0.1"), ip("::1")])
            .with_host("metadata.example", [ip("169.254.169.254")]);

        let gate = gate(resolver);

        for host in ["internal.example", "loop.example", "metadata.example"] {
            let res = gate.validate(&format!("https://{}/", host)).await;

            assert!(
                matches!(res, Err(SafetyError::Blocked { .. })),
                "{} should be blocked",
                host
            );
        }
    }

    #[tokio::test]
    async fn test_one_public_answer_passes() {
        let resolver =
            StaticResolver::new().with_host("mixed.example", [ip("10.0.0.5"), ip("93.184.216.34")]);

        let validated = gate(resolver)
            .validate("https://mixed.example/v1")
            .await
            .expect("mixed answers should pass");

        assert_eq!(validated.resolved_ips, vec![ip("93.184.216.34")]);
    }

    #[tokio::test]
    async fn test_no_records_is_not_blocked() {
        let res = gate(StaticResolver::new())
            .validate("https://nowhere.example/")
            .await;

        assert!(matches!(res, Err(SafetyError::NoDnsRecords(host)) if host == "nowhere.example"));
    }

    #[tokio::test]
    async fn test_scheme_and_credentials() {
        let resolver = StaticResolver::new().with_host("site.example", [ip("93.184.216.34")]);
        let gate = gate(resolver.clone());

        assert!(matches!(
            gate.validate("http://site.example/").await,
            Err(SafetyError::InsecureScheme)
        ));
        assert!(matches!(
            gate.validate("ftp://site.example/").await,
            Err(SafetyError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            gate.validate("https://user:pw@site.example/").await,
            Err(SafetyError::EmbeddedCredentials)
        ));
        assert!(matches!(
            gate.validate("https://site.\texample/").await,
            Err(SafetyError::ControlCharacters)
        ));
        assert!(matches!(
            gate.validate("not a url").await,
            Err(SafetyError::Malformed(_))
        ));

        let dev = SafetyGate::new(
            SafetyPolicy {
                allow_insecure_scheme: true,
                allow_loopback: false,
            },
            Arc::new(resolver),
        );

        assert!(dev.validate("http://site.example/").await.is_ok());
    }

    #[tokio::test]
    async fn test_ip_literals() {
        let gate = gate(StaticResolver::new());

        assert!(matches!(
            gate.validate("https://169.254.169.254/latest/meta-data").await,
            Err(SafetyError::Blocked { .. })
        ));
        assert!(matches!(
            gate.validate("https://[::1]:8443/").await,
            Err(SafetyError::Blocked { .. })
        ));

        let validated = gate.validate("https://93.184.216.34/").await.unwrap();
        assert_eq!(validated.resolved_ips, vec![ip("93.184.216.34")]);
    }

    #[tokio::test]
    async fn test_loopback_exemption_stays_narrow() {
        let resolver = StaticResolver::new()
            .with_host("loop.example", [ip("127.0.0.1")])
            .with_host("lan.example", [ip("192.168.0.10")]);

        let gate = SafetyGate::new(
            SafetyPolicy {
                allow_insecure_scheme: false,
                allow_loopback: true,
            },
            Arc::new(resolver),
        );

        assert!(gate.validate("https://loop.example/").await.is_ok());
        assert!(matches!(
            gate.validate("https://lan.example/").await,
            Err(SafetyError::Blocked { .. })
        ));
    }
}
