//! Pluggable hostname resolution.
//!
//! A [`Resolver`] turns a hostname and port into an ordered endpoint
//! list. Implementations are declared by url-like descriptors
//! (`dou://`, `dot://`, `doh://`, `doh+<preset>://`, `doq://`); the
//! secure transports themselves are capabilities registered by the
//! application, while plain OS resolution is built in. Several
//! resolvers compose into an ordered fallback chain.

use crate::Result;
use async_trait::async_trait;
use niquests_http::Error;
use std::{
    fmt::{self, Debug, Formatter},
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
    sync::Arc,
};
use url::Url;

/// the environment variable naming the default resolver descriptor
pub const DNS_URL_ENV: &str = "NIQUESTS_DNS_URL";

/// Address-family preference for resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilyHint {
    /// return both v4 and v6 endpoints
    #[default]
    Any,
    /// only ipv4
    V4,
    /// only ipv6
    V6,
}

/// A hostname-to-endpoints capability.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// resolve the host into an ordered endpoint list. An empty list
    /// is treated as a failed resolution.
    async fn resolve(&self, host: &str, port: u16, family: FamilyHint) -> Result<Vec<SocketAddr>>;

    /// a short label for logging
    fn label(&self) -> &str {
        "resolver"
    }
}

/// The DNS transport named by a descriptor scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsTransport {
    /// `dou://`, plain DNS over udp/tcp port 53
    Udp,
    /// `dot://`, DNS over tls
    Tls,
    /// `doh://`, DNS over https
    Https,
    /// `doq://`, DNS over quic
    Quic,
    /// the operating system resolver
    System,
}

/// A parsed resolver descriptor such as
/// `doh+cloudflare://` or `dot://dns.example:853?dnssec=true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverDescriptor {
    /// which transport the descriptor names
    pub transport: DnsTransport,
    /// a provider preset, from the `doh+<preset>://` form
    pub preset: Option<String>,
    /// the resolver host, absent for presets and the system resolver
    pub host: Option<String>,
    /// explicit port, when the default for the transport is not used
    pub port: Option<u16>,
    /// request DNSSEC validation
    pub dnssec: bool,
    /// verify the resolver's certificate (secure transports only)
    pub verify: bool,
}

impl ResolverDescriptor {
    /// the system resolver descriptor
    pub fn system() -> Self {
        Self {
            transport: DnsTransport::System,
            preset: None,
            host: None,
            port: None,
            dnssec: false,
            verify: true,
        }
    }
}

impl FromStr for ResolverDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUrl(format!("{s}: {e}")))?;

        let (transport, preset) = match url.scheme() {
            "dou" => (DnsTransport::Udp, None),
            "dot" => (DnsTransport::Tls, None),
            "doh" => (DnsTransport::Https, None),
            "doq" => (DnsTransport::Quic, None),
            "system" => (DnsTransport::System, None),
            scheme => match scheme.split_once('+') {
                Some(("doh", preset)) if !preset.is_empty() => {
                    (DnsTransport::Https, Some(preset.to_string()))
                }
                _ => {
                    return Err(Error::InvalidUrl(format!(
                        "unrecognized resolver scheme {scheme}"
                    )));
                }
            },
        };

        let mut dnssec = false;
        let mut verify = true;
        for (key, value) in url.query_pairs() {
            match &*key {
                "dnssec" => dnssec = value == "true" || value == "1",
                "verify" => verify = !(value == "false" || value == "0"),
                _ => {}
            }
        }

        Ok(Self {
            transport,
            preset,
            host: url.host_str().map(String::from),
            port: url.port(),
            dnssec,
            verify,
        })
    }
}

/// Resolves through the operating system's resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16, family: FamilyHint) -> Result<Vec<SocketAddr>> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Connection(format!("dns lookup for {host} failed: {e}")))?;

        let addrs = addrs
            .filter(|addr| match family {
                FamilyHint::Any => true,
                FamilyHint::V4 => addr.is_ipv4(),
                FamilyHint::V6 => addr.is_ipv6(),
            })
            .collect::<Vec<_>>();

        if addrs.is_empty() {
            Err(Error::Connection(format!("no address found for {host}")))
        } else {
            Ok(addrs)
        }
    }

    fn label(&self) -> &str {
        "system"
    }
}

/// A factory that turns descriptors into live resolvers. Applications
/// provide these for the secure DNS transports.
pub type ResolverFactory =
    Arc<dyn Fn(&ResolverDescriptor) -> Option<Arc<dyn Resolver>> + Send + Sync>;

/// An ordered fallback chain of resolvers. The first resolver to
/// produce a usable answer wins; errors fall through to the next
/// entry.
#[derive(Clone)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl Debug for ResolverChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|r| r.label()))
            .finish()
    }
}

impl Default for ResolverChain {
    fn default() -> Self {
        Self {
            resolvers: vec![Arc::new(SystemResolver)],
        }
    }
}

impl ResolverChain {
    /// build a chain from the provided resolvers, falling back to the
    /// system resolver when empty
    pub fn new(resolvers: Vec<Arc<dyn Resolver>>) -> Self {
        if resolvers.is_empty() {
            Self::default()
        } else {
            Self { resolvers }
        }
    }

    /// Build a chain from descriptors, materializing each through the
    /// provided factories. Descriptors no factory recognizes fall
    /// back to the system resolver with a warning, so that an
    /// unserviceable `NIQUESTS_DNS_URL` never breaks name lookup
    /// entirely.
    pub fn from_descriptors(
        descriptors: &[ResolverDescriptor],
        factories: &[ResolverFactory],
    ) -> Self {
        let mut resolvers: Vec<Arc<dyn Resolver>> = vec![];
        for descriptor in descriptors {
            if descriptor.transport == DnsTransport::System {
                resolvers.push(Arc::new(SystemResolver));
                continue;
            }

            match factories.iter().find_map(|factory| factory(descriptor)) {
                Some(resolver) => resolvers.push(resolver),
                None => {
                    log::warn!(
                        "no resolver factory for {:?} transport, using system resolver",
                        descriptor.transport
                    );
                    resolvers.push(Arc::new(SystemResolver));
                }
            }
        }
        Self::new(resolvers)
    }

    /// resolve through the chain
    pub async fn resolve(
        &self,
        host: &str,
        port: u16,
        family: FamilyHint,
    ) -> Result<Vec<SocketAddr>> {
        let mut last_error = None;
        for resolver in &self.resolvers {
            match resolver.resolve(host, port, family).await {
                Ok(addrs) if !addrs.is_empty() => return Ok(addrs),
                Ok(_) => {
                    log::debug!("{} returned no addresses for {host}", resolver.label());
                }
                Err(e) => {
                    log::debug!("{} failed for {host}: {e}", resolver.label());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Connection(format!("no address found for {host}"))))
    }
}

/// Read the default resolver descriptor from the environment, once,
/// at session construction.
pub(crate) fn descriptor_from_env() -> Option<ResolverDescriptor> {
    let value = std::env::var(DNS_URL_ENV).ok()?;
    match value.parse() {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            log::warn!("ignoring unparseable {DNS_URL_ENV}: {e}");
            None
        }
    }
}
