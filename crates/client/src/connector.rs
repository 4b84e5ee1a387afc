//! Establishing transports.
//!
//! A [`Connector`] owns the dial: resolve, connect, and (for tls/quic
//! stacks) handshake and alpn negotiation. The built-in
//! [`TcpConnector`] speaks plaintext http/1.1; tls and quic stacks
//! are capabilities that implement this trait and report the
//! negotiated version through [`Established`].

use crate::{
    driver::MuxConnection,
    resolver::{FamilyHint, ResolverChain},
    Result,
};
use async_io::Timer;
use async_net::TcpStream;
use async_trait::async_trait;
use futures_lite::FutureExt;
use niquests_http::{transport::BoxedTransport, Error, Transport, Version};
use std::{fmt::Debug, net::SocketAddr, sync::Arc, time::Duration};
use url::Url;

/// What a successful dial produced.
#[derive(Debug)]
pub enum Established {
    /// an exclusive byte stream speaking http/1.x
    Http1(BoxedTransport),

    /// a shared multiplexed session (http/2 or http/3)
    Mux(MuxConnection),
}

/// A client certificate and key for mutual tls, consumed by tls/quic
/// connector capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCert {
    /// path to the certificate (pem)
    pub cert: std::path::PathBuf,
    /// path to the private key, when not bundled into the cert file
    pub key: Option<std::path::PathBuf>,
}

/// Preferences handed to a connector for one dial.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// resolver chain to use for hostname lookup
    pub resolver: ResolverChain,
    /// address-family preference
    pub family: FamilyHint,
    /// highest http version the caller wants; a connector may
    /// negotiate downward but never upward
    pub version_ceiling: Version,
    /// verify peer certificates (tls/quic connectors)
    pub verify: bool,
    /// client certificate for mutual tls
    pub client_cert: Option<ClientCert>,
    /// abort the dial if no connection is established within this
    /// window
    pub connect_timeout: Option<Duration>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverChain::default(),
            family: FamilyHint::Any,
            version_ceiling: Version::Http3,
            verify: true,
            client_cert: None,
            connect_timeout: None,
        }
    }
}

/// The dial capability.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a transport to the authority of `url`. The url's
    /// host may be overridden by an alt-svc alternative; connectors
    /// must honor the url as given.
    async fn connect(&self, url: &Url, config: &ConnectConfig) -> Result<Established>;

    /// whether this connector can satisfy the given scheme and
    /// version ceiling. The pool uses this to skip alt-svc upgrades a
    /// connector cannot attempt.
    fn supports(&self, scheme: &str, version: Version) -> bool;
}

/// An `Arc`'d, type-erased [`Connector`].
#[derive(Clone)]
pub struct ArcedConnector(Arc<dyn Connector>);

impl Debug for ArcedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ArcedConnector").finish()
    }
}

impl ArcedConnector {
    /// erase a connector's type
    pub fn new(connector: impl Connector) -> Self {
        Self(Arc::new(connector))
    }

    pub(crate) async fn connect(&self, url: &Url, config: &ConnectConfig) -> Result<Established> {
        self.0.connect(url, config).await
    }

    pub(crate) fn supports(&self, scheme: &str, version: Version) -> bool {
        self.0.supports(scheme, version)
    }
}

impl<C: Connector> From<C> for ArcedConnector {
    fn from(connector: C) -> Self {
        Self::new(connector)
    }
}

/// Plain-tcp connector: http:// only, always http/1.1. Combine with a
/// tls connector capability for https and alpn-negotiated http/2.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, url: &Url, config: &ConnectConfig) -> Result<Established> {
        if url.scheme() != "http" {
            return Err(Error::Connection(format!(
                "TcpConnector cannot dial {} urls; configure a tls connector",
                url.scheme()
            )));
        }

        let host = url.host_str().ok_or(Error::UnexpectedUriFormat)?;
        let port = url
            .port_or_known_default()
            .ok_or(Error::UnexpectedUriFormat)?;

        let addrs = config.resolver.resolve(host, port, config.family).await?;
        let stream = connect_first(&addrs, config.connect_timeout).await?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Established::Http1(BoxedTransport::new(TcpTransport(stream))))
    }

    fn supports(&self, scheme: &str, version: Version) -> bool {
        scheme == "http" && version <= Version::Http1_1
    }
}

async fn connect_first(
    addrs: &[SocketAddr],
    connect_timeout: Option<Duration>,
) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        let attempt = TcpStream::connect(*addr);
        let result = match connect_timeout {
            Some(duration) => timeout(duration, "connect", attempt).await,
            None => attempt.await.map_err(Error::from),
        };

        match result {
            Ok(stream) => {
                log::debug!("opened new connection to {addr}");
                return Ok(stream);
            }
            Err(e) => {
                log::debug!("connection to {addr} failed: {e}");
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(Error::TimedOut(phase, duration)) => Error::TimedOut(phase, duration),
        Some(error) => Error::Connection(error.to_string()),
        None => Error::Connection("no addresses to connect to".into()),
    })
}

/// Race a future against a deadline, mapping expiry to
/// [`Error::TimedOut`] tagged with `phase`.
pub(crate) async fn timeout<T, E>(
    duration: Duration,
    phase: &'static str,
    future: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    Error: From<E>,
{
    let deadline = async {
        Timer::after(duration).await;
        Err(Error::TimedOut(phase, duration))
    };

    async { future.await.map_err(Error::from) }.or(deadline).await
}

/// a tcp stream as a [`Transport`]
#[derive(Debug)]
struct TcpTransport(TcpStream);

impl Transport for TcpTransport {
    fn set_nodelay(&mut self, nodelay: bool) -> std::io::Result<()> {
        self.0.set_nodelay(nodelay)
    }

    fn peer_addr(&self) -> std::io::Result<Option<SocketAddr>> {
        self.0.peer_addr().map(Some)
    }
}

impl futures_lite::AsyncRead for TcpTransport {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut [u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl futures_lite::AsyncWrite for TcpTransport {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.0).poll_close(cx)
    }
}
