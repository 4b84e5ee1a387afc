#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    unused_qualifications
)]

/*!
niquests is an ergonomic http client speaking http/1.1, http/2, and
http/3, with persistent sessions, per-origin connection pooling,
cookies, security-aware redirects, pluggable DNS resolution, and
multiplexed lazy requests.

The async api is the engine; a [`blocking`] facade wraps it for
synchronous callers.

```no_run
# futures_lite::future::block_on(async {
use niquests::Session;

let session = Session::new();
let mut response = session
    .get("http://example.test/get")
    .query(&[("key1", "value1")])
    .send()
    .await?;

assert!(response.status().is_success());
let body = response.text().await?;
# niquests::Result::Ok(()) });
```

## Connectors and protocol stacks

The built-in [`TcpConnector`] speaks plaintext http/1.1. Tls and quic
stacks plug in as [`Connector`] capabilities: they own the handshake
and alpn negotiation, and hand back either an exclusive http/1 byte
stream or a multiplexed [h2/h3 session][MuxSession] the engine
schedules streams on.

## Multiplexed sessions

A session built `with_multiplexed(true)` can dispatch requests
lazily: [`RequestBuilder::promise`] returns a [`LazyResponse`]
immediately and [`Session::gather`] drives every in-flight exchange
concurrently, resolving handles in completion order.
*/

mod altsvc;
pub use altsvc::{AltSvcCache, AltSvcEntry};

mod auth;
pub use auth::{Auth, NetrcEntry};

mod body_forms;

pub mod blocking;

mod connector;
pub use connector::{
    ArcedConnector, ClientCert, ConnectConfig, Connector, Established, TcpConnector,
};

mod cookies;
pub use cookies::{Jar, StoredCookie};

mod decoder;

pub mod driver;
pub use driver::{MuxSession, MuxStream, RequestHead, ResponseHead, StreamState};

mod into_url;
pub use into_url::IntoUrl;

mod multipart;
pub use multipart::{Multipart, Part};

mod multiplex;
pub use multiplex::LazyResponse;

mod pool;
pub use pool::{Pool, DEFAULT_POOL_CONNECTIONS, DEFAULT_POOL_MAXSIZE};

mod proxy;
pub use proxy::ProxyConfig;

mod redirect;
pub use redirect::RedirectPolicy;

mod request;
pub use request::RequestBuilder;

pub mod resolver;
pub use resolver::{Resolver, ResolverChain, ResolverDescriptor, SystemResolver};

mod response;
pub use response::{BodyCursor, BodyIter, LineIter, OHeaders, Response};

mod session;
pub use session::{ResponseHook, Session, USER_AGENT};

pub mod testing;

mod util;

pub use niquests_http::{
    Body, Error, HeaderName, HeaderValue, HeaderValues, Headers, KnownHeaderName, Method, Result,
    Status, Url, Version,
};

/// Issue a GET request with an ephemeral session.
pub async fn get(url: impl IntoUrl) -> Result<Response> {
    Session::new().get(url).send().await
}

/// Issue a HEAD request with an ephemeral session.
pub async fn head(url: impl IntoUrl) -> Result<Response> {
    Session::new().head(url).send().await
}

/// Issue an OPTIONS request with an ephemeral session.
pub async fn options(url: impl IntoUrl) -> Result<Response> {
    Session::new().options(url).send().await
}

/// Issue a DELETE request with an ephemeral session.
pub async fn delete(url: impl IntoUrl) -> Result<Response> {
    Session::new().delete(url).send().await
}

/// Build a POST request on an ephemeral session.
pub fn post(url: impl IntoUrl) -> RequestBuilder {
    Session::new().post(url)
}

/// Build a PUT request on an ephemeral session.
pub fn put(url: impl IntoUrl) -> RequestBuilder {
    Session::new().put(url)
}

/// Build a PATCH request on an ephemeral session.
pub fn patch(url: impl IntoUrl) -> RequestBuilder {
    Session::new().patch(url)
}
