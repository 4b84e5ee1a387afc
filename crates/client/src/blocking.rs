//! The synchronous facade.
//!
//! Every operation here is a thin `block_on` wrapper over the async
//! engine, so the two surfaces share all policy and wire code. The
//! one behavioral difference is lazy handles: a blocking
//! [`LazyResponse`] transparently gathers itself when an attribute is
//! touched, where the async handle demands an explicit
//! [`gather`][crate::Session::gather] first.

use crate::{into_url::IntoUrl, Auth, Multipart, Result};
use futures_lite::future::block_on;
use niquests_http::{Body, HeaderName, HeaderValues, Headers, Method, Status, Version};
use std::{io, time::Duration};
use url::Url;

/// A blocking session. Constructed from (and sharing state with) an
/// async [`Session`][crate::Session].
#[derive(Debug, Clone, Default)]
pub struct Session(crate::Session);

macro_rules! method {
    ($fn_name:ident, $method:ident) => {
        #[doc = concat!(
            "Builds a blocking ",
            stringify!($method),
            " request to the provided url."
        )]
        pub fn $fn_name(&self, url: impl IntoUrl) -> RequestBuilder {
            RequestBuilder(self.0.request(Method::$method, url))
        }
    };
}

impl Session {
    /// a blocking session with default configuration
    pub fn new() -> Self {
        Self(crate::Session::new())
    }

    /// wrap an already-configured async session
    pub fn from_async(session: crate::Session) -> Self {
        Self(session)
    }

    /// the underlying async session
    pub fn as_async(&self) -> &crate::Session {
        &self.0
    }

    method!(get, Get);
    method!(head, Head);
    method!(options, Options);
    method!(post, Post);
    method!(put, Put);
    method!(patch, Patch);
    method!(delete, Delete);

    /// build a request with an arbitrary method
    pub fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        RequestBuilder(self.0.request(method, url))
    }

    /// Resolve lazy handles; an empty slice resolves everything
    /// pending. See [`Session::gather`][crate::Session::gather].
    pub fn gather(&self, handles: &mut [&mut LazyResponse], max_fetch: Option<usize>) -> usize {
        let mut inner = handles
            .iter_mut()
            .map(|handle| &mut handle.0)
            .collect::<Vec<_>>();
        block_on(self.0.gather(&mut inner, max_fetch))
    }

    /// drop every pooled connection
    pub fn close(&self) {
        self.0.close();
    }
}

/// A blocking request builder. See
/// [`RequestBuilder`][crate::RequestBuilder] for the semantics of
/// each setter.
#[derive(Debug)]
pub struct RequestBuilder(crate::RequestBuilder);

impl RequestBuilder {
    /// append query parameters
    pub fn query<K: AsRef<str>, V: AsRef<str>>(self, pairs: &[(K, V)]) -> Self {
        Self(self.0.query(pairs))
    }

    /// append a request header
    pub fn header(
        self,
        name: impl Into<HeaderName<'static>>,
        values: impl Into<HeaderValues>,
    ) -> Self {
        Self(self.0.header(name, values))
    }

    /// send a form-urlencoded body
    pub fn form<K: AsRef<str>, V: AsRef<str>>(self, pairs: &[(K, V)]) -> Self {
        Self(self.0.form(pairs))
    }

    /// send a raw or streaming body
    pub fn body(self, body: impl Into<Body>) -> Self {
        Self(self.0.body(body))
    }

    /// send a JSON body
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(self, value: &T) -> Self {
        Self(self.0.json(value))
    }

    /// send a `multipart/form-data` body
    pub fn multipart(self, multipart: Multipart) -> Self {
        Self(self.0.multipart(multipart))
    }

    /// merge a cookie for this request only
    pub fn cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self(self.0.cookie(name, value))
    }

    /// authenticate with explicit credentials
    pub fn auth(self, auth: Auth) -> Self {
        Self(self.0.auth(auth))
    }

    /// bound socket inactivity
    pub fn timeout(self, timeout: Duration) -> Self {
        Self(self.0.timeout(timeout))
    }

    /// follow redirects or surface them
    pub fn allow_redirects(self, allow_redirects: bool) -> Self {
        Self(self.0.allow_redirects(allow_redirects))
    }

    /// keep the body as a live stream
    pub fn stream(self, stream: bool) -> Self {
        Self(self.0.stream(stream))
    }

    /// Send the request, blocking the calling thread until the final
    /// response arrives.
    pub fn send(self) -> Result<Response> {
        block_on(self.0.send()).map(Response)
    }

    /// Dispatch lazily, returning a handle that resolves on first
    /// attribute access or on [`Session::gather`].
    pub fn promise(self) -> Result<LazyResponse> {
        block_on(self.0.promise()).map(LazyResponse)
    }
}

/// A blocking response.
#[derive(Debug)]
pub struct Response(crate::Response);

impl Response {
    /// the response status
    pub fn status(&self) -> Status {
        self.0.status()
    }

    /// the negotiated http version
    pub fn version(&self) -> Version {
        self.0.version()
    }

    /// the response headers
    pub fn headers(&self) -> &Headers {
        self.0.headers()
    }

    /// the terminal url after redirects
    pub fn url(&self) -> &Url {
        self.0.url()
    }

    /// prior responses in the redirect chain, oldest first
    pub fn history(&self) -> &[crate::Response] {
        self.0.history()
    }

    /// the full decompressed body
    pub fn content(&mut self) -> Result<&[u8]> {
        block_on(self.0.content())
    }

    /// the body decoded as text; `None` when no encoding can be
    /// determined with confidence
    pub fn text(&mut self) -> Result<Option<String>> {
        block_on(self.0.text())
    }

    /// the body deserialized as JSON
    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        block_on(self.0.json())
    }

    /// iterate the body in chunks; blocking counterpart of
    /// [`Response::iter_content`][crate::Response::iter_content]
    pub fn iter_content(&mut self, chunk_size: Option<usize>) -> Result<ContentIterator> {
        self.0.iter_content(chunk_size).map(ContentIterator)
    }

    /// iterate the body line by line
    pub fn iter_lines(&mut self, keepends: bool) -> Result<LineIterator> {
        self.0.iter_lines(None, keepends).map(LineIterator)
    }

    /// a typed view over the headers
    pub fn oheaders(&self) -> crate::response::OHeaders<'_> {
        self.0.oheaders()
    }

    /// fail on 4xx/5xx, pass the response through otherwise
    pub fn raise_for_status(self) -> Result<Self> {
        self.0.raise_for_status().map(Response)
    }

    /// relinquish the stream cursor; idempotent
    pub fn close(&mut self) {
        block_on(self.0.close());
    }

    /// the wrapped async response
    pub fn into_async(self) -> crate::Response {
        self.0
    }
}

/// Blocking chunk iterator over a response body.
#[derive(Debug)]
pub struct ContentIterator(crate::response::BodyIter);

impl Iterator for ContentIterator {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        block_on(self.0.next())
    }
}

/// Blocking line iterator over a response body.
#[derive(Debug)]
pub struct LineIterator(crate::response::LineIter);

impl Iterator for LineIterator {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        block_on(self.0.next())
    }
}

/// A blocking lazy response handle. Touching any attribute of an
/// unresolved handle drives a targeted gather first, so access is
/// always safe and blocking.
#[derive(Debug)]
pub struct LazyResponse(crate::LazyResponse);

impl LazyResponse {
    fn resolve(&mut self) {
        if let Some(scheduler) = self.0.scheduler() {
            let id = self.0.id();
            block_on(scheduler.gather(Some(vec![id]), None));
        }
    }

    /// whether the exchange has completed
    pub fn is_resolved(&mut self) -> bool {
        self.0.is_resolved()
    }

    /// the status, gathering first if necessary
    pub fn status(&mut self) -> Result<Status> {
        self.resolve();
        self.0.status()
    }

    /// the headers, gathering first if necessary
    pub fn headers(&mut self) -> Result<&Headers> {
        self.resolve();
        self.0.headers()
    }

    /// the resolved response, gathering first if necessary
    pub fn into_response(mut self) -> Result<Response> {
        self.resolve();
        self.0.into_response().map(Response)
    }
}

/// Issue a one-off blocking GET with an ephemeral session.
pub fn get(url: impl IntoUrl) -> Result<Response> {
    Session::new().get(url).send()
}

/// Issue a one-off blocking POST with an ephemeral session.
pub fn post(url: impl IntoUrl) -> RequestBuilder {
    Session::new().post(url)
}
