//! Building requests.

use crate::{
    auth::Auth,
    body_forms::BodyForms,
    driver::InformationalCallback,
    into_url::IntoUrl,
    multipart::Multipart,
    LazyResponse, Response, Result, Session,
};
use niquests_http::{Body, Error, HeaderName, HeaderValues, Headers, Method, Status};
use std::{fmt::{self, Debug, Formatter}, sync::Arc, time::Duration};
use url::Url;

/// default timeout for safe, read-only verbs
pub(crate) const READ_VERB_TIMEOUT: Duration = Duration::from_secs(30);
/// default timeout for verbs that carry bodies or mutate state
pub(crate) const WRITE_VERB_TIMEOUT: Duration = Duration::from_secs(120);

/// the default redirect-chain bound
pub(crate) const DEFAULT_MAX_REDIRECTS: usize = 30;

/// A request under construction. Obtained from the verb methods on
/// [`Session`]; consumed by [`send`][RequestBuilder::send] or
/// [`promise`][RequestBuilder::promise].
pub struct RequestBuilder {
    pub(crate) session: Session,
    pub(crate) method: Method,
    pub(crate) url: Result<Url>,
    pub(crate) headers: Headers,
    pub(crate) params: Vec<(String, Option<String>)>,
    pub(crate) forms: BodyForms,
    pub(crate) cookies: Vec<(String, String)>,
    pub(crate) auth: Option<Auth>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) allow_redirects: Option<bool>,
    pub(crate) stream: bool,
    pub(crate) verify: Option<bool>,
    pub(crate) cert: Option<crate::connector::ClientCert>,
    pub(crate) on_informational: Option<InformationalCallback>,
    pub(crate) error: Option<Error>,
}

impl Debug for RequestBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("stream", &self.stream)
            .finish()
    }
}

impl RequestBuilder {
    pub(crate) fn new(session: Session, method: Method, url: impl IntoUrl) -> Self {
        let url = url.into_url(session.base());
        Self {
            session,
            method,
            url,
            headers: Headers::new(),
            params: vec![],
            forms: BodyForms::default(),
            cookies: vec![],
            auth: None,
            timeout: None,
            allow_redirects: None,
            stream: false,
            verify: None,
            cert: None,
            on_informational: None,
            error: None,
        }
    }

    /// the url this request will be sent to, when it parsed
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref().ok()
    }

    /// Append query parameters, preserving insertion order. Repeated
    /// keys repeat in the encoded query.
    pub fn query<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        for (key, value) in pairs {
            self.params
                .push((key.as_ref().to_string(), Some(value.as_ref().to_string())));
        }
        self
    }

    /// Append query parameters where a `None` value elides the pair
    /// entirely.
    pub fn query_opt<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, Option<V>)]) -> Self {
        for (key, value) in pairs {
            self.params.push((
                key.as_ref().to_string(),
                value.as_ref().map(|v| v.as_ref().to_string()),
            ));
        }
        self
    }

    /// append a request header
    pub fn header(
        mut self,
        name: impl Into<HeaderName<'static>>,
        values: impl Into<HeaderValues>,
    ) -> Self {
        self.headers.append(name, values);
        self
    }

    /// append many request headers
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.append_all(headers);
        self
    }

    /// send a form-urlencoded body built from these pairs
    pub fn form<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        self.forms.form = Some(
            pairs
                .iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
                .collect(),
        );
        self
    }

    /// send a raw or streaming body
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.forms.raw = Some(body.into());
        self
    }

    /// Send a JSON body. Ignored when `form`, `body`, or `multipart`
    /// is also set.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.forms.json = Some(bytes),
            Err(e) => self.error = Some(Error::Json(e.to_string())),
        }
        self
    }

    /// send a `multipart/form-data` body
    pub fn multipart(mut self, multipart: Multipart) -> Self {
        self.forms.multipart = Some(multipart);
        self
    }

    /// merge a cookie over the jar's matches for this request only
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// authenticate with explicit credentials, overriding netrc and
    /// any manual `Authorization` header
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// shorthand for basic credentials
    pub fn basic_auth(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth(Auth::basic(username, password))
    }

    /// shorthand for a bearer token
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.auth(Auth::bearer(token))
    }

    /// Bound socket inactivity. Without an explicit timeout, safe
    /// verbs default to 30 seconds and body-carrying verbs to 120.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Follow redirects or surface them as responses. Defaults to
    /// following, except for HEAD requests.
    pub fn allow_redirects(mut self, allow_redirects: bool) -> Self {
        self.allow_redirects = Some(allow_redirects);
        self
    }

    /// Keep the body as a live stream instead of eagerly buffering it
    /// when the response arrives.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// toggle certificate verification for this request
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    /// present a client certificate for mutual tls
    pub fn cert(mut self, cert: crate::connector::ClientCert) -> Self {
        self.cert = Some(cert);
        self
    }

    /// observe interim (1xx) response heads
    pub fn on_informational(
        mut self,
        callback: impl Fn(Status, &Headers) + Send + Sync + 'static,
    ) -> Self {
        self.on_informational = Some(Arc::new(callback));
        self
    }

    /// Send the request and drive it to a final [`Response`],
    /// following the session's redirect policy.
    pub async fn send(self) -> Result<Response> {
        let session = self.session.clone();
        session.execute(self).await
    }

    /// Dispatch the request and return immediately with a
    /// [`LazyResponse`] that resolves on
    /// [`gather`][Session::gather] or on demand. Requires a
    /// session constructed with `with_multiplexed(true)`.
    pub async fn promise(self) -> Result<LazyResponse> {
        let session = self.session.clone();
        session.promise(self).await
    }
}

/// A replayable request body plan: redirects may need to send the
/// body again, which only works when the bytes are in memory.
#[derive(Debug)]
pub(crate) enum BodyBlueprint {
    Empty,
    Static(Vec<u8>),
    Streaming(Option<Body>),
}

impl BodyBlueprint {
    pub(crate) fn from_body(body: Option<Body>) -> Self {
        match body {
            None => BodyBlueprint::Empty,
            Some(body) if body.is_streaming() => BodyBlueprint::Streaming(Some(body)),
            Some(body) => match body.static_bytes() {
                Some(bytes) => BodyBlueprint::Static(bytes.to_vec()),
                None => BodyBlueprint::Empty,
            },
        }
    }

    /// the body for one attempt
    pub(crate) fn take(&mut self) -> Result<Option<Body>> {
        match self {
            BodyBlueprint::Empty => Ok(None),
            BodyBlueprint::Static(bytes) => Ok(Some(Body::from(bytes.clone()))),
            BodyBlueprint::Streaming(body) => match body.take() {
                Some(body) => Ok(Some(body)),
                None => Err(Error::StreamConsumed),
            },
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = BodyBlueprint::Empty;
    }
}

/// A fully composed request, ready for the dispatch loop.
pub(crate) struct PreparedRequest {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: Headers,
    pub(crate) body: BodyBlueprint,
    pub(crate) user_cookies: Vec<(String, String)>,
    pub(crate) auth: Option<Auth>,
    pub(crate) timeout: Duration,
    pub(crate) allow_redirects: bool,
    pub(crate) stream: bool,
    pub(crate) verify: bool,
    pub(crate) cert: Option<crate::connector::ClientCert>,
    pub(crate) on_informational: Option<InformationalCallback>,
}

impl Debug for PreparedRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("allow_redirects", &self.allow_redirects)
            .field("stream", &self.stream)
            .finish()
    }
}

pub(crate) fn default_timeout(method: Method) -> Duration {
    match method {
        Method::Get | Method::Head | Method::Options => READ_VERB_TIMEOUT,
        _ => WRITE_VERB_TIMEOUT,
    }
}
