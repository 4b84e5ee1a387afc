//! Sessions: the request lifecycle engine.
//!
//! A session owns the connection pool, cookie jar, alt-svc cache,
//! resolver chain, and multiplex scheduler. Requests flow compose →
//! acquire → drive → redirect → finalize: the prepared request is
//! merged with session state, a connection is acquired (preferring an
//! alt-svc h3 upgrade, then a pooled mux connection, then a pooled
//! idle http/1 transport, then a fresh dial), a protocol driver runs
//! the exchange, and the redirect loop applies the policy until a
//! terminal response emerges.

use crate::{
    altsvc::AltSvcCache,
    auth::{apply_auth, netrc_lookup, netrc_path, parse_netrc, NetrcEntry},
    connector::{ArcedConnector, ConnectConfig, Established, TcpConnector},
    cookies::Jar,
    decoder::accept_encoding,
    driver::{
        H1Exchange, InformationalCallback, MuxConnection, MuxExchange, MuxSendError, RequestHead,
    },
    into_url::IntoUrl,
    multiplex::Scheduler,
    pool::Pool,
    proxy::{proxy_authorization, ProxyConfig},
    redirect::{self, RedirectPolicy},
    request::{default_timeout, BodyBlueprint, PreparedRequest, RequestBuilder},
    resolver::{descriptor_from_env, FamilyHint, ResolverChain, ResolverDescriptor, ResolverFactory},
    response::{BodyCursor, Response},
    LazyResponse, Result,
};
use futures_lite::{future::poll_once, AsyncReadExt, FutureExt};
use niquests_http::{
    transport::BoxedTransport, Body, Error, Headers, KnownHeaderName, Method, Version,
};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, OnceLock},
    time::Duration,
};
use url::{Origin, Url};

/// the default `User-Agent` this client sends
pub const USER_AGENT: &str = concat!("niquests/", env!("CARGO_PKG_VERSION"));

/// A hook invoked on every finalized response before it is returned.
pub type ResponseHook = Arc<dyn Fn(&mut Response) + Send + Sync>;

/// A persistent client session.
///
/// Cloning a session is cheap and shares the pool, jar, alt-svc
/// cache, and scheduler. Sessions may be shared between threads; the
/// synchronous facade in [`blocking`][crate::blocking] wraps this
/// same type.
pub struct Session {
    connector: ArcedConnector,
    pool: Pool,
    jar: Arc<Jar>,
    altsvc: Arc<AltSvcCache>,
    scheduler: Arc<Scheduler>,
    resolver: ResolverChain,
    base: Option<Arc<Url>>,
    default_headers: Headers,
    timeout: Option<Duration>,
    redirect_policy: RedirectPolicy,
    multiplexed: bool,
    verify: bool,
    version_ceiling: Version,
    family: FamilyHint,
    proxies: Arc<ProxyConfig>,
    netrc: Arc<OnceLock<Vec<NetrcEntry>>>,
    hooks: Vec<ResponseHook>,
    on_informational: Option<InformationalCallback>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pool", &self.pool)
            .field("base", &self.base)
            .field("multiplexed", &self.multiplexed)
            .field("version_ceiling", &self.version_ceiling)
            .finish()
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            pool: self.pool.clone(),
            jar: Arc::clone(&self.jar),
            altsvc: Arc::clone(&self.altsvc),
            scheduler: Arc::clone(&self.scheduler),
            resolver: self.resolver.clone(),
            base: self.base.clone(),
            default_headers: self.default_headers.clone(),
            timeout: self.timeout,
            redirect_policy: self.redirect_policy,
            multiplexed: self.multiplexed,
            verify: self.verify,
            version_ceiling: self.version_ceiling,
            family: self.family,
            proxies: Arc::clone(&self.proxies),
            netrc: Arc::clone(&self.netrc),
            hooks: self.hooks.clone(),
            on_informational: self.on_informational.clone(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! method {
    ($fn_name:ident, $method:ident) => {
        #[doc = concat!(
            "Builds a ",
            stringify!($method),
            " request to the provided url."
        )]
        pub fn $fn_name(&self, url: impl IntoUrl) -> RequestBuilder {
            self.request(Method::$method, url)
        }
    };
}

impl Session {
    /// A session with the plain-tcp connector, the resolver named by
    /// `NIQUESTS_DNS_URL` (system resolution otherwise), and proxies
    /// discovered from the environment.
    pub fn new() -> Self {
        let resolver = match descriptor_from_env() {
            Some(descriptor) => ResolverChain::from_descriptors(&[descriptor], &[]),
            None => ResolverChain::default(),
        };

        Self {
            connector: ArcedConnector::new(TcpConnector),
            pool: Pool::default(),
            jar: Arc::new(Jar::new()),
            altsvc: Arc::new(AltSvcCache::new()),
            scheduler: Arc::new(Scheduler::default()),
            resolver,
            base: None,
            default_headers: Headers::new(),
            timeout: None,
            redirect_policy: RedirectPolicy::default(),
            multiplexed: false,
            verify: true,
            version_ceiling: Version::Http3,
            family: FamilyHint::Any,
            proxies: Arc::new(ProxyConfig::from_env()),
            netrc: Arc::new(OnceLock::new()),
            hooks: vec![],
            on_informational: None,
        }
    }

    /// a session using the provided connector capability
    pub fn with_connector(mut self, connector: impl Into<ArcedConnector>) -> Self {
        self.connector = connector.into();
        self
    }

    /// Chainable setter for a base url that relative request urls
    /// join against. The base is treated as a directory, so `c`
    /// against a base of `http://host/a/b` builds `http://host/a/b/c`.
    pub fn with_base(mut self, base: impl IntoUrl) -> Self {
        match base.into_url(None) {
            Ok(mut url) => {
                if !url.path().ends_with('/') {
                    url.set_path(&format!("{}/", url.path()));
                }
                self.base = Some(Arc::new(url));
            }
            Err(e) => log::warn!("ignoring unusable base url: {e}"),
        }
        self
    }

    /// the configured base url, if any
    pub fn base(&self) -> Option<&Url> {
        self.base.as_deref()
    }

    /// Enable lazy dispatch: request builders gain
    /// [`promise`][RequestBuilder::promise], whose handles resolve
    /// through [`gather`][Session::gather].
    pub fn with_multiplexed(mut self, multiplexed: bool) -> Self {
        self.multiplexed = multiplexed;
        self
    }

    /// whether this session hands out lazy response handles
    pub fn is_multiplexed(&self) -> bool {
        self.multiplexed
    }

    /// resize the pool: retained origins and connections per origin
    pub fn with_pool_sizes(mut self, pool_connections: usize, pool_maxsize: usize) -> Self {
        self.pool = Pool::new(pool_connections, pool_maxsize);
        self
    }

    /// evict idle pooled connections after this long
    pub fn with_pool_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.pool.set_idle_timeout(Some(idle_timeout));
        self
    }

    /// use this resolver chain instead of the environment default
    pub fn with_resolver(mut self, resolver: ResolverChain) -> Self {
        self.resolver = resolver;
        self
    }

    /// Materialize a resolver chain from descriptors through the
    /// provided factories; descriptors no factory recognizes fall
    /// back to system resolution.
    pub fn with_resolver_descriptors(
        mut self,
        descriptors: &[ResolverDescriptor],
        factories: &[ResolverFactory],
    ) -> Self {
        self.resolver = ResolverChain::from_descriptors(descriptors, factories);
        self
    }

    /// default inactivity timeout applied when a request sets none
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// adjust redirect behavior
    pub fn with_redirect_policy(mut self, redirect_policy: RedirectPolicy) -> Self {
        self.redirect_policy = redirect_policy;
        self
    }

    /// default certificate-verification posture
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// highest http version to negotiate
    pub fn with_version_ceiling(mut self, version_ceiling: Version) -> Self {
        self.version_ceiling = version_ceiling;
        self
    }

    /// restrict resolution to one address family
    pub fn with_family(mut self, family: FamilyHint) -> Self {
        self.family = family;
        self
    }

    /// replace discovered proxies with an explicit configuration
    pub fn with_proxies(mut self, proxies: ProxyConfig) -> Self {
        self.proxies = Arc::new(proxies);
        self
    }

    /// a header sent with every request unless the request overrides
    /// it
    pub fn with_default_header(
        mut self,
        name: impl Into<niquests_http::HeaderName<'static>>,
        values: impl Into<niquests_http::HeaderValues>,
    ) -> Self {
        self.default_headers.insert(name, values);
        self
    }

    /// run a hook on every finalized response
    pub fn with_hook(mut self, hook: impl Fn(&mut Response) + Send + Sync + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// observe interim (1xx) heads on every request
    pub fn with_informational_callback(
        mut self,
        callback: impl Fn(niquests_http::Status, &Headers) + Send + Sync + 'static,
    ) -> Self {
        self.on_informational = Some(Arc::new(callback));
        self
    }

    /// the session cookie jar
    pub fn jar(&self) -> &Jar {
        &self.jar
    }

    /// build a request with an arbitrary method
    pub fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url)
    }

    method!(get, Get);
    method!(head, Head);
    method!(options, Options);
    method!(post, Post);
    method!(put, Put);
    method!(patch, Patch);
    method!(delete, Delete);

    /// Resolve lazy handles. An empty `handles` slice resolves every
    /// pending exchange; `max_fetch` stops after that many exchanges
    /// completed, whichever become ready first. Returns the number of
    /// exchanges newly resolved.
    pub async fn gather(
        &self,
        handles: &mut [&mut LazyResponse],
        max_fetch: Option<usize>,
    ) -> usize {
        let targets = if handles.is_empty() {
            None
        } else {
            Some(handles.iter().map(|handle| handle.id()).collect())
        };

        let resolved = self.scheduler.gather(targets, max_fetch).await;

        for handle in handles {
            handle.is_resolved();
        }
        resolved
    }

    /// the number of unresolved lazy exchanges
    pub fn pending_exchanges(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Drop every pooled connection. In-flight exchanges are
    /// unaffected.
    pub fn close(&self) {
        self.pool.clear();
    }

    fn netrc_entries(&self) -> &[NetrcEntry] {
        self.netrc.get_or_init(|| {
            netrc_path()
                .and_then(|path| std::fs::read_to_string(path).ok())
                .map(|content| parse_netrc(&content))
                .unwrap_or_default()
        })
    }

    pub(crate) fn prepare(&self, builder: RequestBuilder) -> Result<PreparedRequest> {
        if let Some(error) = builder.error {
            return Err(error);
        }

        let mut url = builder.url?;
        niquests_http::url_ext::merge_query(
            &mut url,
            builder
                .params
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_deref())),
        );

        let mut headers = self.default_headers.clone();
        headers.insert_all(builder.headers);
        headers.try_insert(KnownHeaderName::UserAgent, USER_AGENT);
        headers.try_insert(KnownHeaderName::Accept, "*/*");
        headers.try_insert(KnownHeaderName::AcceptEncoding, accept_encoding());

        let netrc_auth = url
            .host_str()
            .and_then(|host| netrc_lookup(self.netrc_entries(), host));
        apply_auth(&mut headers, builder.auth.as_ref(), netrc_auth.as_ref());

        let encoded = builder.forms.encode()?;
        if let Some(content_type) = encoded.content_type {
            headers.try_insert(KnownHeaderName::ContentType, content_type);
        }

        let timeout = builder
            .timeout
            .or(self.timeout)
            .unwrap_or_else(|| default_timeout(builder.method));

        // redirects are opt-in for HEAD
        let allow_redirects = builder
            .allow_redirects
            .unwrap_or(builder.method != Method::Head);

        Ok(PreparedRequest {
            method: builder.method,
            url,
            headers,
            body: BodyBlueprint::from_body(encoded.body),
            user_cookies: builder.cookies,
            auth: builder.auth,
            timeout,
            allow_redirects,
            stream: builder.stream,
            verify: builder.verify.unwrap_or(self.verify),
            cert: builder.cert,
            on_informational: builder
                .on_informational
                .or_else(|| self.on_informational.clone()),
        })
    }

    pub(crate) async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let prepared = self.prepare(builder)?;
        self.run(prepared).await
    }

    pub(crate) async fn promise(&self, builder: RequestBuilder) -> Result<LazyResponse> {
        if !self.multiplexed {
            return Err(Error::Other(
                "lazy dispatch requires a session built with_multiplexed(true)".into(),
            ));
        }

        let prepared = self.prepare(builder)?;
        let session = self.clone();
        let (id, slot) = self
            .scheduler
            .register(Box::pin(async move { session.run(prepared).await }));
        Ok(LazyResponse::new(id, slot, Arc::clone(&self.scheduler)))
    }

    async fn run(&self, mut prepared: PreparedRequest) -> Result<Response> {
        let mut history: Vec<Response> = vec![];
        let mut redirects = 0usize;

        loop {
            let mut response = self.dispatch(&mut prepared).await?;

            self.jar
                .store_response(&prepared.url, response.headers())
                .await;
            self.altsvc.observe(&prepared.url, response.headers());

            if prepared.allow_redirects && redirect::is_followable(response.status()) {
                if let Some(target) = redirect::redirect_target(&prepared.url, response.headers())
                {
                    let target = target?;
                    redirects += 1;
                    if redirects > self.redirect_policy.max_redirects {
                        return Err(Error::TooManyRedirects(self.redirect_policy.max_redirects));
                    }

                    log::debug!("following {} redirect to {target}", response.status());
                    let status = response.status();
                    response.close().await;
                    history.push(response);
                    redirect::apply_redirect(
                        &mut prepared,
                        &self.redirect_policy,
                        status,
                        target,
                    );
                    continue;
                }
            }

            response.set_history(history);

            if !prepared.stream {
                response.content().await?;
            }

            for hook in &self.hooks {
                hook(&mut response);
            }

            return Ok(response);
        }
    }

    fn connect_config(&self, prepared: &PreparedRequest) -> ConnectConfig {
        ConnectConfig {
            resolver: self.resolver.clone(),
            family: self.family,
            version_ceiling: self.version_ceiling,
            verify: prepared.verify,
            client_cert: prepared.cert.clone(),
            connect_timeout: Some(prepared.timeout),
        }
    }

    async fn dispatch(&self, prepared: &mut PreparedRequest) -> Result<Response> {
        let origin = prepared.url.origin();

        let mut headers = prepared.headers.clone();
        if let Some(cookie) = self
            .jar
            .cookie_header(&prepared.url, &prepared.user_cookies)
            .await
        {
            headers.insert(KnownHeaderName::Cookie, cookie);
        }

        let config = self.connect_config(prepared);
        let replayable = !matches!(prepared.body, BodyBlueprint::Streaming(_));

        // 1. an unexpired alt-svc h3 offer is tried first
        if replayable
            && prepared.url.scheme() == "https"
            && self.version_ceiling >= Version::Http3
            && self.connector.supports("https", Version::Http3)
        {
            if let Some(entry) = self.altsvc.lookup(&origin) {
                if let Some(response) = self
                    .h3_upgrade(&origin, entry, prepared, &headers, &config)
                    .await?
                {
                    return Ok(response);
                }
            }
        }

        // 2. a pooled mux connection, waiting for stream capacity
        if let Some(connection) = self.pool.mux(&origin) {
            if let Some(guard) = connection.reserve().await {
                match self
                    .mux_exchange(connection, guard, prepared, headers.clone())
                    .await
                {
                    Ok(response) => return Ok(response),
                    Err(MuxSendError::BeforeBytes(e)) if replayable => {
                        log::debug!("pooled mux connection unusable ({e}), dialing fresh");
                        self.pool.remove_mux(&origin);
                    }
                    Err(e) => return Err(e.into_error()),
                }
            } else {
                self.pool.remove_mux(&origin);
            }
        }

        // 3. a pooled idle http/1 transport that still reads as open
        while let Some(transport) = self.pool.checkout_h1(&origin) {
            if let Some(transport) = probe(transport).await {
                return self
                    .h1_exchange(prepared, headers, transport, false, origin)
                    .await;
            }
        }

        // 4. a fresh dial, possibly through a proxy
        let proxy = self.proxies.proxy_for(&prepared.url).cloned();
        let dial_url = proxy.clone().unwrap_or_else(|| prepared.url.clone());
        if proxy.is_some() && prepared.url.scheme() != "http" {
            // CONNECT tunneling belongs to a connector capability
            log::debug!("no https proxy tunneling support in this connector, dialing direct");
        }

        let established = match &proxy {
            Some(_) if prepared.url.scheme() == "http" => {
                if let Some(value) = proxy.as_ref().and_then(proxy_authorization) {
                    headers.insert(KnownHeaderName::ProxyAuthorization, value);
                }
                self.connector.connect(&dial_url, &config).await?
            }
            _ => self.connector.connect(&prepared.url, &config).await?,
        };

        match established {
            Established::Http1(transport) => {
                let proxied = proxy.is_some() && prepared.url.scheme() == "http";
                self.h1_exchange(prepared, headers, transport, proxied, origin)
                    .await
            }
            Established::Mux(connection) => {
                self.pool.store_mux(origin.clone(), connection.clone());
                let version = connection.version();
                let guard = connection.try_reserve().ok_or_else(|| {
                    Error::Connection("negotiated connection admits no streams".into())
                })?;

                match self
                    .mux_exchange(connection, guard, prepared, headers.clone())
                    .await
                {
                    Ok(response) => Ok(response),
                    Err(MuxSendError::BeforeBytes(e))
                        if version == Version::Http3 && replayable =>
                    {
                        // an h3 dial that produced no bytes retries on
                        // an older version
                        log::debug!("h3 exchange failed before any bytes ({e}), retrying on h2/h1");
                        self.pool.remove_mux(&origin);
                        self.retry_below_h3(prepared, headers, origin).await
                    }
                    Err(e) => Err(e.into_error()),
                }
            }
        }
    }

    async fn retry_below_h3(
        &self,
        prepared: &mut PreparedRequest,
        headers: Headers,
        origin: Origin,
    ) -> Result<Response> {
        let mut config = self.connect_config(prepared);
        config.version_ceiling = Version::Http2;

        match self.connector.connect(&prepared.url, &config).await? {
            Established::Http1(transport) => {
                self.h1_exchange(prepared, headers, transport, false, origin)
                    .await
            }
            Established::Mux(connection) => {
                self.pool.store_mux(origin.clone(), connection.clone());
                let guard = connection.try_reserve().ok_or_else(|| {
                    Error::Connection("negotiated connection admits no streams".into())
                })?;
                self.mux_exchange(connection, guard, prepared, headers)
                    .await
                    .map_err(MuxSendError::into_error)
            }
        }
    }

    async fn h3_upgrade(
        &self,
        origin: &Origin,
        entry: crate::altsvc::AltSvcEntry,
        prepared: &mut PreparedRequest,
        headers: &Headers,
        config: &ConnectConfig,
    ) -> Result<Option<Response>> {
        let mut dial_url = prepared.url.clone();
        if dial_url.set_host(Some(&entry.host)).is_err()
            || dial_url.set_port(Some(entry.port)).is_err()
        {
            self.altsvc.invalidate(origin);
            return Ok(None);
        }

        log::debug!("attempting alt-svc h3 upgrade via {}:{}", entry.host, entry.port);

        let connection = match self.connector.connect(&dial_url, config).await {
            Ok(Established::Mux(connection)) if connection.version() == Version::Http3 => {
                connection
            }
            Ok(_) => {
                log::debug!("alt-svc dial did not negotiate h3, falling back");
                self.altsvc.invalidate(origin);
                return Ok(None);
            }
            Err(e) => {
                log::debug!("alt-svc h3 dial failed ({e}), falling back");
                self.altsvc.invalidate(origin);
                return Ok(None);
            }
        };

        self.pool.store_mux(origin.clone(), connection.clone());
        let Some(guard) = connection.try_reserve() else {
            return Ok(None);
        };

        match self
            .mux_exchange(connection, guard, prepared, headers.clone())
            .await
        {
            Ok(response) => Ok(Some(response)),
            Err(MuxSendError::BeforeBytes(e)) => {
                log::debug!("h3 exchange failed before any bytes ({e}), falling back");
                self.altsvc.invalidate(origin);
                self.pool.remove_mux(origin);
                Ok(None)
            }
            Err(MuxSendError::AfterBytes(e)) => Err(e),
        }
    }

    async fn h1_exchange(
        &self,
        prepared: &mut PreparedRequest,
        headers: Headers,
        transport: BoxedTransport,
        proxied: bool,
        origin: Origin,
    ) -> Result<Response> {
        let body = prepared.body.take()?;
        let mut exchange =
            H1Exchange::new(prepared.method, prepared.url.clone(), headers, body);
        exchange.set_pool(self.pool.clone());
        exchange.set_proxied(proxied);
        if let Some(callback) = &prepared.on_informational {
            exchange.set_informational_callback(Arc::clone(callback));
        }

        crate::connector::timeout(prepared.timeout, "read", exchange.send(transport)).await?;

        let status = exchange.status().ok_or(Error::InvalidHead)?;
        let version = exchange.version();
        let reason = exchange.reason().map(String::from);
        let response_headers = exchange.response_headers().clone();
        let body = exchange.into_body(origin);

        let mut response = Response::new(
            status,
            version,
            response_headers,
            prepared.url.clone(),
            BodyCursor::H1(body),
        );
        response.set_reason(reason);
        response.set_read_timeout(Some(prepared.timeout));
        Ok(response)
    }

    async fn mux_exchange(
        &self,
        connection: MuxConnection,
        guard: crate::driver::StreamGuard,
        prepared: &mut PreparedRequest,
        mut headers: Headers,
    ) -> std::result::Result<Response, MuxSendError> {
        let body = prepared.body.take().map_err(MuxSendError::BeforeBytes)?;

        if let Some(len) = body.as_ref().and_then(Body::len) {
            if len > 0 {
                headers.insert(KnownHeaderName::ContentLength, len);
            }
        }

        let head = RequestHead {
            method: prepared.method,
            url: prepared.url.clone(),
            headers,
        };

        let mut exchange = MuxExchange::new(connection, head, body);
        if let Some(callback) = &prepared.on_informational {
            exchange.set_informational_callback(Arc::clone(callback));
        }

        let window = prepared.timeout;
        let deadline = async {
            async_io::Timer::after(window).await;
            Err(MuxSendError::AfterBytes(Error::TimedOut("read", window)))
        };

        let outcome = exchange.send(guard).or(deadline).await?;

        let mut response = Response::new(
            outcome.status,
            outcome.version,
            outcome.headers,
            prepared.url.clone(),
            BodyCursor::Mux(outcome.body),
        );
        response.set_read_timeout(Some(window));
        Ok(response)
    }
}

/// An idle pooled transport is only reusable while its read side
/// stays quiet: pending means open, anything else means the peer
/// closed it or spoke out of turn.
async fn probe(mut transport: BoxedTransport) -> Option<BoxedTransport> {
    let mut byte = [0u8];
    if poll_once(transport.read(&mut byte)).await.is_none() {
        Some(transport)
    } else {
        None
    }
}
