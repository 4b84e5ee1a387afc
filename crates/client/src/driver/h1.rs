use super::InformationalCallback;
use crate::{pool::PoolEntry, util::header_encoding, Pool, Result};
use futures_lite::{AsyncReadExt, AsyncWriteExt, io};
use memchr::memmem::Finder;
use niquests_http::{
    Body, BodyEncoder, Buffer, Error, Headers, HeaderName, HeaderValue, KnownHeaderName::{
        Connection, ContentLength, Expect, Host, ProxyConnection, TransferEncoding,
    },
    Method, ReceivedBody, ReceivedBodyState, Status, Version,
    transport::BoxedTransport,
};
use std::{fmt::{self, Debug, Formatter}, io::Write, str::FromStr};
use url::{Origin, Url};

const MAX_HEADERS: usize = 128;

/// One http/1.1 exchange: head serialization, the optional
/// `100-continue` dance, interim-response delivery, final-head
/// parsing, and hand-off of the transport to a body cursor that
/// recycles it into the pool.
pub(crate) struct H1Exchange {
    url: Url,
    method: Method,
    request_headers: Headers,
    response_headers: Headers,
    transport: Option<BoxedTransport>,
    status: Option<Status>,
    reason: Option<String>,
    version: Version,
    request_body: Option<Body>,
    buffer: Buffer,
    response_body_state: ReceivedBodyState,
    max_head_length: usize,
    pool: Option<Pool>,
    on_informational: Option<InformationalCallback>,
    headers_finalized: bool,
    proxied: bool,
}

impl Debug for H1Exchange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("H1Exchange")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("request_headers", &self.request_headers)
            .field("response_headers", &self.response_headers)
            .field("status", &self.status)
            .field("buffer", &String::from_utf8_lossy(&self.buffer))
            .field("response_body_state", &self.response_body_state)
            .finish()
    }
}

impl H1Exchange {
    pub(crate) fn new(
        method: Method,
        url: Url,
        request_headers: Headers,
        request_body: Option<Body>,
    ) -> Self {
        Self {
            url,
            method,
            request_headers,
            response_headers: Headers::new(),
            transport: None,
            status: None,
            reason: None,
            version: Version::Http1_1,
            request_body,
            buffer: Buffer::default(),
            response_body_state: ReceivedBodyState::Start,
            max_head_length: 8 * 1024,
            pool: None,
            on_informational: None,
            headers_finalized: false,
            proxied: false,
        }
    }

    pub(crate) fn set_pool(&mut self, pool: Pool) {
        self.pool = Some(pool);
    }

    /// use absolute-form request targets, as required when talking
    /// through an http proxy
    pub(crate) fn set_proxied(&mut self, proxied: bool) {
        self.proxied = proxied;
    }

    pub(crate) fn set_informational_callback(&mut self, callback: InformationalCallback) {
        self.on_informational = Some(callback);
    }

    pub(crate) fn status(&self) -> Option<Status> {
        self.status
    }

    pub(crate) fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub(crate) fn response_headers(&self) -> &Headers {
        &self.response_headers
    }

    pub(crate) fn version(&self) -> Version {
        self.version
    }

    fn finalize_headers(&mut self) -> Result<()> {
        if self.headers_finalized {
            return Ok(());
        }

        let host = self.url.host_str().ok_or(Error::UnexpectedUriFormat)?;

        self.request_headers.try_insert_with(Host, || {
            self.url
                .port()
                .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"))
        });

        if self.pool.is_none() {
            self.request_headers.try_insert(Connection, "close");
        } else {
            self.request_headers.try_insert(Connection, "keep-alive");
        }

        if self.method == Method::Connect {
            self.request_headers
                .try_insert(ProxyConnection, "keep-alive");
        }

        match self.body_len() {
            Some(0) => {}
            Some(len) => {
                self.request_headers.insert(Expect, "100-continue");
                self.request_headers.insert(ContentLength, len);
            }
            None => {
                self.request_headers.insert(Expect, "100-continue");
                self.request_headers.insert(TransferEncoding, "chunked");
            }
        }

        self.headers_finalized = true;
        Ok(())
    }

    fn body_len(&self) -> Option<u64> {
        if let Some(ref body) = self.request_body {
            body.len()
        } else {
            Some(0)
        }
    }

    pub(crate) fn build_head(&mut self) -> Result<Vec<u8>> {
        self.finalize_headers()?;

        let mut buf = Vec::with_capacity(128);
        let url = &self.url;
        let method = self.method;
        write!(buf, "{method} ")?;

        if method == Method::Connect {
            let host = url.host_str().ok_or(Error::UnexpectedUriFormat)?;

            let port = url
                .port_or_known_default()
                .ok_or(Error::UnexpectedUriFormat)?;

            write!(buf, "{host}:{port}")?;
        } else if self.proxied {
            write!(buf, "{}", url.as_str())?;
        } else {
            write!(buf, "{}", url.path())?;
            if let Some(query) = url.query() {
                write!(buf, "?{query}")?;
            }
        }

        write!(buf, " HTTP/1.1\r\n")?;

        for (name, values) in &self.request_headers {
            if !name.is_valid() {
                return Err(Error::InvalidHeaderName);
            }

            for value in values {
                if !value.is_valid() {
                    return Err(Error::InvalidHeaderValue(name.to_owned()));
                }
                write!(buf, "{name}: ")?;
                buf.extend_from_slice(value.as_ref());
                write!(buf, "\r\n")?;
            }
        }

        write!(buf, "\r\n")?;
        log::trace!(
            "{}",
            String::from_utf8_lossy(&buf).replace("\r\n", "\r\n> ")
        );

        Ok(buf)
    }

    /// Send this exchange over an already-connected transport. The
    /// head must not yet have been written.
    pub(crate) async fn send(&mut self, mut transport: BoxedTransport) -> Result<()> {
        let head = self.build_head()?;
        transport.write_all(&head).await?;
        self.transport = Some(transport);
        self.send_body_and_parse_head().await
    }

    fn transport(&mut self) -> &mut BoxedTransport {
        self.transport.as_mut().expect("transport was attached in send")
    }

    async fn read_head(&mut self) -> Result<usize> {
        let Self {
            buffer,
            transport: Some(transport),
            ..
        } = self
        else {
            return Err(Error::Closed);
        };

        let mut len = buffer.len();
        let mut search_start = 0;
        let finder = Finder::new(b"\r\n\r\n");

        if len > 0 {
            if let Some(index) = finder.find(buffer) {
                return Ok(index + 4);
            }
            search_start = len.saturating_sub(3);
        }

        loop {
            buffer.expand();
            let bytes = transport.read(&mut buffer[len..]).await?;
            len += bytes;

            let search = finder.find(&buffer[search_start..len]);

            if let Some(index) = search {
                buffer.truncate(len);
                return Ok(search_start + index + 4);
            }

            search_start = len.saturating_sub(3);

            if bytes == 0 {
                if len == 0 {
                    return Err(Error::Closed);
                } else {
                    return Err(Error::InvalidHead);
                }
            }

            if len >= self.max_head_length {
                return Err(Error::HeadersTooLong);
            }
        }
    }

    async fn parse_head(&mut self) -> Result<()> {
        let head_offset = self.read_head().await?;
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut httparse_res = httparse::Response::new(&mut headers);
        let parse_result = httparse_res
            .parse(&self.buffer[..head_offset])
            .map_err(|e| match e {
                httparse::Error::HeaderName => Error::InvalidHeaderName,
                httparse::Error::HeaderValue => Error::InvalidHeaderValue("unknown".into()),
                httparse::Error::Status => Error::InvalidStatus,
                httparse::Error::TooManyHeaders => Error::HeadersTooLong,
                httparse::Error::Version => Error::InvalidVersion,
                _ => Error::InvalidHead,
            })?;

        match parse_result {
            httparse::Status::Complete(n) if n == head_offset => {}
            _ => return Err(Error::InvalidHead),
        }

        log::trace!(
            "{}",
            String::from_utf8_lossy(&self.buffer[..head_offset]).replace("\r\n", "\r\n< ")
        );

        self.status = match httparse_res.code {
            Some(code) => Some(Status::try_from(code)?),
            None => None,
        };
        self.reason = httparse_res.reason.map(String::from);
        self.version = match httparse_res.version {
            Some(0) => Version::Http1_0,
            _ => Version::Http1_1,
        };

        self.response_headers = Headers::new();
        for header in httparse_res.headers.iter() {
            let header_name = HeaderName::from_str(header.name)?;
            let header_value = HeaderValue::from(header.value.to_owned());
            self.response_headers.append(header_name, header_value);
        }

        self.buffer.ignore_front(head_offset);

        self.validate_response_headers()?;
        Ok(())
    }

    async fn send_body_and_parse_head(&mut self) -> Result<()> {
        if self
            .request_headers
            .eq_ignore_ascii_case(Expect, "100-continue")
        {
            log::trace!("Expecting 100-continue");
            self.parse_head().await?;
            if self.status == Some(Status::Continue) {
                self.status = None;
                log::trace!("Received 100-continue, sending request body");
            } else {
                self.request_body.take();
                log::trace!(
                    "Received a status code other than 100-continue, not sending request body"
                );
                return Ok(());
            }
        }

        self.send_body().await?;
        loop {
            self.parse_head().await?;
            match self.status {
                // 101 ends the exchange; the transport is hijackable
                // from the response
                Some(Status::SwitchingProtocols) => break,
                Some(status) if status.is_informational() => {
                    if let Some(callback) = &self.on_informational {
                        callback(status, &self.response_headers);
                    }
                    self.status = None;
                }
                _ => break,
            }
        }

        Ok(())
    }

    async fn send_body(&mut self) -> Result<()> {
        if let Some(body) = self.request_body.take() {
            let mut encoder = BodyEncoder::new(body);
            io::copy(&mut encoder, self.transport()).await?;
        }
        Ok(())
    }

    fn validate_response_headers(&self) -> Result<()> {
        let content_length = self.response_headers.has_header(ContentLength);

        let transfer_encoding_chunked = self
            .response_headers
            .contains_token(TransferEncoding, "chunked");

        if content_length && transfer_encoding_chunked {
            Err(Error::UnexpectedHeader(ContentLength.into()))
        } else {
            Ok(())
        }
    }

    fn is_keep_alive(&self) -> bool {
        match self.version {
            Version::Http1_0 => self
                .response_headers
                .contains_token(Connection, "keep-alive"),
            _ => !self.response_headers.contains_token(Connection, "close"),
        }
    }

    pub(crate) fn response_content_length(&self) -> Option<u64> {
        if self.status == Some(Status::NoContent)
            || self.status == Some(Status::NotModified)
            || self.method == Method::Head
        {
            Some(0)
        } else if self
            .response_headers
            .contains_token(TransferEncoding, "chunked")
        {
            None
        } else {
            // with neither content-length nor chunked transfer
            // encoding, the body runs to connection close; a missing
            // header therefore also means None
            self.response_headers
                .get_str(ContentLength)
                .and_then(|c| c.parse().ok())
        }
    }

    /// Consume the exchange, producing the response body cursor. When
    /// the connection can be kept alive and a pool is attached, the
    /// cursor returns the transport to the pool bucket for `origin`
    /// once the body has been read to its end.
    pub(crate) fn into_body(mut self, origin: Origin) -> ReceivedBody<'static, BoxedTransport> {
        let encoding =
            header_encoding(&self.response_headers).unwrap_or(encoding_rs::WINDOWS_1252);

        let on_completion = if self.is_keep_alive() {
            self.pool
                .take()
                .map(|pool| -> Box<dyn Fn(BoxedTransport) + Send + Sync> {
                    Box::new(move |transport| {
                        pool.release_h1(origin.clone(), PoolEntry::new(transport, None));
                    })
                })
        } else {
            None
        };

        ReceivedBody::new(
            self.response_content_length(),
            std::mem::take(&mut self.buffer),
            self.transport.take().expect("send populated the transport"),
            self.response_body_state,
            on_completion,
            encoding,
        )
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use futures_lite::future::block_on;
    use niquests_http::{synthetic::TestTransport, KnownHeaderName};

    fn exchange_to(url: &str) -> H1Exchange {
        H1Exchange::new(
            Method::Get,
            Url::parse(url).unwrap(),
            Headers::new(),
            None,
        )
    }

    #[test]
    fn head_is_origin_form_with_ordered_headers() {
        let mut exchange = exchange_to("http://example.test/path?q=1");
        exchange
            .request_headers
            .insert(KnownHeaderName::UserAgent, "niquests-test");
        let head = String::from_utf8(exchange.build_head().unwrap()).unwrap();

        assert!(head.starts_with("GET /path?q=1 HTTP/1.1\r\n"));
        assert!(head.contains("host: example.test\r\n") || head.contains("Host: example.test\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn proxied_head_is_absolute_form() {
        let mut exchange = exchange_to("http://example.test/path");
        exchange.set_proxied(true);
        let head = String::from_utf8(exchange.build_head().unwrap()).unwrap();
        assert!(head.starts_with("GET http://example.test/path HTTP/1.1\r\n"));
    }

    #[test]
    fn connect_head_is_authority_form() {
        let mut exchange = H1Exchange::new(
            Method::Connect,
            Url::parse("https://example.test").unwrap(),
            Headers::new(),
            None,
        );
        let head = String::from_utf8(exchange.build_head().unwrap()).unwrap();
        assert!(head.starts_with("CONNECT example.test:443 HTTP/1.1\r\n"));
    }

    #[test]
    fn simple_response_parses() {
        block_on(async {
            let (client, server) = TestTransport::new();
            server.append("HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nhi");

            let mut exchange = exchange_to("http://example.test/");
            exchange.send(BoxedTransport::new(client)).await.unwrap();

            assert_eq!(exchange.status(), Some(Status::Ok));
            assert_eq!(exchange.response_content_length(), Some(2));
            assert_eq!(
                exchange.response_headers().get_str("content-length"),
                Some("2")
            );

            let origin = Url::parse("http://example.test/").unwrap().origin();
            let body = exchange.into_body(origin);
            assert_eq!(body.read_string().await.unwrap(), "hi");

            let sent = server.snapshot_string();
            assert!(sent.starts_with("GET / HTTP/1.1\r\n"));
        });
    }

    #[test]
    fn informational_heads_are_surfaced_and_skipped() {
        use std::sync::{Arc, Mutex};
        block_on(async {
            let (client, server) = TestTransport::new();
            server.append(
                "HTTP/1.1 103 Early Hints\r\nlink: </style.css>; rel=preload\r\n\r\n\
                 HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n",
            );

            let seen = Arc::new(Mutex::new(vec![]));
            let callback_seen = Arc::clone(&seen);

            let mut exchange = exchange_to("http://example.test/");
            exchange.set_informational_callback(Arc::new(move |status, headers| {
                callback_seen
                    .lock()
                    .unwrap()
                    .push((status, headers.get_str("link").map(String::from)));
            }));
            exchange.send(BoxedTransport::new(client)).await.unwrap();

            assert_eq!(exchange.status(), Some(Status::Ok));
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].0, Status::EarlyHints);
            assert_eq!(seen[0].1.as_deref(), Some("</style.css>; rel=preload"));
        });
    }

    #[test]
    fn chunked_response_body() {
        block_on(async {
            let (client, server) = TestTransport::new();
            server.append(
                "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n\
                 5\r\nhello\r\n0\r\n\r\n",
            );

            let mut exchange = exchange_to("http://example.test/");
            exchange.send(BoxedTransport::new(client)).await.unwrap();
            assert_eq!(exchange.response_content_length(), None);

            let origin = Url::parse("http://example.test/").unwrap().origin();
            let body = exchange.into_body(origin);
            assert_eq!(body.read_string().await.unwrap(), "hello");
        });
    }

    #[test]
    fn head_responses_have_no_body() {
        block_on(async {
            let (client, server) = TestTransport::new();
            server.append("HTTP/1.1 200 OK\r\ncontent-length: 5000\r\n\r\n");

            let mut exchange = H1Exchange::new(
                Method::Head,
                Url::parse("http://example.test/").unwrap(),
                Headers::new(),
                None,
            );
            exchange.send(BoxedTransport::new(client)).await.unwrap();
            assert_eq!(exchange.response_content_length(), Some(0));
        });
    }
}
