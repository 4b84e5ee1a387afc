//! The unified response object.
//!
//! A response owns either its body bytes (after an eager or cached
//! read) or a live stream cursor on the originating connection, never
//! both. Exhausting or closing the cursor is what returns an http/1
//! connection to the pool and releases a mux stream slot.

use crate::{
    decoder::{content_codings, decode_reader, BoxedBodyReader, TimedReader},
    driver::MuxBody,
    util::detect_encoding,
    Result,
};
use encoding_rs::Encoding;
use futures_lite::{AsyncRead, AsyncReadExt};
use memchr::memchr;
use niquests_http::{
    transport::BoxedTransport,
    typed::{typed_header, AltSvc, ContentType, SetCookieField, TypedHeader},
    Error, Headers, KnownHeaderName, ReceivedBody, Status, Version,
};
use std::{
    fmt::{self, Debug, Formatter},
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};
use url::Url;

const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// A raw, undecoded body stream from either protocol family.
pub enum BodyCursor {
    /// http/1 content-length or chunked body borrowed into ownership
    /// of the transport
    H1(ReceivedBody<'static, BoxedTransport>),
    /// a logical mux stream body
    Mux(MuxBody),
}

impl Debug for BodyCursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BodyCursor::H1(body) => f.debug_tuple("BodyCursor::H1").field(body).finish(),
            BodyCursor::Mux(body) => f.debug_tuple("BodyCursor::Mux").field(body).finish(),
        }
    }
}

impl AsyncRead for BodyCursor {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            BodyCursor::H1(body) => Pin::new(body).poll_read(cx, buf),
            BodyCursor::Mux(body) => Pin::new(body).poll_read(cx, buf),
        }
    }
}

#[derive(Debug)]
enum BodyState {
    /// body bytes fully in memory, already decompressed
    Eager(Vec<u8>),
    /// a live cursor not yet read
    Streaming(BodyCursor),
    /// the cursor was handed out through `iter_content`/`raw`
    Consumed,
    /// `close` relinquished the cursor
    Closed,
}

/// An http response: status, negotiated version, headers, terminal
/// url, redirect history, and a body that is either buffered bytes or
/// a live stream.
pub struct Response {
    status: Status,
    reason: Option<String>,
    version: Version,
    headers: Headers,
    url: Url,
    history: Vec<Response>,
    body: BodyState,
    encoding_override: Option<&'static Encoding>,
    trailers: Option<Arc<Mutex<Option<Headers>>>>,
    read_timeout: Option<Duration>,
}

impl Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("history", &self.history.len())
            .field("body", &self.body)
            .finish()
    }
}

impl Response {
    pub(crate) fn new(
        status: Status,
        version: Version,
        headers: Headers,
        url: Url,
        cursor: BodyCursor,
    ) -> Self {
        let trailers = match &cursor {
            BodyCursor::Mux(body) => Some(body.trailers_cell()),
            BodyCursor::H1(_) => None,
        };

        Self {
            status,
            reason: None,
            version,
            headers,
            url,
            history: vec![],
            body: BodyState::Streaming(cursor),
            encoding_override: None,
            trailers,
            read_timeout: None,
        }
    }

    pub(crate) fn set_reason(&mut self, reason: Option<String>) {
        self.reason = reason;
    }

    pub(crate) fn set_history(&mut self, history: Vec<Response>) {
        self.history = history;
    }

    pub(crate) fn set_read_timeout(&mut self, read_timeout: Option<Duration>) {
        self.read_timeout = read_timeout;
    }

    /// the response status code
    pub fn status(&self) -> Status {
        self.status
    }

    /// The reason phrase the server sent, or the canonical phrase for
    /// the status. Informational only.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason())
    }

    /// the negotiated http version this response arrived over
    pub fn version(&self) -> Version {
        self.version
    }

    /// the response headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The terminal url of the exchange, after any redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// every prior response in the redirect chain, oldest first
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    /// trailers, when the protocol delivered any after end-of-body
    pub fn trailers(&self) -> Option<Headers> {
        self.trailers
            .as_ref()
            .and_then(|cell| cell.lock().unwrap().clone())
    }

    /// the character encoding that will be used to decode `text`, if
    /// one has been set or detected
    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.encoding_override
    }

    /// override the character encoding used by [`Response::text`]
    pub fn set_encoding(&mut self, encoding: &'static Encoding) {
        self.encoding_override = Some(encoding);
    }

    /// whether the body has been read into memory
    pub fn is_loaded(&self) -> bool {
        matches!(self.body, BodyState::Eager(_))
    }

    fn take_cursor(&mut self, next: BodyState) -> Result<BodyCursor> {
        match std::mem::replace(&mut self.body, next) {
            BodyState::Streaming(cursor) => Ok(cursor),
            other => {
                self.body = other;
                Err(Error::StreamConsumed)
            }
        }
    }

    fn decoded_reader(&mut self) -> Result<BoxedBodyReader> {
        let read_timeout = self.read_timeout;
        let codings = content_codings(&self.headers);
        let cursor = self.take_cursor(BodyState::Consumed)?;
        Ok(decode_reader(
            &codings,
            TimedReader::new(cursor, read_timeout),
        ))
    }

    /// Materialize the full decompressed body into memory, caching
    /// it. Subsequent calls return the cached bytes.
    ///
    /// # Errors
    ///
    /// Errors if the stream cursor was already handed out, on io
    /// failure, or on read-inactivity timeout.
    pub async fn content(&mut self) -> Result<&[u8]> {
        if let BodyState::Streaming(_) = self.body {
            let mut reader = self.decoded_reader()?;
            let mut content = Vec::new();
            reader
                .read_to_end(&mut content)
                .await
                .map_err(|e| self.map_body_error(e))?;
            self.body = BodyState::Eager(content);
        }

        match &self.body {
            BodyState::Eager(content) => Ok(content),
            _ => Err(Error::StreamConsumed),
        }
    }

    fn map_body_error(&self, error: io::Error) -> Error {
        if error.kind() == io::ErrorKind::TimedOut {
            Error::TimedOut(
                "read",
                self.read_timeout.unwrap_or(Duration::from_secs(0)),
            )
        } else {
            Error::Io(error)
        }
    }

    /// Decode the body as text: an explicit
    /// [`set_encoding`][Response::set_encoding] wins, then the
    /// content-type charset, then a byte-order mark, then a utf-8
    /// confidence check. Returns `None` when no encoding can be
    /// determined with confidence.
    pub async fn text(&mut self) -> Result<Option<String>> {
        let encoding_override = self.encoding_override;
        let headers = self.headers.clone();
        let content = self.content().await?;

        let encoding = match encoding_override {
            Some(encoding) => Some(encoding),
            None => detect_encoding(&headers, content),
        };

        Ok(encoding.map(|encoding| {
            let (text, _, _) = encoding.decode(content);
            text.into_owned()
        }))
    }

    /// Deserialize the body as JSON. The response `Content-Type` must
    /// indicate JSON (`application/json` or a `+json` suffix);
    /// anything else fails with a json error, as do malformed bytes.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let is_json = self
            .oheaders()
            .content_type()
            .is_some_and(|content_type| content_type.is_json());

        if !is_json {
            return Err(Error::Json(format!(
                "content-type {:?} does not indicate json",
                self.headers.get_str(KnownHeaderName::ContentType)
            )));
        }

        let content = self.content().await?;
        serde_json::from_slice(content).map_err(|e| Error::Json(e.to_string()))
    }

    /// Stream the decompressed body in chunks of at most
    /// `chunk_size` bytes (default 8 KiB). The stream is finite and
    /// not restartable; a second call fails with
    /// [`Error::StreamConsumed`]. Exhausting it releases the
    /// underlying connection back to the pool.
    pub fn iter_content(&mut self, chunk_size: Option<usize>) -> Result<BodyIter> {
        let reader = self.decoded_reader()?;
        Ok(BodyIter {
            reader,
            chunk_size: chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
            done: false,
        })
    }

    /// Like [`Response::iter_content`], framed on newlines.
    pub fn iter_lines(&mut self, chunk_size: Option<usize>, keepends: bool) -> Result<LineIter> {
        Ok(LineIter {
            chunks: self.iter_content(chunk_size)?,
            buffer: Vec::new(),
            keepends,
            done: false,
        })
    }

    /// The raw stream cursor, without decompression. Consumes the
    /// body like [`Response::iter_content`].
    pub fn raw(&mut self) -> Result<BodyCursor> {
        self.take_cursor(BodyState::Consumed)
    }

    /// a typed, attribute-addressable view over the headers
    pub fn oheaders(&self) -> OHeaders<'_> {
        OHeaders {
            headers: &self.headers,
        }
    }

    /// Returns the response unchanged for non-error statuses, and
    /// fails with [`Error::Status`] for 4xx and 5xx.
    pub fn raise_for_status(self) -> Result<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            Err(Error::Status(self.status, self.url.clone()))
        } else {
            Ok(self)
        }
    }

    /// Relinquish the stream cursor. An http/1 cursor is drained so
    /// its connection can return to the pool; a mux cursor resets its
    /// stream. Idempotent.
    pub async fn close(&mut self) {
        match std::mem::replace(&mut self.body, BodyState::Closed) {
            BodyState::Streaming(BodyCursor::H1(body)) => match body.drain().await {
                Ok(bytes) => log::debug!("drained {bytes} bytes to recycle connection"),
                Err(e) => log::debug!("failed to drain body: {e}"),
            },
            BodyState::Streaming(BodyCursor::Mux(body)) => drop(body),
            BodyState::Eager(content) => self.body = BodyState::Eager(content),
            BodyState::Consumed | BodyState::Closed => {}
        }
    }
}

/// Chunked access to a response body. See
/// [`Response::iter_content`].
pub struct BodyIter {
    reader: BoxedBodyReader,
    chunk_size: usize,
    done: bool,
}

impl Debug for BodyIter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyIter")
            .field("chunk_size", &self.chunk_size)
            .field("done", &self.done)
            .finish()
    }
}

impl BodyIter {
    /// The next chunk, or `None` after end-of-body.
    pub async fn next(&mut self) -> Option<io::Result<Vec<u8>>> {
        if self.done {
            return None;
        }

        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0;

        while filled < self.chunk_size {
            match self.reader.read(&mut chunk[filled..]).await {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(bytes) => filled += bytes,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if filled == 0 {
            None
        } else {
            chunk.truncate(filled);
            Some(Ok(chunk))
        }
    }
}

/// Line-framed access to a response body. See
/// [`Response::iter_lines`].
#[derive(Debug)]
pub struct LineIter {
    chunks: BodyIter,
    buffer: Vec<u8>,
    keepends: bool,
    done: bool,
}

impl LineIter {
    /// The next line, or `None` once the body and any unterminated
    /// tail are exhausted.
    pub async fn next(&mut self) -> Option<io::Result<Vec<u8>>> {
        loop {
            if let Some(newline) = memchr(b'\n', &self.buffer) {
                let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
                if !self.keepends {
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                }
                return Some(Ok(line));
            }

            if self.done {
                if self.buffer.is_empty() {
                    return None;
                }
                return Some(Ok(std::mem::take(&mut self.buffer)));
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => self.done = true,
            }
        }
    }
}

/// A deserialized, attribute-addressable view of response headers.
/// Lookups are case-insensitive; well-known headers parse into typed
/// shapes and unknown headers surface as raw strings.
#[derive(Debug, Clone, Copy)]
pub struct OHeaders<'a> {
    headers: &'a Headers,
}

impl OHeaders<'_> {
    /// the typed value for any header name
    pub fn get(&self, name: &str) -> Option<TypedHeader> {
        typed_header(self.headers, name)
    }

    /// `Content-Type`, with parameter access such as
    /// `content_type().and_then(|c| c.charset())`
    pub fn content_type(&self) -> Option<ContentType> {
        match self.get("content-type") {
            Some(TypedHeader::ContentType(content_type)) => Some(content_type),
            _ => None,
        }
    }

    /// `Date` as a parsed timestamp
    pub fn date(&self) -> Option<std::time::SystemTime> {
        match self.get("date") {
            Some(TypedHeader::Date(date)) => Some(date),
            _ => None,
        }
    }

    /// parsed `Alt-Svc` offers
    pub fn alt_svc(&self) -> Option<AltSvc> {
        match self.get("alt-svc") {
            Some(TypedHeader::AltSvc(alt_svc)) => Some(alt_svc),
            _ => None,
        }
    }

    /// every `Set-Cookie` field, structurally split
    pub fn set_cookie(&self) -> Vec<SetCookieField> {
        self.headers
            .get_values(KnownHeaderName::SetCookie)
            .into_iter()
            .flatten()
            .filter_map(|value| {
                let mut headers = Headers::new();
                headers.insert(KnownHeaderName::SetCookie, value.clone());
                match typed_header(&headers, "set-cookie") {
                    Some(TypedHeader::SetCookie(field)) => Some(field),
                    _ => None,
                }
            })
            .collect()
    }

    /// parsed `Report-To` descriptor
    pub fn report_to(&self) -> Option<niquests_http::typed::ReportTo> {
        match self.get("report-to") {
            Some(TypedHeader::ReportTo(report_to)) => Some(report_to),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_lite::future::block_on;
    use niquests_http::{synthetic::TestTransport, Buffer, ReceivedBodyState};

    fn h1_response(headers: Vec<(&'static str, &'static str)>, body: &str) -> Response {
        let (client, server) = TestTransport::new();
        server.append(body);
        server.close();

        let mut header_map = Headers::new();
        let mut content_length_set = false;
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("content-length") {
                content_length_set = true;
            }
            header_map.insert(name, value);
        }

        let content_length = if content_length_set {
            header_map
                .get_str(KnownHeaderName::ContentLength)
                .and_then(|v| v.parse().ok())
        } else {
            Some(body.len() as u64)
        };

        let received = ReceivedBody::new(
            content_length,
            Buffer::default(),
            BoxedTransport::new(client),
            ReceivedBodyState::Start,
            None,
            encoding_rs::UTF_8,
        );

        Response::new(
            Status::Ok,
            Version::Http1_1,
            header_map,
            Url::parse("http://example.test/").unwrap(),
            BodyCursor::H1(received),
        )
    }

    #[test]
    fn content_caches() {
        block_on(async {
            let mut response = h1_response(vec![], "hello");
            assert_eq!(response.content().await.unwrap(), b"hello");
            assert_eq!(response.content().await.unwrap(), b"hello");
            assert!(response.is_loaded());
        });
    }

    #[test]
    fn text_decodes_utf8_with_confidence() {
        block_on(async {
            let mut response = h1_response(vec![], "héllo");
            assert_eq!(response.text().await.unwrap().as_deref(), Some("héllo"));
        });
    }

    #[test]
    fn text_honors_charset_header() {
        block_on(async {
            let (client, server) = TestTransport::new();
            server.append([0xE9, 0x74, 0xE9]); // "été" in latin-1
            server.close();

            let mut headers = Headers::new();
            headers.insert(
                KnownHeaderName::ContentType,
                "text/plain; charset=iso-8859-1",
            );
            let received = ReceivedBody::new(
                Some(3),
                Buffer::default(),
                BoxedTransport::new(client),
                ReceivedBodyState::Start,
                None,
                encoding_rs::WINDOWS_1252,
            );
            let mut response = Response::new(
                Status::Ok,
                Version::Http1_1,
                headers,
                Url::parse("http://example.test/").unwrap(),
                BodyCursor::H1(received),
            );

            assert_eq!(response.text().await.unwrap().as_deref(), Some("été"));
        });
    }

    #[test]
    fn undecodable_text_is_none() {
        block_on(async {
            let (client, server) = TestTransport::new();
            server.append([0x93, 0x81, 0xff, 0x00]);
            server.close();

            let received = ReceivedBody::new(
                Some(4),
                Buffer::default(),
                BoxedTransport::new(client),
                ReceivedBodyState::Start,
                None,
                encoding_rs::UTF_8,
            );
            let mut response = Response::new(
                Status::Ok,
                Version::Http1_1,
                Headers::new(),
                Url::parse("http://example.test/").unwrap(),
                BodyCursor::H1(received),
            );

            assert_eq!(response.text().await.unwrap(), None);
        });
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_requires_a_json_media_type() {
        block_on(async {
            let mut response =
                h1_response(vec![("content-type", "text/plain")], r#"{"some":"data"}"#);
            let error = response.json::<serde_json::Value>().await.unwrap_err();
            assert!(matches!(error, Error::Json(_)));

            let mut response = h1_response(
                vec![("content-type", "application/json")],
                r#"{"some":"data"}"#,
            );
            let value: serde_json::Value = response.json().await.unwrap();
            assert_eq!(value["some"], "data");
        });
    }

    #[test]
    fn iter_content_chunks_and_refuses_reuse() {
        block_on(async {
            let mut response = h1_response(vec![], "abcdefghij");
            let mut iter = response.iter_content(Some(4)).unwrap();
            assert_eq!(iter.next().await.unwrap().unwrap(), b"abcd");
            assert_eq!(iter.next().await.unwrap().unwrap(), b"efgh");
            assert_eq!(iter.next().await.unwrap().unwrap(), b"ij");
            assert!(iter.next().await.is_none());

            assert!(matches!(
                response.iter_content(None),
                Err(Error::StreamConsumed)
            ));
        });
    }

    #[test]
    fn iter_lines_frames_and_handles_tails() {
        block_on(async {
            let mut response = h1_response(vec![], "alpha\r\nbeta\ngamma");
            let mut lines = response.iter_lines(None, false).unwrap();
            assert_eq!(lines.next().await.unwrap().unwrap(), b"alpha");
            assert_eq!(lines.next().await.unwrap().unwrap(), b"beta");
            assert_eq!(lines.next().await.unwrap().unwrap(), b"gamma");
            assert!(lines.next().await.is_none());
        });
    }

    #[test]
    fn raise_for_status_classifies() {
        let response = h1_response(vec![], "");
        assert!(response.raise_for_status().is_ok());

        let mut response = h1_response(vec![], "");
        response.status = Status::NotFound;
        let error = response.raise_for_status().unwrap_err();
        assert_eq!(error.status(), Some(Status::NotFound));
    }

    #[test]
    fn close_is_idempotent() {
        block_on(async {
            let mut response = h1_response(vec![], "leftover body");
            response.close().await;
            response.close().await;
            assert!(matches!(
                response.content().await,
                Err(Error::StreamConsumed)
            ));
        });
    }

    #[test]
    fn oheaders_typed_access() {
        let response = h1_response(
            vec![
                ("content-type", "text/html; charset=utf-8"),
                ("date", "Sun, 06 Nov 1994 08:49:37 GMT"),
            ],
            "",
        );

        let oheaders = response.oheaders();
        assert_eq!(
            oheaders.content_type().and_then(|c| c.charset().map(String::from)),
            Some("utf-8".to_string())
        );
        assert!(oheaders.date().is_some());
        assert!(matches!(
            oheaders.get("x-unknown"),
            None
        ));
    }
}
