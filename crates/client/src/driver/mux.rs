use super::{InformationalCallback, MuxSession, MuxStream, RequestHead, ResponseHead, StreamState};
use crate::Result;
use event_listener::Event;
use futures_lite::{ready, AsyncRead, AsyncReadExt};
use niquests_http::{Body, Error, Headers, Status, Version};
use std::{
    fmt::{self, Debug, Formatter},
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};

const SEND_CHUNK_LEN: usize = 16 * 1024;

/// A shared multiplexed connection: one protocol-stack session plus
/// the accounting the pool needs to admit up to
/// `max_concurrent_streams` logical exchanges.
pub struct MuxConnection {
    session: Arc<dyn MuxSession>,
    version: Version,
    inflight: Arc<AtomicU64>,
    capacity: Arc<Event>,
}

impl Debug for MuxConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxConnection")
            .field("version", &self.version)
            .field("inflight", &self.inflight.load(Ordering::Relaxed))
            .field("max_streams", &self.session.max_concurrent_streams())
            .finish()
    }
}

impl Clone for MuxConnection {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            version: self.version,
            inflight: Arc::clone(&self.inflight),
            capacity: Arc::clone(&self.capacity),
        }
    }
}

impl MuxConnection {
    /// wrap a negotiated protocol-stack session
    pub fn new(session: Arc<dyn MuxSession>, version: Version) -> Self {
        Self {
            session,
            version,
            inflight: Arc::new(AtomicU64::new(0)),
            capacity: Arc::new(Event::new()),
        }
    }

    /// the negotiated http version
    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Reserve a stream slot, respecting the peer's advertised
    /// concurrency limit. Returns None at capacity.
    pub(crate) fn try_reserve(&self) -> Option<StreamGuard> {
        let max = self.session.max_concurrent_streams();
        let reserved = self
            .inflight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < max {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok();

        if reserved {
            Some(StreamGuard {
                inflight: Arc::clone(&self.inflight),
                capacity: Arc::clone(&self.capacity),
            })
        } else {
            None
        }
    }

    /// Reserve a stream slot, waiting for one to free up when the
    /// peer's concurrency limit is reached. Returns None once the
    /// session announces shutdown.
    pub(crate) async fn reserve(&self) -> Option<StreamGuard> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(guard) = self.try_reserve() {
                return Some(guard);
            }

            let listener = self.capacity.listen();
            // a slot may have freed between the check and the listen
            if let Some(guard) = self.try_reserve() {
                return Some(guard);
            }
            listener.await;
        }
    }
}

/// Releases a reserved stream slot on drop, waking one waiter.
pub(crate) struct StreamGuard {
    inflight: Arc<AtomicU64>,
    capacity: Arc<Event>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.inflight.fetch_sub(1, Ordering::AcqRel);
        self.capacity.notify(1);
    }
}

impl Debug for StreamGuard {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamGuard").finish()
    }
}

/// A failed mux exchange, split by whether any response bytes had
/// been observed. An http/3 attempt that failed before any bytes is
/// transparently retried on an older protocol version.
#[derive(Debug)]
pub(crate) enum MuxSendError {
    BeforeBytes(Error),
    AfterBytes(Error),
}

impl MuxSendError {
    pub(crate) fn into_error(self) -> Error {
        match self {
            MuxSendError::BeforeBytes(error) | MuxSendError::AfterBytes(error) => error,
        }
    }
}

/// The successful outcome of a mux exchange: the final head plus a
/// body cursor.
#[derive(Debug)]
pub struct MuxOutcome {
    pub(crate) status: Status,
    pub(crate) headers: Headers,
    pub(crate) version: Version,
    pub(crate) body: MuxBody,
}

/// One exchange on a multiplexed connection. The protocol stack owns
/// framing; this state machine owns stream-lifecycle legality and
/// interim-response handling.
pub struct MuxExchange {
    connection: MuxConnection,
    head: RequestHead,
    body: Option<Body>,
    state: StreamState,
    on_informational: Option<InformationalCallback>,
}

impl Debug for MuxExchange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxExchange")
            .field("connection", &self.connection)
            .field("head", &self.head)
            .field("state", &self.state)
            .finish()
    }
}

impl MuxExchange {
    pub(crate) fn new(connection: MuxConnection, head: RequestHead, body: Option<Body>) -> Self {
        Self {
            connection,
            head,
            body,
            state: StreamState::Idle,
            on_informational: None,
        }
    }

    pub(crate) fn set_informational_callback(&mut self, callback: InformationalCallback) {
        self.on_informational = Some(callback);
    }

    pub(crate) async fn send(
        mut self,
        guard: StreamGuard,
    ) -> std::result::Result<MuxOutcome, MuxSendError> {
        if self.connection.is_closed() {
            return Err(MuxSendError::BeforeBytes(Error::GoAway));
        }

        let mut stream = self
            .connection
            .session
            .open_stream()
            .await
            .map_err(MuxSendError::BeforeBytes)?;

        let result = self.drive(&mut *stream).await;

        match result {
            Ok((status, headers)) => Ok(MuxOutcome {
                status,
                headers,
                version: self.connection.version,
                body: MuxBody::new(stream, guard, self.state),
            }),
            Err(error) => {
                stream.reset();
                if stream.bytes_received() {
                    Err(MuxSendError::AfterBytes(error))
                } else {
                    Err(MuxSendError::BeforeBytes(error))
                }
            }
        }
    }

    async fn drive(&mut self, stream: &mut dyn MuxStream) -> Result<(Status, Headers)> {
        let body = self.body.take();
        let end_stream = body.as_ref().is_none_or(Body::is_empty);

        self.state.transition(StreamState::Open)?;
        stream.send_head(self.head.clone(), end_stream).await?;

        if end_stream {
            self.state.transition(StreamState::HalfClosedLocal)?;
        } else if let Some(body) = body {
            self.send_body(stream, body).await?;
            self.state.transition(StreamState::HalfClosedLocal)?;
        }

        loop {
            let ResponseHead { status, headers } = stream.recv_head().await?;

            if status == Status::SwitchingProtocols {
                return Ok((status, headers));
            }

            if status.is_informational() {
                if let Some(callback) = &self.on_informational {
                    callback(status, &headers);
                }
                continue;
            }

            return Ok((status, headers));
        }
    }

    async fn send_body(&mut self, stream: &mut dyn MuxStream, body: Body) -> Result<()> {
        let mut reader = body.into_reader();
        let mut buf = vec![0u8; SEND_CHUNK_LEN];
        loop {
            let bytes = reader.read(&mut buf).await?;
            if bytes == 0 {
                stream.send_data(Vec::new(), true).await?;
                return Ok(());
            }
            stream.send_data(buf[..bytes].to_vec(), false).await?;
        }
    }
}

/// The body half of a mux exchange. Yields bytes in wire order,
/// reports end-of-stream exactly once, then exposes trailers; the
/// stream slot is released when the body ends or the cursor is
/// dropped, and a cursor dropped before end-of-stream resets the
/// stream.
pub struct MuxBody {
    stream: Box<dyn MuxStream>,
    state: StreamState,
    guard: Option<StreamGuard>,
    trailers: Arc<Mutex<Option<Headers>>>,
    ended: bool,
}

impl Debug for MuxBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxBody")
            .field("state", &self.state)
            .field("ended", &self.ended)
            .finish()
    }
}

impl MuxBody {
    fn new(stream: Box<dyn MuxStream>, guard: StreamGuard, state: StreamState) -> Self {
        Self {
            stream,
            state,
            guard: Some(guard),
            trailers: Arc::default(),
            ended: false,
        }
    }

    /// shared cell that receives trailers once the body has ended
    pub(crate) fn trailers_cell(&self) -> Arc<Mutex<Option<Headers>>> {
        Arc::clone(&self.trailers)
    }

    fn finish(&mut self) {
        self.ended = true;
        let _ = self.state.transition(StreamState::Closed);
        *self.trailers.lock().unwrap() = self.stream.take_trailers();
        self.guard.take();
    }
}

impl AsyncRead for MuxBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if self.ended {
            return Poll::Ready(Ok(0));
        }

        let this = &mut *self;
        let bytes = ready!(this.stream.poll_recv_data(cx, buf))?;
        if bytes == 0 {
            this.finish();
        }
        Poll::Ready(Ok(bytes))
    }
}

impl Drop for MuxBody {
    fn drop(&mut self) {
        if !self.ended {
            self.stream.reset();
            self.guard.take();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{ScriptedMux, ScriptedResponse};
    use futures_lite::future::block_on;
    use niquests_http::Method;
    use url::Url;

    fn request_head() -> RequestHead {
        RequestHead {
            method: Method::Get,
            url: Url::parse("https://example.test/").unwrap(),
            headers: Headers::new(),
        }
    }

    #[test]
    fn exchange_delivers_head_then_body_then_trailers() {
        block_on(async {
            let session = Arc::new(ScriptedMux::new(vec![ScriptedResponse::ok("hello")
                .with_trailer("x-checksum", "abc")]));
            let connection = MuxConnection::new(session, Version::Http2);

            let guard = connection.try_reserve().unwrap();
            let exchange = MuxExchange::new(connection.clone(), request_head(), None);
            let outcome = exchange.send(guard).await.unwrap();

            assert_eq!(outcome.status, Status::Ok);
            let trailers = outcome.body.trailers_cell();
            assert!(trailers.lock().unwrap().is_none());

            let mut body = outcome.body;
            let mut content = String::new();
            body.read_to_string(&mut content).await.unwrap();
            assert_eq!(content, "hello");

            let trailers = trailers.lock().unwrap();
            assert_eq!(
                trailers.as_ref().and_then(|t| t.get_str("x-checksum")),
                Some("abc")
            );
        });
    }

    #[test]
    fn capacity_is_bounded_by_peer_setting() {
        let session = Arc::new(
            ScriptedMux::new(vec![ScriptedResponse::ok(""); 3]).with_max_streams(2),
        );
        let connection = MuxConnection::new(session, Version::Http2);

        let first = connection.try_reserve().unwrap();
        let _second = connection.try_reserve().unwrap();
        assert!(connection.try_reserve().is_none());

        drop(first);
        assert!(connection.try_reserve().is_some());
    }

    #[test]
    fn goaway_rejects_new_exchanges() {
        block_on(async {
            let session = Arc::new(ScriptedMux::new(vec![]).with_closed(true));
            let connection = MuxConnection::new(session, Version::Http2);

            let guard = connection.try_reserve().unwrap();
            let exchange = MuxExchange::new(connection.clone(), request_head(), None);
            match exchange.send(guard).await {
                Err(MuxSendError::BeforeBytes(Error::GoAway)) => {}
                other => panic!("expected goaway, got {other:?}"),
            }
        });
    }
}
