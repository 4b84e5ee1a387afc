//! Scripted in-memory protocol stacks and connectors for exercising
//! the session engine without a network.
//!
//! These types stand in for the tls/quic capabilities in tests: a
//! [`ScriptedMux`] plays the role of a negotiated http/2 or http/3
//! session, and a [`ScriptedConnector`] hands the session (or a
//! scripted http/1 transport) to the pool.

use crate::{
    connector::{ConnectConfig, Connector, Established},
    driver::{MuxConnection, MuxSession, MuxStream, RequestHead, ResponseHead},
    Result,
};
use async_trait::async_trait;
use futures_lite::future::Boxed;
use niquests_http::{
    synthetic::TestTransport, transport::BoxedTransport, Error, Headers, Status, Version,
};
use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};
use url::Url;

/// One canned response a [`ScriptedMux`] serves for one stream.
pub struct ScriptedResponse {
    status: Status,
    headers: Headers,
    body: Vec<u8>,
    trailers: Option<Headers>,
    informational: Vec<(Status, Headers)>,
    gate: Option<Boxed<()>>,
    fail_before_head: Option<Error>,
}

impl Clone for ScriptedResponse {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            trailers: self.trailers.clone(),
            informational: self.informational.clone(),
            gate: None,
            fail_before_head: None,
        }
    }
}

impl Debug for ScriptedResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedResponse")
            .field("status", &self.status)
            .field("body", &String::from_utf8_lossy(&self.body))
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl ScriptedResponse {
    /// a 200 response with the provided body
    pub fn ok(body: impl AsRef<[u8]>) -> Self {
        Self::with_status(Status::Ok, body)
    }

    /// a response with an arbitrary status
    pub fn with_status(status: Status, body: impl AsRef<[u8]>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.as_ref().to_vec(),
            trailers: None,
            informational: vec![],
            gate: None,
            fail_before_head: None,
        }
    }

    /// add a response header
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.append(name, value.into());
        self
    }

    /// add a trailer delivered after end-of-body
    pub fn with_trailer(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.trailers
            .get_or_insert_with(Headers::new)
            .append(name, value.into());
        self
    }

    /// deliver an interim head before the final one
    pub fn with_informational(mut self, status: Status) -> Self {
        self.informational.push((status, Headers::new()));
        self
    }

    /// hold the response head until the provided future completes,
    /// for completion-order tests
    pub fn gated_on(mut self, gate: impl Future<Output = ()> + Send + 'static) -> Self {
        self.gate = Some(Box::pin(gate));
        self
    }

    /// fail the stream before any response bytes arrive
    pub fn failing_with(mut self, error: Error) -> Self {
        self.fail_before_head = Some(error);
        self
    }
}

/// A scripted stand-in for a multiplexed protocol stack. Each opened
/// stream consumes the next scripted response in order.
pub struct ScriptedMux {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    max_streams: u64,
    closed: AtomicBool,
    requests: Arc<Mutex<Vec<(RequestHead, Vec<u8>)>>>,
}

impl Debug for ScriptedMux {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedMux")
            .field("max_streams", &self.max_streams)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ScriptedMux {
    /// a session that serves these responses, one per stream, in
    /// order
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            max_streams: 100,
            closed: AtomicBool::new(false),
            requests: Arc::default(),
        }
    }

    /// set the advertised max concurrent streams
    pub fn with_max_streams(mut self, max_streams: u64) -> Self {
        self.max_streams = max_streams;
        self
    }

    /// mark the session as shut down
    pub fn with_closed(self, closed: bool) -> Self {
        self.closed.store(closed, Ordering::SeqCst);
        self
    }

    /// every request head and body observed so far
    pub fn requests(&self) -> Vec<(RequestHead, Vec<u8>)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(head, body)| (head.clone(), body.clone()))
            .collect()
    }
}

#[async_trait]
impl MuxSession for ScriptedMux {
    fn max_concurrent_streams(&self) -> u64 {
        self.max_streams
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn open_stream(&self) -> Result<Box<dyn MuxStream>> {
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Other("no scripted response remains".into()))?;

        Ok(Box::new(ScriptedStream {
            response,
            head: None,
            sent_body: vec![],
            informational_index: 0,
            body_cursor: 0,
            bytes_received: false,
            reset: false,
            requests: Some(Arc::clone(&self.requests)),
        }))
    }
}

struct ScriptedStream {
    response: ScriptedResponse,
    head: Option<RequestHead>,
    sent_body: Vec<u8>,
    informational_index: usize,
    body_cursor: usize,
    bytes_received: bool,
    reset: bool,
    requests: Option<Arc<Mutex<Vec<(RequestHead, Vec<u8>)>>>>,
}

#[async_trait]
impl MuxStream for ScriptedStream {
    async fn send_head(&mut self, head: RequestHead, _end_stream: bool) -> Result<()> {
        self.head = Some(head);
        Ok(())
    }

    async fn send_data(&mut self, data: Vec<u8>, _end_stream: bool) -> Result<()> {
        self.sent_body.extend_from_slice(&data);
        Ok(())
    }

    async fn recv_head(&mut self) -> Result<ResponseHead> {
        if let Some(error) = self.response.fail_before_head.take() {
            return Err(error);
        }

        if let Some(gate) = self.response.gate.take() {
            gate.await;
        }

        if self.informational_index < self.response.informational.len() {
            let (status, headers) = self.response.informational[self.informational_index].clone();
            self.informational_index += 1;
            return Ok(ResponseHead { status, headers });
        }

        self.bytes_received = true;
        Ok(ResponseHead {
            status: self.response.status,
            headers: self.response.headers.clone(),
        })
    }

    fn poll_recv_data(
        &mut self,
        _cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let remaining = &self.response.body[self.body_cursor..];
        if remaining.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let bytes = buf.len().min(remaining.len());
        buf[..bytes].copy_from_slice(&remaining[..bytes]);
        self.body_cursor += bytes;
        Poll::Ready(Ok(bytes))
    }

    fn take_trailers(&mut self) -> Option<Headers> {
        self.response.trailers.take()
    }

    fn bytes_received(&self) -> bool {
        self.bytes_received
    }

    fn reset(&mut self) {
        self.reset = true;
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        if let (Some(requests), Some(head)) = (self.requests.take(), self.head.take()) {
            requests
                .lock()
                .unwrap()
                .push((head, std::mem::take(&mut self.sent_body)));
        }
    }
}

/// What a [`ScriptedConnector`] serves for one dial.
#[derive(Debug)]
pub enum ScriptedDial {
    /// an http/1 transport preloaded with this wire-format response
    H1(&'static str),
    /// a multiplexed session
    Mux(Arc<ScriptedMux>, Version),
    /// a dial failure
    Fail,
}

/// A connector that serves scripted dials in order and records the
/// http/1 transports it created so tests can inspect the wire bytes.
pub struct ScriptedConnector {
    dials: Mutex<VecDeque<ScriptedDial>>,
    transports: Mutex<Vec<TestTransport>>,
}

impl Debug for ScriptedConnector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedConnector").finish()
    }
}

impl ScriptedConnector {
    /// build a connector serving these dial outcomes in order
    pub fn new(dials: Vec<ScriptedDial>) -> Self {
        Self {
            dials: Mutex::new(dials.into()),
            transports: Mutex::new(vec![]),
        }
    }

    /// the server-side ends of every http/1 dial so far
    pub fn server_ends(&self) -> Vec<TestTransport> {
        self.transports.lock().unwrap().clone()
    }

    /// the request bytes observed on the nth http/1 dial
    pub fn wire_bytes(&self, n: usize) -> String {
        self.transports.lock().unwrap()[n].snapshot_string()
    }
}

#[async_trait]
impl Connector for Arc<ScriptedConnector> {
    async fn connect(&self, url: &Url, config: &ConnectConfig) -> Result<Established> {
        (**self).connect(url, config).await
    }

    fn supports(&self, scheme: &str, version: Version) -> bool {
        (**self).supports(scheme, version)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &Url, _config: &ConnectConfig) -> Result<Established> {
        match self.dials.lock().unwrap().pop_front() {
            Some(ScriptedDial::H1(script)) => {
                let (client, server) = TestTransport::new();
                server.append(script);
                self.transports.lock().unwrap().push(server);
                Ok(Established::Http1(BoxedTransport::new(client)))
            }
            Some(ScriptedDial::Mux(session, version)) => Ok(Established::Mux(
                MuxConnection::new(session, version),
            )),
            Some(ScriptedDial::Fail) | None => {
                Err(Error::Connection("scripted dial failure".into()))
            }
        }
    }

    fn supports(&self, _scheme: &str, _version: Version) -> bool {
        true
    }
}
