//! Protocol drivers.
//!
//! Every driver exposes the same operation: begin an exchange on a
//! connection and hand back a cursor that yields the response head
//! once, then body bytes in wire order, then end-of-stream exactly
//! once, then trailers if the protocol carried any.
//!
//! The http/1.1 driver owns its wire format completely. The http/2
//! and http/3 drivers own stream-lifecycle legality and concurrency
//! accounting, and delegate framing to the [`MuxSession`] /
//! [`MuxStream`] capabilities that a protocol stack provides.

mod h1;
mod mux;

pub(crate) use h1::H1Exchange;
pub(crate) use mux::{MuxSendError, StreamGuard};
pub use mux::{MuxBody, MuxConnection, MuxExchange};

use crate::Result;
use async_trait::async_trait;
use niquests_http::{Headers, Method, Status};
use std::{
    fmt::{self, Debug, Formatter},
    io,
    sync::Arc,
    task::{Context, Poll},
};
use url::Url;

/// Callback invoked for each interim (1xx) response head observed
/// during an exchange.
pub type InformationalCallback = Arc<dyn Fn(Status, &Headers) + Send + Sync>;

/// The request head handed to a mux protocol stack. Pseudo-header
/// composition (`:method`, `:scheme`, `:authority`, `:path`) is the
/// stack's concern; this carries the structured ingredients.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// request method
    pub method: Method,
    /// full request url
    pub url: Url,
    /// finalized request headers
    pub headers: Headers,
}

/// A response head delivered by a mux protocol stack.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// response status
    pub status: Status,
    /// response headers
    pub headers: Headers,
}

/// A multiplexed protocol connection capability (http/2 over tls, or
/// http/3 over quic). The stack behind this trait owns framing, flow
/// control windows, and settings exchange; the driver above it owns
/// stream-state legality and scheduling.
#[async_trait]
pub trait MuxSession: Send + Sync + 'static {
    /// the peer's advertised maximum concurrent streams
    fn max_concurrent_streams(&self) -> u64;

    /// whether the peer has announced shutdown (GOAWAY or quic
    /// connection close); a closed session admits no new streams
    fn is_closed(&self) -> bool;

    /// open a new bidirectional logical stream
    async fn open_stream(&self) -> Result<Box<dyn MuxStream>>;
}

/// One logical stream on a [`MuxSession`]. Streams are owned by one
/// exchange and are not safe to drive from multiple threads.
#[async_trait]
pub trait MuxStream: Send + 'static {
    /// send the request head, optionally ending the stream for
    /// bodyless requests
    async fn send_head(&mut self, head: RequestHead, end_stream: bool) -> Result<()>;

    /// send one chunk of body data, optionally ending the stream
    async fn send_data(&mut self, data: Vec<u8>, end_stream: bool) -> Result<()>;

    /// receive the next response head. Interim (1xx) heads are
    /// delivered individually; the driver keeps reading until a final
    /// head arrives.
    async fn recv_head(&mut self) -> Result<ResponseHead>;

    /// poll for response body bytes. `Ok(0)` signals end-of-stream
    /// and is reported exactly once.
    fn poll_recv_data(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>>;

    /// trailers, available once end-of-stream has been observed
    fn take_trailers(&mut self) -> Option<Headers>;

    /// whether any response bytes have arrived on this stream. Used
    /// to decide whether an http/3 failure is eligible for transparent
    /// retry on an older protocol version.
    fn bytes_received(&self) -> bool;

    /// abort the stream (RST_STREAM / quic stream reset)
    fn reset(&mut self);
}

/// The lifecycle of one logical stream, per RFC 9113 §5.1, tracked by
/// the driver to keep capability use legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// no frames exchanged yet
    #[default]
    Idle,
    /// request head sent, request body still open
    Open,
    /// our side finished sending; awaiting the response
    HalfClosedLocal,
    /// peer finished; we are still sending (uncommon for clients)
    HalfClosedRemote,
    /// both directions finished or the stream was reset
    Closed,
}

impl StreamState {
    pub(crate) fn transition(&mut self, next: StreamState) -> Result<()> {
        use StreamState::*;
        let legal = matches!(
            (*self, next),
            (Idle, Open)
                | (Open, HalfClosedLocal)
                | (Open, HalfClosedRemote)
                | (Open, Closed)
                | (HalfClosedLocal, HalfClosedRemote)
                | (HalfClosedLocal, Closed)
                | (HalfClosedRemote, Closed)
        );

        if legal {
            *self = next;
            Ok(())
        } else {
            Err(niquests_http::Error::InvalidStreamState(match next {
                Open => "stream already open",
                HalfClosedLocal => "send side already closed",
                HalfClosedRemote => "receive side already closed",
                Closed => "stream already closed",
                Idle => "cannot return to idle",
            }))
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stream_state_legal_path() {
        let mut state = StreamState::Idle;
        state.transition(StreamState::Open).unwrap();
        state.transition(StreamState::HalfClosedLocal).unwrap();
        state.transition(StreamState::HalfClosedRemote).unwrap();
        state.transition(StreamState::Closed).unwrap();
    }

    #[test]
    fn stream_state_rejects_double_open() {
        let mut state = StreamState::Idle;
        state.transition(StreamState::Open).unwrap();
        assert!(state.transition(StreamState::Open).is_err());
    }

    #[test]
    fn stream_state_rejects_send_after_close() {
        let mut state = StreamState::Closed;
        assert!(state.transition(StreamState::HalfClosedLocal).is_err());
    }
}
