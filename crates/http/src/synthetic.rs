//! In-memory transports for exercising the wire machinery without a
//! network.

use crate::Transport;
use futures_lite::{AsyncRead, AsyncWrite};
use std::{
    fmt::{self, Debug, Formatter},
    io,
    pin::Pin,
    sync::{Arc, RwLock},
    task::{Context, Poll, Waker},
};

/// A readable and writable in-memory transport.
///
/// [`TestTransport::new`] returns the two ends of one connection:
/// bytes written to either end become readable from the other, and
/// either end can be closed to simulate a disconnect.
#[derive(Default, Clone, Debug)]
pub struct TestTransport {
    read: Arc<CloseableCursor>,
    write: Arc<CloseableCursor>,
}

impl Transport for TestTransport {}

impl TestTransport {
    /// constructs a connected transport pair
    pub fn new() -> (TestTransport, TestTransport) {
        let a = Arc::new(CloseableCursor::default());
        let b = Arc::new(CloseableCursor::default());

        (
            TestTransport {
                read: a.clone(),
                write: b.clone(),
            },
            TestTransport { read: b, write: a },
        )
    }

    /// close the write side of this transport, waking the peer
    pub fn close(&self) {
        self.write.close();
    }

    /// synchronously append the supplied bytes to the write side,
    /// notifying the read side of the other end
    pub fn append(&self, bytes: impl AsRef<[u8]>) {
        self.write.append(bytes.as_ref());
    }

    /// an owned snapshot of every byte the peer has written so far
    pub fn snapshot(&self) -> Vec<u8> {
        self.read.snapshot()
    }

    /// everything the peer has written so far, lossily decoded
    pub fn snapshot_string(&self) -> String {
        String::from_utf8_lossy(&self.snapshot()).into_owned()
    }
}

impl AsyncRead for TestTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        self.read.poll_read_inner(cx, buf)
    }
}

impl AsyncWrite for TestTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.write.is_closed() {
            Poll::Ready(Ok(0))
        } else {
            self.write.append(buf);
            Poll::Ready(Ok(buf.len()))
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.write.close();
        Poll::Ready(Ok(()))
    }
}

#[derive(Default)]
struct CloseableCursorInner {
    data: Vec<u8>,
    cursor: usize,
    waker: Option<Waker>,
    closed: bool,
}

#[derive(Default)]
struct CloseableCursor(RwLock<CloseableCursorInner>);

impl CloseableCursor {
    fn snapshot(&self) -> Vec<u8> {
        self.0.read().unwrap().data.clone()
    }

    fn is_closed(&self) -> bool {
        self.0.read().unwrap().closed
    }

    fn close(&self) {
        let mut inner = self.0.write().unwrap();
        inner.closed = true;
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }

    fn append(&self, bytes: &[u8]) {
        let mut inner = self.0.write().unwrap();
        inner.data.extend_from_slice(bytes);
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }

    fn poll_read_inner(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        let mut inner = self.0.write().unwrap();
        if inner.cursor < inner.data.len() {
            let bytes_to_copy = buf.len().min(inner.data.len() - inner.cursor);
            buf[..bytes_to_copy]
                .copy_from_slice(&inner.data[inner.cursor..inner.cursor + bytes_to_copy]);
            inner.cursor += bytes_to_copy;
            Poll::Ready(Ok(bytes_to_copy))
        } else if inner.closed {
            Poll::Ready(Ok(0))
        } else {
            inner.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl Debug for CloseableCursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let inner = self.0.read().unwrap();
        f.debug_struct("CloseableCursor")
            .field(
                "data",
                &std::str::from_utf8(&inner.data).unwrap_or("not utf8"),
            )
            .field("closed", &inner.closed)
            .field("cursor", &inner.cursor)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_lite::{future::block_on, AsyncReadExt, AsyncWriteExt};

    #[test]
    fn round_trip() {
        block_on(async {
            let (mut client, server) = TestTransport::new();
            client.write_all(b"ping").await.unwrap();
            assert_eq!(server.snapshot(), b"ping");

            server.append("pong");
            server.close();
            let mut out = String::new();
            client.read_to_string(&mut out).await.unwrap();
            assert_eq!(out, "pong");
        });
    }
}
