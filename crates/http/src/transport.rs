//! The byte-stream abstraction http exchanges are carried over.

use futures_lite::{AsyncRead, AsyncWrite};
use std::{
    any::Any,
    fmt::{self, Debug},
    io::Result,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

/// The byte stream an http exchange is carried over.
///
/// Implemented for tcp streams, tls-wrapped streams, logical mux
/// streams, and in-memory test transports alike. All provided methods
/// are optional.
#[allow(unused_variables)]
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {
    /// Sets the value of the `TCP_NODELAY` option on this transport,
    /// when it is backed by a tcp socket.
    ///
    /// # Errors
    ///
    /// Return an error if this transport supports setting nodelay and
    /// attempting to do so is unsuccessful.
    fn set_nodelay(&mut self, nodelay: bool) -> Result<()> {
        Ok(())
    }

    /// Returns the socket address of the remote peer of this
    /// transport, when there is one.
    ///
    /// # Errors
    ///
    /// Return an error if this transport supports retrieving the
    /// remote peer but attempting to do so is unsuccessful.
    fn peer_addr(&self) -> Result<Option<SocketAddr>> {
        Ok(None)
    }
}

impl Transport for Box<dyn Transport> {
    fn set_nodelay(&mut self, nodelay: bool) -> Result<()> {
        (**self).set_nodelay(nodelay)
    }

    fn peer_addr(&self) -> Result<Option<SocketAddr>> {
        (**self).peer_addr()
    }
}

pub(crate) trait AnyTransport: Transport + Any {
    fn as_box_any(self: Box<Self>) -> Box<dyn Any>;
    fn as_transport(&self) -> &dyn Transport;
}

impl<T: Transport + Any> AnyTransport for T {
    fn as_box_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn as_transport(&self) -> &dyn Transport {
        self
    }
}

/// A type-erased [`Transport`] that supports downcasting back to the
/// original type, used to avoid threading a transport generic through
/// every client type.
pub struct BoxedTransport(Box<dyn AnyTransport>);

impl Debug for BoxedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedTransport")
            .field("inner", &"Box<dyn Transport>")
            .finish()
    }
}

impl BoxedTransport {
    /// Create a new `BoxedTransport` from some [`Transport`].
    pub fn new<T: Transport + Any>(t: T) -> Self {
        Self(Box::new(t))
    }

    /// Attempt to convert the trait object into a specific transport
    /// T. This only succeeds if T is the type that was originally
    /// passed to [`BoxedTransport::new`], and returns None otherwise.
    #[must_use = "downcasting takes the inner transport, so you should use it"]
    pub fn downcast<T: 'static>(self) -> Option<Box<T>> {
        self.0.as_box_any().downcast().ok()
    }
}

impl AsyncRead for BoxedTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxedTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.0).poll_close(cx)
    }
}

impl Transport for BoxedTransport {
    fn set_nodelay(&mut self, nodelay: bool) -> Result<()> {
        self.0.set_nodelay(nodelay)
    }

    fn peer_addr(&self) -> Result<Option<SocketAddr>> {
        self.0.peer_addr()
    }
}
