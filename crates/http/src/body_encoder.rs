use crate::{Body, ChunkedEncoder};
use futures_lite::io::AsyncRead;
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

/// A wire encoder for a request [`Body`]: content-length delimited
/// when the length is known, chunked otherwise.
#[derive(Debug)]
pub enum BodyEncoder {
    /// a chunked body
    Chunked(ChunkedEncoder<Body>),

    /// a fixed-length body
    Fixed(Body),
}

impl BodyEncoder {
    /// builds a body encoder for the provided [`Body`]
    pub fn new(body: Body) -> Self {
        match body.len() {
            Some(_) => Self::Fixed(body),
            None => Self::Chunked(ChunkedEncoder::new(body)),
        }
    }
}

impl AsyncRead for BodyEncoder {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            BodyEncoder::Chunked(encoder) => Pin::new(encoder).poll_read(cx, buf),
            BodyEncoder::Fixed(body) => Pin::new(body).poll_read(cx, buf),
        }
    }
}
