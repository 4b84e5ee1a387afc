//! Content-Encoding handling.
//!
//! Gzip and deflate are always available; brotli and zstd are cargo
//! features. The `Accept-Encoding` offer is computed from what is
//! actually available, and codings we cannot decode pass through
//! undecoded rather than failing the request.

use async_compression::futures::bufread::{GzipDecoder, ZlibDecoder};
use async_io::Timer;
use futures_lite::{io::BufReader, AsyncRead};
use niquests_http::{Headers, KnownHeaderName};
use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

#[cfg(feature = "brotli")]
use async_compression::futures::bufread::BrotliDecoder;
#[cfg(feature = "zstd")]
use async_compression::futures::bufread::ZstdDecoder;

/// the `Accept-Encoding` value advertising every available decoder
pub(crate) fn accept_encoding() -> String {
    let mut offers = vec!["gzip", "deflate"];
    if cfg!(feature = "brotli") {
        offers.push("br");
    }
    if cfg!(feature = "zstd") {
        offers.push("zstd");
    }
    offers.join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Coding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
    Unknown,
}

/// the codings named by a `Content-Encoding` header, in application
/// order
pub(crate) fn content_codings(headers: &Headers) -> Vec<Coding> {
    headers
        .folded(KnownHeaderName::ContentEncoding)
        .map(|value| {
            value
                .split(',')
                .map(|token| match token.trim().to_ascii_lowercase().as_str() {
                    "" | "identity" => Coding::Identity,
                    "gzip" | "x-gzip" => Coding::Gzip,
                    "deflate" => Coding::Deflate,
                    "br" => Coding::Brotli,
                    "zstd" => Coding::Zstd,
                    _ => Coding::Unknown,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) type BoxedBodyReader = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Stack decoders over a raw body reader, innermost coding last,
/// matching the reverse of the `Content-Encoding` application order.
/// Codings with no available decoder are passed through.
pub(crate) fn decode_reader(
    codings: &[Coding],
    reader: impl AsyncRead + Send + 'static,
) -> BoxedBodyReader {
    let mut reader: BoxedBodyReader = Box::pin(reader);

    for coding in codings.iter().rev() {
        reader = match coding {
            Coding::Identity => reader,
            Coding::Gzip => Box::pin(GzipDecoder::new(BufReader::new(reader))),
            Coding::Deflate => Box::pin(ZlibDecoder::new(BufReader::new(reader))),
            #[cfg(feature = "brotli")]
            Coding::Brotli => Box::pin(BrotliDecoder::new(BufReader::new(reader))),
            #[cfg(feature = "zstd")]
            Coding::Zstd => Box::pin(ZstdDecoder::new(BufReader::new(reader))),
            other => {
                log::warn!("no decoder available for {other:?}, passing body through");
                reader
            }
        };
    }

    reader
}

/// An inactivity watchdog over a body reader: each successful read
/// resets the window, and a window with no bytes fails the read with
/// [`io::ErrorKind::TimedOut`].
pub(crate) struct TimedReader<R> {
    inner: R,
    window: Option<Duration>,
    timer: Option<Timer>,
}

impl<R> TimedReader<R> {
    pub(crate) fn new(inner: R, window: Option<Duration>) -> Self {
        Self {
            inner,
            window,
            timer: None,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TimedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.timer = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                let Some(window) = this.window else {
                    return Poll::Pending;
                };
                let timer = this.timer.get_or_insert_with(|| Timer::after(window));
                match Pin::new(timer).poll(cx) {
                    Poll::Ready(_) => {
                        this.timer = None;
                        Poll::Ready(Err(io::ErrorKind::TimedOut.into()))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_lite::{future::block_on, io::Cursor, AsyncReadExt, AsyncWriteExt};

    #[test]
    fn offer_always_includes_gzip_and_deflate() {
        let offer = accept_encoding();
        assert!(offer.starts_with("gzip, deflate"));
    }

    #[test]
    fn codings_parse_in_order() {
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::ContentEncoding, "gzip, br");
        assert_eq!(content_codings(&headers), vec![Coding::Gzip, Coding::Brotli]);
        assert!(content_codings(&Headers::new()).is_empty());
    }

    #[test]
    fn gzip_round_trip() {
        block_on(async {
            let mut encoder = async_compression::futures::write::GzipEncoder::new(Vec::new());
            encoder.write_all(b"the content").await.unwrap();
            encoder.close().await.unwrap();
            let compressed = encoder.into_inner();

            let mut reader = decode_reader(&[Coding::Gzip], Cursor::new(compressed));
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            assert_eq!(out, b"the content");
        });
    }

    #[test]
    fn unknown_codings_pass_through() {
        block_on(async {
            let mut reader = decode_reader(&[Coding::Unknown], Cursor::new(b"opaque".to_vec()));
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            assert_eq!(out, b"opaque");
        });
    }

    #[test]
    fn timed_reader_times_out_on_silence() {
        block_on(async {
            let (client, _server) = niquests_http::synthetic::TestTransport::new();
            let mut reader = TimedReader::new(client, Some(Duration::from_millis(10)));
            let mut buf = [0u8; 8];
            let error = reader.read(&mut buf).await.unwrap_err();
            assert_eq!(error.kind(), io::ErrorKind::TimedOut);
        });
    }
}
