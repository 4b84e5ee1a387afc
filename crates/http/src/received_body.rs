use crate::{copy, http_config::DEFAULT_CONFIG, Buffer, HttpConfig, MutCow};
use encoding_rs::Encoding;
use futures_lite::{ready, AsyncRead, AsyncReadExt};
use std::{
    fmt::{self, Debug, Formatter},
    future::{Future, IntoFuture},
    io::{self, ErrorKind},
    pin::Pin,
    task::{Context, Poll},
};
use Poll::{Pending, Ready};
use ReceivedBodyState::{Chunked, End, FixedLength, PartialChunkSize, Start};

/// A streaming cursor over a response body.
///
/// The cursor either borrows the transport from a live exchange or
/// owns it; in the owned case an optional completion hook receives
/// the transport back once the body has been read to its end, which
/// is how connections return to the pool.
///
/// Bytes arrive in wire order, the end of the stream is reported
/// exactly once, and the cursor is not restartable.
pub struct ReceivedBody<'conn, Transport> {
    content_length: Option<u64>,
    buffer: MutCow<'conn, Buffer>,
    transport: Option<MutCow<'conn, Transport>>,
    state: MutCow<'conn, ReceivedBodyState>,
    on_completion: Option<Box<dyn Fn(Transport) + Send + Sync + 'static>>,
    encoding: &'static Encoding,
    max_len: u64,
    initial_len: usize,
    copy_loops_per_yield: usize,
}

fn slice_from(min: u64, buf: &[u8]) -> Option<&[u8]> {
    buf.get(usize::try_from(min).unwrap_or(usize::MAX)..)
        .filter(|buf| !buf.is_empty())
}

impl<'conn, Transport> ReceivedBody<'conn, Transport>
where
    Transport: AsyncRead + Unpin + Send + Sync + 'static,
{
    #[allow(missing_docs)]
    #[doc(hidden)]
    pub fn new(
        content_length: Option<u64>,
        buffer: impl Into<MutCow<'conn, Buffer>>,
        transport: impl Into<MutCow<'conn, Transport>>,
        state: impl Into<MutCow<'conn, ReceivedBodyState>>,
        on_completion: Option<Box<dyn Fn(Transport) + Send + Sync + 'static>>,
        encoding: &'static Encoding,
    ) -> Self {
        Self::new_with_config(
            content_length,
            buffer,
            transport,
            state,
            on_completion,
            encoding,
            &DEFAULT_CONFIG,
        )
    }

    #[allow(missing_docs)]
    #[doc(hidden)]
    pub fn new_with_config(
        content_length: Option<u64>,
        buffer: impl Into<MutCow<'conn, Buffer>>,
        transport: impl Into<MutCow<'conn, Transport>>,
        state: impl Into<MutCow<'conn, ReceivedBodyState>>,
        on_completion: Option<Box<dyn Fn(Transport) + Send + Sync + 'static>>,
        encoding: &'static Encoding,
        config: &HttpConfig,
    ) -> Self {
        Self {
            content_length,
            buffer: buffer.into(),
            transport: Some(transport.into()),
            state: state.into(),
            on_completion,
            encoding,
            max_len: config.received_body_max_len,
            initial_len: config.received_body_initial_len,
            copy_loops_per_yield: config.copy_loops_per_yield,
        }
    }

    /// Returns the content-length of this body, if known. A chunked
    /// body has no known length.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// the character encoding this cursor decodes strings with,
    /// usually determined from the content-type charset
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Set the maximum length that can be read from this body before
    /// error
    pub fn set_max_len(&mut self, max_len: u64) {
        self.max_len = max_len;
    }

    /// chainable setter for the maximum length that can be read from
    /// this body before error
    #[must_use]
    pub fn with_max_len(mut self, max_len: u64) -> Self {
        self.set_max_len(max_len);
        self
    }

    /// Reads the entire body to string, decoding with this body's
    /// character encoding. Malformed sequences become replacement
    /// characters.
    ///
    /// This can only be performed once, as the underlying data is not
    /// cached.
    ///
    /// # Errors
    ///
    /// Errors on io failure on the underlying transport, or if the
    /// length exceeds the configured maximum.
    pub async fn read_string(self) -> crate::Result<String> {
        let encoding = self.encoding();
        let bytes = self.read_bytes().await?;
        let (s, _, _) = encoding.decode(&bytes);
        Ok(s.to_string())
    }

    /// Similar to [`ReceivedBody::read_string`], but returns the raw
    /// bytes.
    ///
    /// # Errors
    ///
    /// Errors on io failure on the underlying transport, or if the
    /// length exceeds the configured maximum.
    pub async fn read_bytes(mut self) -> crate::Result<Vec<u8>> {
        let mut vec = if let Some(len) = self.content_length {
            if len > self.max_len {
                return Err(crate::Error::ReceivedBodyTooLong(self.max_len));
            }

            let len = usize::try_from(len)
                .map_err(|_| crate::Error::ReceivedBodyTooLong(self.max_len))?;

            Vec::with_capacity(len.min(1 << 20))
        } else {
            Vec::with_capacity(self.initial_len)
        };

        self.read_to_end(&mut vec).await?;
        Ok(vec)
    }

    fn owns_transport(&self) -> bool {
        self.transport.as_ref().is_some_and(MutCow::is_owned)
    }

    fn read_raw(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        if let Some(transport) = self.transport.as_deref_mut() {
            read_buffered(&mut self.buffer, transport, cx, buf)
        } else {
            Ready(Err(ErrorKind::NotConnected.into()))
        }
    }

    /// Consumes the remainder of this body by reading it to the end
    /// and discarding the contents, which is how an http/1.1
    /// keep-alive connection becomes reusable. Returns the number of
    /// bytes drained.
    ///
    /// # Errors
    ///
    /// Errors on io failure on the underlying transport
    pub async fn drain(self) -> io::Result<u64> {
        let copy_loops_per_yield = self.copy_loops_per_yield;
        copy(self, futures_lite::io::sink(), copy_loops_per_yield).await
    }

    #[inline]
    fn handle_start(&mut self) -> StateOutput {
        Ready(Ok((
            match self.content_length {
                Some(0) => End,

                Some(total_length) if total_length < self.max_len => FixedLength {
                    current_index: 0,
                    total: total_length,
                },

                Some(_) => {
                    return Ready(Err(io::Error::new(
                        ErrorKind::Unsupported,
                        "content too long",
                    )));
                }

                None => Chunked {
                    remaining: 0,
                    total: 0,
                },
            },
            0,
        )))
    }

    #[inline]
    fn handle_fixed_length(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
        current_index: u64,
        total_length: u64,
    ) -> StateOutput {
        let len = buf.len();
        let remaining = usize::try_from(total_length - current_index).unwrap_or(usize::MAX);
        let buf = &mut buf[..len.min(remaining)];
        let bytes = ready!(self.read_raw(cx, buf)?);
        let current_index = current_index + bytes as u64;
        if current_index == total_length {
            Ready(Ok((End, bytes)))
        } else if bytes == 0 {
            Ready(Err(io::Error::from(ErrorKind::ConnectionAborted)))
        } else {
            Ready(Ok((
                FixedLength {
                    current_index,
                    total: total_length,
                },
                bytes,
            )))
        }
    }

    #[inline]
    fn handle_chunked(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
        remaining: u64,
        total: u64,
    ) -> StateOutput {
        let bytes = ready!(self.read_raw(cx, buf)?);

        Ready(chunk_decode(
            &mut self.buffer,
            remaining,
            total,
            &mut buf[..bytes],
            self.max_len,
        ))
    }

    #[inline]
    fn handle_partial(&mut self, cx: &mut Context<'_>, buf: &mut [u8], total: u64) -> StateOutput {
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))?;
        let bytes = ready!(Pin::new(transport).poll_read(cx, buf))?;

        if bytes == 0 {
            return Ready(Err(io::Error::from(ErrorKind::ConnectionAborted)));
        }

        self.buffer.extend_from_slice(&buf[..bytes]);

        Ready(match parse_chunk_size(&self.buffer) {
            Ok(Some((used, remaining))) => {
                self.buffer.ignore_front(used);
                if remaining == 2 {
                    Ok((End, 0))
                } else {
                    Ok((Chunked { remaining, total }, 0))
                }
            }
            Ok(None) => Ok((PartialChunkSize { total }, 0)),
            Err(()) => Err(io::Error::new(ErrorKind::InvalidData, "invalid chunk size")),
        })
    }
}

impl<T> ReceivedBody<'static, T> {
    /// takes the owned transport from this received body
    pub fn take_transport(&mut self) -> Option<T> {
        self.transport.take().map(MutCow::unwrap_owned)
    }
}

impl<'a, Transport> IntoFuture for ReceivedBody<'a, Transport>
where
    Transport: AsyncRead + Unpin + Send + Sync + 'static,
{
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;
    type Output = crate::Result<String>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.read_string().await })
    }
}

pub(crate) fn read_buffered<Transport>(
    buffer: &mut Buffer,
    transport: &mut Transport,
    cx: &mut Context<'_>,
    buf: &mut [u8],
) -> Poll<io::Result<usize>>
where
    Transport: AsyncRead + Unpin,
{
    if buffer.is_empty() {
        Pin::new(transport).poll_read(cx, buf)
    } else if buffer.len() >= buf.len() {
        let len = buf.len();
        buf.copy_from_slice(&buffer[..len]);
        buffer.ignore_front(len);
        Ready(Ok(len))
    } else {
        let buffered_len = buffer.len();
        buf[..buffered_len].copy_from_slice(buffer);
        buffer.truncate(0);
        match Pin::new(transport).poll_read(cx, &mut buf[buffered_len..]) {
            Ready(Ok(additional)) => Ready(Ok(additional + buffered_len)),
            Pending => Ready(Ok(buffered_len)),
            other @ Ready(_) => other,
        }
    }
}

type StateOutput = Poll<io::Result<(ReceivedBodyState, usize)>>;

fn parse_chunk_size(buf: &[u8]) -> Result<Option<(usize, u64)>, ()> {
    use httparse::{parse_chunk_size, Status};
    match parse_chunk_size(buf) {
        Ok(Status::Complete((index, next_chunk))) => Ok(Some((index, next_chunk + 2))),
        Ok(Status::Partial) => Ok(None),
        Err(_) => Err(()),
    }
}

fn chunk_decode(
    self_buffer: &mut Buffer,
    remaining: u64,
    mut total: u64,
    buf: &mut [u8],
    max_len: u64,
) -> io::Result<(ReceivedBodyState, usize)> {
    if buf.is_empty() {
        return Err(io::Error::from(ErrorKind::ConnectionAborted));
    }
    let mut ranges_to_keep = vec![];
    let mut chunk_start = 0u64;
    let mut chunk_end = remaining;
    let state = loop {
        if chunk_end > 2 {
            let keep_start = usize::try_from(chunk_start).unwrap_or(usize::MAX);
            let keep_end = buf
                .len()
                .min(usize::try_from(chunk_end - 2).unwrap_or(usize::MAX));
            ranges_to_keep.push(keep_start..keep_end);
            let new_bytes = (keep_end - keep_start) as u64;
            total += new_bytes;
            if total > max_len {
                return Err(io::Error::new(ErrorKind::Unsupported, "content too long"));
            }
        }
        chunk_start = chunk_end;

        let Some(buf_to_read) = slice_from(chunk_start, buf) else {
            break Chunked {
                remaining: (chunk_start - buf.len() as u64),
                total,
            };
        };

        match parse_chunk_size(buf_to_read) {
            Ok(Some((framing_bytes, chunk_size))) => {
                chunk_start += framing_bytes as u64;
                chunk_end = chunk_start
                    .checked_add(chunk_size)
                    .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "chunk size too long"))?;

                if chunk_size == 2 {
                    if let Some(rest) = slice_from(chunk_end, buf) {
                        self_buffer.extend_from_slice(rest);
                    }
                    break End;
                }
            }

            Ok(None) => {
                self_buffer.extend_from_slice(buf_to_read);
                break PartialChunkSize { total };
            }

            Err(()) => {
                return Err(io::Error::new(ErrorKind::InvalidData, "invalid chunk size"));
            }
        }
    };

    let mut bytes = 0;

    for range_to_keep in ranges_to_keep {
        let new_bytes = bytes + range_to_keep.end - range_to_keep.start;
        buf.copy_within(range_to_keep, bytes);
        bytes = new_bytes;
    }

    Ok((state, bytes))
}

impl<Transport> AsyncRead for ReceivedBody<'_, Transport>
where
    Transport: AsyncRead + Unpin + Send + Sync + 'static,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        for _ in 0..self.copy_loops_per_yield {
            let (new_body_state, bytes) = ready!(match *self.state {
                Start => self.handle_start(),
                Chunked { remaining, total } => self.handle_chunked(cx, buf, remaining, total),
                PartialChunkSize { total } => self.handle_partial(cx, buf, total),
                FixedLength {
                    current_index,
                    total,
                } => self.handle_fixed_length(cx, buf, current_index, total),
                End => Ready(Ok((End, 0))),
            })?;

            *self.state = new_body_state;

            if *self.state == End {
                if self.on_completion.is_some() && self.owns_transport() {
                    let transport = self.transport.take().unwrap().unwrap_owned();
                    let on_completion = self.on_completion.take().unwrap();
                    on_completion(transport);
                }
                return Ready(Ok(bytes));
            } else if bytes != 0 {
                return Ready(Ok(bytes));
            }
        }

        cx.waker().wake_by_ref();
        Pending
    }
}

impl<Transport> Debug for ReceivedBody<'_, Transport> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedBody")
            .field("state", &*self.state)
            .field("content_length", &self.content_length)
            .field("buffer", &"..")
            .field("on_completion", &self.on_completion.is_some())
            .finish()
    }
}

/// The read state of a [`ReceivedBody`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[allow(missing_docs)]
pub enum ReceivedBodyState {
    /// initial state
    #[default]
    Start,

    /// read state for a chunked-encoded body. the number of bytes
    /// that have been read from the current chunk is the difference
    /// between remaining and total.
    Chunked {
        /// bytes left in the current chunk, including the trailing
        /// crlf. initial state is zero
        remaining: u64,

        /// the absolute number of content bytes read from all chunks
        total: u64,
    },

    /// we have read part of a chunk-size line and are waiting for the
    /// rest of it
    PartialChunkSize {
        total: u64,
    },

    /// read state for a fixed-length body
    FixedLength {
        /// the bytes that have already been read. initial state is
        /// zero
        current_index: u64,

        /// the claimed length, usually from the content-length header
        total: u64,
    },

    /// the terminal read state
    End,
}

#[cfg(test)]
mod test {
    use super::*;
    use encoding_rs::UTF_8;
    use futures_lite::{future::block_on, io::Cursor, AsyncRead};

    #[track_caller]
    fn assert_decoded(
        (remaining, input_data): (u64, &str),
        expected_output: (Option<u64>, &str, &str),
    ) {
        let mut buf = input_data.to_string().into_bytes();
        let mut self_buf = Buffer::with_capacity(100);

        let (output_state, bytes) = chunk_decode(
            &mut self_buf,
            remaining,
            0,
            &mut buf,
            DEFAULT_CONFIG.received_body_max_len,
        )
        .unwrap();

        assert_eq!(
            (
                match output_state {
                    Chunked { remaining, .. } => Some(remaining),
                    PartialChunkSize { .. } => Some(0),
                    End => None,
                    state => panic!("unexpected output state {state:?}"),
                },
                &*String::from_utf8_lossy(&buf[0..bytes]),
                &*String::from_utf8_lossy(&self_buf)
            ),
            expected_output
        );
    }

    async fn read_with_buffers_of_size<R>(reader: &mut R, size: usize) -> crate::Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut return_buffer = vec![];
        loop {
            let mut buf = vec![0; size];
            match reader.read(&mut buf).await? {
                0 => break Ok(String::from_utf8_lossy(&return_buffer).into()),
                bytes_read => return_buffer.extend_from_slice(&buf[..bytes_read]),
            }
        }
    }

    fn chunked_body(input: String) -> ReceivedBody<'static, Cursor<String>> {
        ReceivedBody::new(
            None,
            Buffer::default(),
            Cursor::new(input),
            Start,
            None,
            UTF_8,
        )
    }

    async fn decode(input: String, poll_size: usize) -> crate::Result<String> {
        let mut rb = chunked_body(input);
        read_with_buffers_of_size(&mut rb, poll_size).await
    }

    #[test]
    fn full_chunked_decode() {
        block_on(async {
            for size in 1..50 {
                let input = "5\r\n12345\r\n1\r\na\r\n2\r\nbc\r\n3\r\ndef\r\n0\r\n";
                let output = decode(input.into(), size).await.unwrap();
                assert_eq!(output, "12345abcdef", "size: {size}");

                let input = "7\r\nMozilla\r\n9\r\nDeveloper\r\n7\r\nNetwork\r\n0\r\n\r\n";
                let output = decode(input.into(), size).await.unwrap();
                assert_eq!(output, "MozillaDeveloperNetwork", "size: {size}");

                assert!(decode(String::new(), size).await.is_err());
                assert!(decode("fffffffffffffff0\r\n".into(), size).await.is_err());
            }
        });
    }

    #[test]
    fn chunk_decode_states() {
        assert_decoded((0, "5\r\n12345\r\n"), (Some(0), "12345", ""));
        assert_decoded((0, "F\r\n1"), (Some(14 + 2), "1", ""));
        assert_decoded((0, "5\r\n123"), (Some(2 + 2), "123", ""));
        assert_decoded((0, "1\r\nX\r\n1\r\nX\r\n"), (Some(0), "XX", ""));
        assert_decoded((0, "1\r\nX\r\n1\r\nX\r\n1"), (Some(0), "XX", "1"));
        assert_decoded((0, "FFF\r\n"), (Some(0xfff + 2), "", ""));
        assert_decoded((10, "hello"), (Some(5), "hello", ""));
        assert_decoded((7, "hello\r\nA\r\n world"), (Some(4 + 2), "hello world", ""));
        assert_decoded(
            (0, "e\r\ntest test test\r\n0\r\n\r\n"),
            (None, "test test test", ""),
        );
        assert_decoded(
            (0, "1\r\n_\r\n0\r\n\r\nnext response"),
            (None, "_", "next response"),
        );
        assert_decoded((7, "hello\r\n0\r\n\r\n"), (None, "hello", ""));
    }

    #[test]
    fn chunk_extensions_are_ignored() {
        assert_decoded((0, "5;abcdefg\r\n12345\r\n"), (Some(0), "12345", ""));
        assert_decoded((0, "5;;;;;;;;;;;;;;;;\r\n123"), (Some(2 + 2), "123", ""));
        assert_decoded((0, "1\r\nX\r\n1;\r\nX\r\n1"), (Some(0), "XX", "1"));
        assert_decoded((7, "hello\r\n0;\r\n\r\n"), (None, "hello", ""));
    }

    #[test]
    fn fixed_length_bodies_deliver_and_end() {
        block_on(async {
            let mut rb = ReceivedBody::new(
                Some(5),
                Buffer::default(),
                Cursor::new(String::from("12345extra bytes for the next response")),
                Start,
                None,
                UTF_8,
            );
            let output = read_with_buffers_of_size(&mut rb, 3).await.unwrap();
            assert_eq!(output, "12345");
        });
    }

    #[test]
    fn completion_hook_receives_owned_transport() {
        use std::sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        };
        block_on(async {
            let completed = Arc::new(AtomicBool::new(false));
            let hook_completed = Arc::clone(&completed);
            let rb = ReceivedBody::new(
                Some(2),
                Buffer::default(),
                Cursor::new(String::from("ok")),
                Start,
                Some(Box::new(move |_transport| {
                    hook_completed.store(true, Ordering::SeqCst);
                })),
                UTF_8,
            );
            assert_eq!(rb.read_string().await.unwrap(), "ok");
            assert!(completed.load(Ordering::SeqCst));
        });
    }

    #[test]
    fn max_len_guard() {
        block_on(async {
            let body = "A\r\n0123456789\r\n0\r\n\r\n";
            let rb = chunked_body(body.into()).with_max_len(5);
            assert!(rb.read_bytes().await.is_err());

            let rb = chunked_body(body.into());
            assert_eq!(rb.read_string().await.unwrap(), "0123456789");
        });
    }
}
