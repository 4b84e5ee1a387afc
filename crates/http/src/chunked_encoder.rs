use futures_lite::{io::AsyncRead, ready};
use std::{
    pin::Pin,
    task::{Context, Poll},
};

/// An encoder that frames an inner reader's bytes as http/1.1 chunked
/// transfer coding, terminating with a zero-length chunk.
#[derive(Debug)]
pub struct ChunkedEncoder<R> {
    reader: R,
    done: bool,
}

impl<R: Unpin + AsyncRead> ChunkedEncoder<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<R: Unpin + AsyncRead> AsyncRead for ChunkedEncoder<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.done {
            return Poll::Ready(Ok(0));
        }
        let reader = &mut self.reader;

        let max_bytes_to_read = max_bytes_to_read(buf.len());

        let bytes = ready!(Pin::new(reader).poll_read(cx, &mut buf[..max_bytes_to_read]))?;
        if bytes == 0 {
            self.done = true;
        }
        let start = format!("{bytes:X}\r\n");
        let start_length = start.len();
        let total = bytes + start_length + 2;
        buf.copy_within(..bytes, start_length);
        buf[..start_length].copy_from_slice(start.as_bytes());
        buf[total - 2..total].copy_from_slice(b"\r\n");
        Poll::Ready(Ok(total))
    }
}

#[allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
fn max_bytes_to_read(buf_len: usize) -> usize {
    // the minimum buffer is 6 bytes: one byte of content plus the
    // 1\r\n_\r\n framing around it
    assert!(
        buf_len >= 6,
        "buffers of length {buf_len} are too small to hold a chunk frame"
    );

    let bytes_remaining_after_two_cr_lns = (buf_len - 4) as f64;

    // the maximum number of bytes that the hex representation of remaining bytes might take
    let max_bytes_of_hex_framing = bytes_remaining_after_two_cr_lns.log2() / 4f64;

    (bytes_remaining_after_two_cr_lns - max_bytes_of_hex_framing.ceil()) as usize
}
