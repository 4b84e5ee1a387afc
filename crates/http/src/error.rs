use crate::{HeaderName, Status, Version};
use std::{num::TryFromIntError, str::Utf8Error, time::Duration};
use thiserror::Error;

/// Concrete errors that occur while composing, sending, or reading an
/// http exchange.
///
/// Every failure the client can surface shares this one root, so
/// callers can catch broadly or match on the specific kind.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// dns lookup, tcp/quic dial, or tls handshake failure before any
    /// response bytes arrived
    #[error("Connection failed: {0}")]
    Connection(String),

    /// no bytes were observed on the underlying socket for the
    /// configured window. The first field distinguishes the connect
    /// phase from the read phase.
    #[error("{0} timed out after {1:?}")]
    TimedOut(&'static str, Duration),

    /// a redirect chain exceeded the configured maximum length
    #[error("Exceeded {0} redirects")]
    TooManyRedirects(usize),

    /// a 4xx or 5xx status, surfaced only through `raise_for_status`
    #[error("HTTP error status {0} for {1}")]
    Status(Status, url::Url),

    /// the response body could not be parsed as JSON, or the response
    /// content-type did not indicate JSON
    #[error("JSON decode error: {0}")]
    Json(String),

    /// the provided url could not be parsed or is not http(s)
    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    /// this error describes a malformed request with a path that does
    /// not start with / or http:// or https://
    #[error("Unexpected uri format")]
    UnexpectedUriFormat,

    /// a streaming body was iterated a second time
    #[error("Stream already consumed")]
    StreamConsumed,

    /// an attribute of a lazy response was touched before the session
    /// gathered it
    #[error("Lazy response accessed before gather")]
    PrematureGatherAccess,

    /// connection was closed before a complete response was received
    #[error("Connection closed by peer")]
    Closed,

    /// an incomplete or invalid http head
    #[error("Partial or invalid HTTP head")]
    InvalidHead,

    /// we were unable to parse a [`HeaderName`][crate::HeaderName]
    #[error("Invalid or unparseable header name")]
    InvalidHeaderName,

    /// we were unable to parse a [`HeaderValue`][crate::HeaderValue]
    #[error("Invalid or unparseable header value, header name: {0}")]
    InvalidHeaderValue(HeaderName<'static>),

    /// the relevant protocol expected this header, but it was not
    /// provided
    #[error("Mandatory {0} header missing")]
    HeaderMissing(HeaderName<'static>),

    /// we received a header that does not make sense in context
    #[error("Unexpected header: {0}")]
    UnexpectedHeader(HeaderName<'static>),

    /// the request body was malformed or could not be encoded
    #[error("Invalid body: {0}")]
    InvalidBody(&'static str),

    /// we were able to parse this [`Version`], but we do not support it
    #[error("Unsupported version {0}")]
    UnsupportedVersion(Version),

    /// we were unable to parse a [`Version`]
    #[error("Invalid or missing version")]
    InvalidVersion,

    /// we were unable to parse this method
    #[error("Unsupported method {0}")]
    UnrecognizedMethod(String),

    /// we were unable to parse a [`Status`]
    #[error("Invalid status code")]
    InvalidStatus,

    /// we expected utf8, but there was an encoding error
    #[error(transparent)]
    EncodingError(#[from] Utf8Error),

    /// [`TryFromIntError`]
    #[error(transparent)]
    TryFromIntError(#[from] TryFromIntError),

    /// to mitigate against malicious peers, we do not allow response
    /// heads beyond this length
    #[error("Headers were malformed or longer than allowed")]
    HeadersTooLong,

    /// to mitigate against malicious peers, we do not read received
    /// bodies beyond this length to memory. Longer bodies can still be
    /// streamed chunk by chunk.
    #[error("Received body too long. Maximum {0} bytes")]
    ReceivedBodyTooLong(u64),

    /// a logical stream was driven in a way its protocol state machine
    /// does not permit
    #[error("Protocol stream in invalid state: {0}")]
    InvalidStreamState(&'static str),

    /// a mux connection announced shutdown and cannot accept new
    /// streams
    #[error("Connection is shutting down (goaway)")]
    GoAway,

    /// catchall for errors raised by capability implementations
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// true when this error represents a connect-phase or read-phase
    /// inactivity timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut(..))
    }

    /// true when this error was produced by `raise_for_status`
    pub fn is_status(&self) -> bool {
        matches!(self, Error::Status(..))
    }

    /// the http status carried by this error, if any
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Status(status, _) => Some(*status),
            _ => None,
        }
    }
}

/// this crate's result type
pub type Result<T> = std::result::Result<T, Error>;
