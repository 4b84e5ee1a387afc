#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    unused_qualifications
)]

/*!
The wire-level data model for the [niquests](https://docs.rs/niquests)
http client: urls and query composition, an ordered case-insensitive
header multimap with typed views, request bodies with chunked
encoding, the streaming received-body state machine, and the transport
abstraction everything is carried over.

This crate contains no connection management and no request policy;
those live in the client crate. Everything here is usable on its own
for tooling that needs to speak the http/1.1 wire format or model
header semantics.
*/

mod body;
pub use body::Body;

mod body_encoder;
pub use body_encoder::BodyEncoder;

mod buffer;
pub use buffer::Buffer;

mod chunked_encoder;
pub use chunked_encoder::ChunkedEncoder;

mod copy;
pub use copy::copy;

mod error;
pub use error::{Error, Result};

mod headers;
pub use headers::{HeaderName, HeaderValue, HeaderValues, Headers, KnownHeaderName};

mod http_config;
pub use http_config::{HttpConfig, DEFAULT_CONFIG};

mod method;
pub use method::Method;

mod mut_cow;
pub use mut_cow::MutCow;

mod received_body;
pub use received_body::{ReceivedBody, ReceivedBodyState};

mod status;
pub use status::Status;

pub mod synthetic;

pub mod transport;
pub use transport::{BoxedTransport, Transport};

pub mod typed;

pub mod url_ext;

mod version;
pub use version::Version;

pub use url::{self, Url};
