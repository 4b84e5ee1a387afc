#![allow(dead_code)]

/// Tunable buffer and bounds configuration for the wire machinery.
#[derive(Clone, Copy, Debug)]
pub struct HttpConfig {
    pub(crate) max_head_len: usize,
    pub(crate) max_headers: usize,
    pub(crate) received_body_max_len: u64,
    pub(crate) received_body_initial_len: usize,
    pub(crate) copy_loops_per_yield: usize,
}

impl HttpConfig {
    /// maximum permitted response-head length in bytes
    pub fn with_max_head_len(mut self, max_head_len: usize) -> Self {
        self.max_head_len = max_head_len;
        self
    }

    /// maximum permitted distinct headers in a response head
    pub fn with_max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers;
        self
    }

    /// maximum received-body length read to memory before erroring
    pub fn with_received_body_max_len(mut self, received_body_max_len: u64) -> Self {
        self.received_body_max_len = received_body_max_len;
        self
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        DEFAULT_CONFIG
    }
}

/// the default [`HttpConfig`]
pub const DEFAULT_CONFIG: HttpConfig = HttpConfig {
    max_head_len: 8 * 1024,
    max_headers: 128,
    received_body_max_len: 524_288_000u64,
    received_body_initial_len: 128,
    copy_loops_per_yield: 16,
};
