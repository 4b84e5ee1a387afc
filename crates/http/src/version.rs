/// The version of the HTTP protocol in use.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
#[non_exhaustive]
pub enum Version {
    /// HTTP/1.0
    Http1_0,

    /// HTTP/1.1
    Http1_1,

    /// HTTP/2
    Http2,

    /// HTTP/3, carried over quic
    Http3,
}

impl Version {
    /// the alpn protocol id advertised for this version during a tls
    /// handshake, if it has one
    pub fn alpn_id(&self) -> Option<&'static str> {
        match self {
            Version::Http1_0 => None,
            Version::Http1_1 => Some("http/1.1"),
            Version::Http2 => Some("h2"),
            Version::Http3 => Some("h3"),
        }
    }

    /// whether this version multiplexes logical streams over one
    /// connection
    pub fn is_multiplexed(&self) -> bool {
        matches!(self, Version::Http2 | Version::Http3)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Version::Http1_0 => "HTTP/1.0",
            Version::Http1_1 => "HTTP/1.1",
            Version::Http2 => "HTTP/2",
            Version::Http3 => "HTTP/3",
        })
    }
}

impl std::str::FromStr for Version {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(Version::Http1_0),
            "HTTP/1.1" => Ok(Version::Http1_1),
            "HTTP/2" | "HTTP/2.0" => Ok(Version::Http2),
            "HTTP/3" | "HTTP/3.0" => Ok(Version::Http3),
            _ => Err(crate::Error::InvalidVersion),
        }
    }
}
