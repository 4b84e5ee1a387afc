use super::{HeaderName, HeaderNameInner};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use HeaderNameInner::{KnownHeader, UnknownHeader};

impl Display for KnownHeaderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl From<KnownHeaderName> for HeaderName<'_> {
    fn from(khn: KnownHeaderName) -> Self {
        Self(KnownHeader(khn))
    }
}

impl PartialEq<HeaderName<'_>> for KnownHeaderName {
    fn eq(&self, other: &HeaderName) -> bool {
        match &other.0 {
            KnownHeader(k) => self == k,
            UnknownHeader(_) => false,
        }
    }
}

macro_rules! known_headers {
    (
        $(
            ($capitalized:literal, $variant:tt)
        ),+ $(,)?
    ) => {
        /// A nonexhaustive enum of common header names. Use a
        /// `KnownHeaderName` variant instead of a &'static str anywhere
        /// possible, as it allows the header map to skip string
        /// comparison entirely.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[non_exhaustive]
        #[repr(u8)]
        pub enum KnownHeaderName {
            $(
                #[doc = concat!("The ", $capitalized, " header.")]
                $variant,
            )+
        }

        impl AsRef<str> for KnownHeaderName {
            fn as_ref(&self) -> &str {
                match self {
                    $( Self::$variant => $capitalized, )+
                }
            }
        }

        impl FromStr for KnownHeaderName {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($capitalized) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(())
            }
        }
    };
}

known_headers! {
    ("Accept", Accept),
    ("Accept-Encoding", AcceptEncoding),
    ("Accept-Language", AcceptLanguage),
    ("Accept-Ranges", AcceptRanges),
    ("Alt-Svc", AltSvc),
    ("Authorization", Authorization),
    ("Cache-Control", CacheControl),
    ("Connection", Connection),
    ("Content-Disposition", ContentDisposition),
    ("Content-Encoding", ContentEncoding),
    ("Content-Length", ContentLength),
    ("Content-Type", ContentType),
    ("Cookie", Cookie),
    ("Date", Date),
    ("Etag", Etag),
    ("Expect", Expect),
    ("Expires", Expires),
    ("Host", Host),
    ("Last-Modified", LastModified),
    ("Location", Location),
    ("Proxy-Authorization", ProxyAuthorization),
    ("Proxy-Connection", ProxyConnection),
    ("Referer", Referer),
    ("Report-To", ReportTo),
    ("Retry-After", RetryAfter),
    ("Server", Server),
    ("Set-Cookie", SetCookie),
    ("Trailer", Trailer),
    ("Transfer-Encoding", TransferEncoding),
    ("Upgrade", Upgrade),
    ("User-Agent", UserAgent),
    ("Vary", Vary),
    ("Via", Via),
    ("Www-Authenticate", WwwAuthenticate),
}
