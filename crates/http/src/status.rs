use crate::Error;
use std::fmt::{self, Display};

macro_rules! statuses {
    ($( ($code:literal, $variant:ident, $reason:literal) ),+ $(,)?) => {
        /// HTTP response status codes.
        ///
        /// Variants cover the IANA-registered codes a client commonly
        /// observes. [`Status::try_from`] rejects unregistered codes.
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u16)]
        #[non_exhaustive]
        pub enum Status {
            $(
                #[doc = $reason]
                $variant = $code,
            )+
        }

        impl Status {
            /// the canonical reason phrase for this status
            pub fn canonical_reason(&self) -> &'static str {
                match self {
                    $( Self::$variant => $reason, )+
                }
            }
        }

        impl TryFrom<u16> for Status {
            type Error = Error;

            fn try_from(code: u16) -> Result<Self, Self::Error> {
                match code {
                    $( $code => Ok(Self::$variant), )+
                    _ => Err(Error::InvalidStatus),
                }
            }
        }
    };
}

statuses! {
    (100, Continue, "Continue"),
    (101, SwitchingProtocols, "Switching Protocols"),
    (102, Processing, "Processing"),
    (103, EarlyHints, "Early Hints"),
    (200, Ok, "OK"),
    (201, Created, "Created"),
    (202, Accepted, "Accepted"),
    (203, NonAuthoritativeInformation, "Non-Authoritative Information"),
    (204, NoContent, "No Content"),
    (205, ResetContent, "Reset Content"),
    (206, PartialContent, "Partial Content"),
    (207, MultiStatus, "Multi-Status"),
    (226, ImUsed, "IM Used"),
    (300, MultipleChoices, "Multiple Choices"),
    (301, MovedPermanently, "Moved Permanently"),
    (302, Found, "Found"),
    (303, SeeOther, "See Other"),
    (304, NotModified, "Not Modified"),
    (305, UseProxy, "Use Proxy"),
    (307, TemporaryRedirect, "Temporary Redirect"),
    (308, PermanentRedirect, "Permanent Redirect"),
    (400, BadRequest, "Bad Request"),
    (401, Unauthorized, "Unauthorized"),
    (402, PaymentRequired, "Payment Required"),
    (403, Forbidden, "Forbidden"),
    (404, NotFound, "Not Found"),
    (405, MethodNotAllowed, "Method Not Allowed"),
    (406, NotAcceptable, "Not Acceptable"),
    (407, ProxyAuthenticationRequired, "Proxy Authentication Required"),
    (408, RequestTimeout, "Request Timeout"),
    (409, Conflict, "Conflict"),
    (410, Gone, "Gone"),
    (411, LengthRequired, "Length Required"),
    (412, PreconditionFailed, "Precondition Failed"),
    (413, PayloadTooLarge, "Payload Too Large"),
    (414, UriTooLong, "URI Too Long"),
    (415, UnsupportedMediaType, "Unsupported Media Type"),
    (416, RequestedRangeNotSatisfiable, "Requested Range Not Satisfiable"),
    (417, ExpectationFailed, "Expectation Failed"),
    (418, ImATeapot, "I'm a teapot"),
    (421, MisdirectedRequest, "Misdirected Request"),
    (422, UnprocessableEntity, "Unprocessable Entity"),
    (425, TooEarly, "Too Early"),
    (426, UpgradeRequired, "Upgrade Required"),
    (428, PreconditionRequired, "Precondition Required"),
    (429, TooManyRequests, "Too Many Requests"),
    (431, RequestHeaderFieldsTooLarge, "Request Header Fields Too Large"),
    (451, UnavailableForLegalReasons, "Unavailable For Legal Reasons"),
    (500, InternalServerError, "Internal Server Error"),
    (501, NotImplemented, "Not Implemented"),
    (502, BadGateway, "Bad Gateway"),
    (503, ServiceUnavailable, "Service Unavailable"),
    (504, GatewayTimeout, "Gateway Timeout"),
    (505, HttpVersionNotSupported, "HTTP Version Not Supported"),
    (506, VariantAlsoNegotiates, "Variant Also Negotiates"),
    (507, InsufficientStorage, "Insufficient Storage"),
    (508, LoopDetected, "Loop Detected"),
    (510, NotExtended, "Not Extended"),
    (511, NetworkAuthenticationRequired, "Network Authentication Required"),
}

impl Status {
    /// the numeric status code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// 1xx: the request was received, continuing process
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code())
    }

    /// 2xx: the request was successfully received, understood, and
    /// accepted
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code())
    }

    /// 3xx: further action needs to be taken in order to complete the
    /// request
    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.code())
    }

    /// 4xx: the request contains bad syntax or cannot be fulfilled
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code())
    }

    /// 5xx: the server failed to fulfill an apparently valid request
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.code())
    }
}

impl From<Status> for u16 {
    fn from(status: Status) -> u16 {
        status.code()
    }
}

impl PartialEq<u16> for Status {
    fn eq(&self, other: &u16) -> bool {
        self.code() == *other
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .map_err(|_| Error::InvalidStatus)
            .and_then(Status::try_from)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classes() {
        assert!(Status::Continue.is_informational());
        assert!(Status::Ok.is_success());
        assert!(Status::SeeOther.is_redirection());
        assert!(Status::NotFound.is_client_error());
        assert!(Status::BadGateway.is_server_error());
    }

    #[test]
    fn conversion() {
        assert_eq!(Status::try_from(200).unwrap(), Status::Ok);
        assert_eq!(Status::ImATeapot.code(), 418);
        assert!(Status::try_from(299).is_err());
        assert_eq!("301".parse::<Status>().unwrap(), Status::MovedPermanently);
    }

    #[test]
    fn reason() {
        assert_eq!(Status::Ok.canonical_reason(), "OK");
        assert_eq!(Status::Found.canonical_reason(), "Found");
    }
}
