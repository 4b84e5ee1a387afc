use crate::Error;
use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// HTTP request methods.
///
/// This enumerates the verbs a client sends. See [RFC7231, Section
/// 4](https://tools.ietf.org/html/rfc7231#section-4) and the IANA
/// method registry.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Method {
    /// The CONNECT method requests that the recipient establish a
    /// tunnel to the destination origin server.
    Connect,

    /// The DELETE method requests that the origin server remove the
    /// association between the target resource and its current
    /// functionality.
    Delete,

    /// The GET method requests transfer of a current selected
    /// representation for the target resource.
    Get,

    /// The HEAD method is identical to GET except that the server MUST
    /// NOT send a message body in the response.
    Head,

    /// The OPTIONS method requests information about the communication
    /// options available for the target resource.
    Options,

    /// The PATCH method requests that a set of changes described in
    /// the request entity be applied to the target resource.
    Patch,

    /// The POST method requests that the target resource process the
    /// representation enclosed in the request.
    Post,

    /// The PUT method requests that the state of the target resource
    /// be created or replaced with the enclosed representation.
    Put,

    /// The TRACE method requests a remote, application-level loop-back
    /// of the request message.
    Trace,
}

impl Method {
    /// Whether a method is "safe", meaning the request is essentially
    /// read-only. See [RFC7231, Section
    /// 4.2.1](https://tools.ietf.org/html/rfc7231#section-4.2.1)
    pub fn is_safe(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Options | Method::Trace)
    }

    /// Whether a method is idempotent. See [RFC7231, Section
    /// 4.2.2](https://tools.ietf.org/html/rfc7231#section-4.2.2)
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Method::Delete | Method::Put) || self.is_safe()
    }

    /// The method as an uppercase token
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Connect => "CONNECT",
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Trace => "TRACE",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Method::Connect),
            "DELETE" => Ok(Method::Delete),
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "PATCH" => Ok(Method::Patch),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "TRACE" => Ok(Method::Trace),
            _ => Err(Error::UnrecognizedMethod(s.to_string())),
        }
    }
}

impl TryFrom<&str> for Method {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_and_display() {
        for method in ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"] {
            assert_eq!(Method::from_str(method).unwrap().to_string(), method);
        }
        assert!(Method::from_str("get").is_err());
        assert!(Method::from_str("BREW").is_err());
    }

    #[test]
    fn safety() {
        assert!(Method::Get.is_safe());
        assert!(Method::Head.is_safe());
        assert!(!Method::Post.is_safe());
        assert!(Method::Put.is_idempotent());
        assert!(!Method::Patch.is_idempotent());
    }
}
