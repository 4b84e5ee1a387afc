use super::{KnownHeaderName, UnknownHeaderName};
use crate::Error;
use smartcow::SmartCow;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use HeaderNameInner::{KnownHeader, UnknownHeader};

/// The name of an http header, either a [`KnownHeaderName`] or an
/// arbitrary string. Comparison between header names is always
/// ascii-case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderName<'a>(pub(super) HeaderNameInner<'a>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum HeaderNameInner<'a> {
    KnownHeader(KnownHeaderName),
    UnknownHeader(UnknownHeaderName<'a>),
}

impl<'a> HeaderName<'a> {
    /// Convert a potentially-borrowed `HeaderName` to a `'static`
    /// `HeaderName`
    pub fn to_owned(&self) -> HeaderName<'static> {
        match &self.0 {
            KnownHeader(known) => HeaderName(KnownHeader(*known)),
            UnknownHeader(unknown) => HeaderName(UnknownHeader(unknown.to_owned())),
        }
    }

    /// Determine if this header name contains only the characters
    /// allowed in an http field-name token
    pub fn is_valid(&self) -> bool {
        match &self.0 {
            KnownHeader(_) => true,
            UnknownHeader(unknown) => unknown.is_valid(),
        }
    }

    /// The name as a borrowed str, preserving construction casing for
    /// unknown names
    pub fn as_str(&'a self) -> &'a str {
        match &self.0 {
            KnownHeader(known) => known.as_ref(),
            UnknownHeader(unknown) => unknown.as_str(),
        }
    }
}

impl PartialEq<KnownHeaderName> for HeaderName<'_> {
    fn eq(&self, other: &KnownHeaderName) -> bool {
        match &self.0 {
            KnownHeader(known) => known == other,
            UnknownHeader(_) => false,
        }
    }
}

impl From<String> for HeaderName<'static> {
    fn from(s: String) -> Self {
        Self(match KnownHeaderName::from_str(&s) {
            Ok(known) => KnownHeader(known),
            Err(()) => UnknownHeader(UnknownHeaderName::from(s)),
        })
    }
}

impl<'a> From<&'a str> for HeaderName<'a> {
    fn from(s: &'a str) -> Self {
        Self(match KnownHeaderName::from_str(s) {
            Ok(known) => KnownHeader(known),
            Err(()) => UnknownHeader(UnknownHeaderName::from(s)),
        })
    }
}

impl From<SmartCow<'static>> for HeaderName<'static> {
    fn from(c: SmartCow<'static>) -> Self {
        match c {
            SmartCow::Borrowed(s) => s.into(),
            SmartCow::Owned(s) => String::from(s).into(),
        }
    }
}

impl FromStr for HeaderName<'static> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = HeaderName::from(String::from(s));
        if name.is_valid() {
            Ok(name)
        } else {
            Err(Error::InvalidHeaderName)
        }
    }
}

impl Display for HeaderName<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.0 {
            KnownHeader(known) => Display::fmt(known, f),
            UnknownHeader(unknown) => Display::fmt(unknown, f),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_names_are_recognized_case_insensitively() {
        assert_eq!(
            HeaderName::from("content-type"),
            HeaderName::from(KnownHeaderName::ContentType)
        );
        assert_eq!(
            HeaderName::from("CONTENT-TYPE"),
            HeaderName::from(KnownHeaderName::ContentType)
        );
    }

    #[test]
    fn unknown_names_compare_case_insensitively_and_display_as_built() {
        let a = HeaderName::from("X-Custom-Thing");
        let b = HeaderName::from("x-custom-thing");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "X-Custom-Thing");
    }

    #[test]
    fn validity() {
        assert!(HeaderName::from("x-ok").is_valid());
        assert!(!HeaderName::from("bad header").is_valid());
        assert!(!HeaderName::from("").is_valid());
        assert!("x-ok".parse::<HeaderName<'static>>().is_ok());
        assert!("bad\r\nheader".parse::<HeaderName<'static>>().is_err());
    }
}
