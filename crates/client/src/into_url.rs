use crate::Result;
use niquests_http::Error;
use std::str::FromStr;
use url::{ParseError, Url};

/// Conversion into a request [`Url`], joining against a session base
/// when one is configured.
pub trait IntoUrl {
    /// attempt to construct a url, with base if present
    fn into_url(self, base: Option<&Url>) -> Result<Url>;
}

fn supported_scheme(url: Url) -> Result<Url> {
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::InvalidUrl(format!("unsupported scheme {scheme}"))),
    }
}

impl IntoUrl for Url {
    fn into_url(self, base: Option<&Url>) -> Result<Url> {
        if self.cannot_be_a_base() {
            return Err(Error::UnexpectedUriFormat);
        }

        if base.is_some_and(|base| !self.as_str().starts_with(base.as_str())) {
            Err(Error::UnexpectedUriFormat)
        } else {
            supported_scheme(self)
        }
    }
}

impl IntoUrl for &str {
    fn into_url(self, base: Option<&Url>) -> Result<Url> {
        match (Url::from_str(self), base) {
            (Ok(url), base) => url.into_url(base),
            (Err(ParseError::RelativeUrlWithoutBase), Some(base)) => base
                .join(self.trim_start_matches('/'))
                .map_err(|_| Error::UnexpectedUriFormat)
                .and_then(supported_scheme),
            _ => Err(Error::UnexpectedUriFormat),
        }
    }
}

impl IntoUrl for String {
    #[inline]
    fn into_url(self, base: Option<&Url>) -> Result<Url> {
        self.as_str().into_url(base)
    }
}

impl IntoUrl for &String {
    #[inline]
    fn into_url(self, base: Option<&Url>) -> Result<Url> {
        self.as_str().into_url(base)
    }
}

impl<S: AsRef<str>> IntoUrl for &[S] {
    fn into_url(self, base: Option<&Url>) -> Result<Url> {
        let Some(mut url) = base.cloned() else {
            return Err(Error::UnexpectedUriFormat);
        };
        url.path_segments_mut()
            .map_err(|_| Error::UnexpectedUriFormat)?
            .pop_if_empty()
            .extend(self);
        Ok(url)
    }
}

impl<S: AsRef<str>, const N: usize> IntoUrl for [S; N] {
    fn into_url(self, base: Option<&Url>) -> Result<Url> {
        self.as_slice().into_url(base)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn absolute_urls_pass_through() {
        let url = "http://example.test/a".into_url(None).unwrap();
        assert_eq!(url.as_str(), "http://example.test/a");
    }

    #[test]
    fn relative_urls_need_a_base() {
        assert!("/a/b".into_url(None).is_err());

        let base = Url::parse("http://example.test/api/").unwrap();
        let url = "/a/b".into_url(Some(&base)).unwrap();
        assert_eq!(url.as_str(), "http://example.test/api/a/b");
    }

    #[test]
    fn segments_extend_the_base() {
        let base = Url::parse("http://example.test/api").unwrap();
        let url = ["users", "42"].into_url(Some(&base)).unwrap();
        assert_eq!(url.as_str(), "http://example.test/api/users/42");
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!("ftp://example.test/".into_url(None).is_err());
        assert!("data:text/plain,stuff".into_url(None).is_err());
    }

    #[test]
    fn urls_outside_the_base_are_rejected() {
        let base = Url::parse("http://example.test/api/").unwrap();
        assert!(Url::parse("http://other.test/x")
            .unwrap()
            .into_url(Some(&base))
            .is_err());
    }
}
