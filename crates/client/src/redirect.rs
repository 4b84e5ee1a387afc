//! Redirect policy.
//!
//! Redirect handling is security-sensitive: credentials must never
//! survive a hop to a different host, and cookies are always
//! recomputed from the jar for the target url rather than carried
//! forward verbatim.

use crate::request::PreparedRequest;
use niquests_http::{Error, Headers, KnownHeaderName, Method, Status};
use url::{ParseError, Url};

/// How the session follows redirects.
#[derive(Debug, Clone, Copy)]
pub struct RedirectPolicy {
    /// the longest chain followed before
    /// [`TooManyRedirects`][Error::TooManyRedirects]
    pub max_redirects: usize,

    /// Keep the original method on 301/302 responses to non-GET/HEAD
    /// requests. Historic clients rewrite to GET; this engine
    /// preserves the method unless told otherwise.
    pub preserve_method: bool,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            max_redirects: crate::request::DEFAULT_MAX_REDIRECTS,
            preserve_method: true,
        }
    }
}

/// statuses that name a redirect target we act on
pub(crate) fn is_followable(status: Status) -> bool {
    matches!(
        status,
        Status::MovedPermanently
            | Status::Found
            | Status::SeeOther
            | Status::TemporaryRedirect
            | Status::PermanentRedirect
    )
}

/// Resolve a `Location` header against the url it arrived on.
pub(crate) fn redirect_target(current: &Url, headers: &Headers) -> Option<crate::Result<Url>> {
    let location = headers.get_str(KnownHeaderName::Location)?;

    Some(match Url::parse(location) {
        Ok(url) => Ok(url),
        Err(ParseError::RelativeUrlWithoutBase) => current
            .join(location)
            .map_err(|e| Error::InvalidUrl(format!("{location}: {e}"))),
        Err(e) => Err(Error::InvalidUrl(format!("{location}: {e}"))),
    })
}

/// Rewrite a prepared request in place for the next hop.
pub(crate) fn apply_redirect(
    prepared: &mut PreparedRequest,
    policy: &RedirectPolicy,
    status: Status,
    target: Url,
) {
    let method_becomes_get = match status {
        Status::SeeOther => prepared.method != Method::Head,
        Status::MovedPermanently | Status::Found => {
            !policy.preserve_method && !matches!(prepared.method, Method::Get | Method::Head)
        }
        _ => false,
    };

    if method_becomes_get {
        log::debug!(
            "rewriting {} to GET following {status} redirect",
            prepared.method
        );
        prepared.method = Method::Get;
        prepared.body.clear();
        prepared.headers.remove_all([
            KnownHeaderName::ContentLength,
            KnownHeaderName::TransferEncoding,
            KnownHeaderName::ContentType,
        ]);
    }

    let off_host = prepared.url.host_str() != target.host_str();
    if off_host {
        log::debug!(
            "scrubbing credentials on redirect from {:?} to {:?}",
            prepared.url.host_str(),
            target.host_str()
        );
        prepared.headers.remove_all([
            KnownHeaderName::Authorization,
            KnownHeaderName::ProxyAuthorization,
        ]);
        prepared.auth = None;
    }

    // cookies are recomputed from the jar for the new url
    prepared.headers.remove(KnownHeaderName::Cookie);
    prepared.user_cookies.clear();

    // the Host header is recomputed by the wire driver
    prepared.headers.remove(KnownHeaderName::Host);

    prepared.url = target;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::{BodyBlueprint, PreparedRequest};
    use std::time::Duration;

    fn prepared(method: Method, url: &str) -> PreparedRequest {
        PreparedRequest {
            method,
            url: Url::parse(url).unwrap(),
            headers: Headers::new(),
            body: BodyBlueprint::Empty,
            user_cookies: vec![],
            auth: None,
            timeout: Duration::from_secs(30),
            allow_redirects: true,
            stream: false,
            verify: true,
            cert: None,
            on_informational: None,
        }
    }

    #[test]
    fn followable_statuses() {
        assert!(is_followable(Status::MovedPermanently));
        assert!(is_followable(Status::SeeOther));
        assert!(is_followable(Status::PermanentRedirect));
        assert!(!is_followable(Status::NotModified));
        assert!(!is_followable(Status::Ok));
    }

    #[test]
    fn relative_locations_join_the_current_url() {
        let current = Url::parse("http://example.test/a/b").unwrap();
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::Location, "../c");
        let target = redirect_target(&current, &headers).unwrap().unwrap();
        assert_eq!(target.as_str(), "http://example.test/c");
    }

    #[test]
    fn see_other_rewrites_to_get_and_drops_the_body() {
        let mut prepared = prepared(Method::Post, "http://example.test/");
        prepared.body = BodyBlueprint::Static(b"payload".to_vec());
        prepared.headers.insert(KnownHeaderName::ContentLength, "7");

        apply_redirect(
            &mut prepared,
            &RedirectPolicy::default(),
            Status::SeeOther,
            Url::parse("http://example.test/next").unwrap(),
        );

        assert_eq!(prepared.method, Method::Get);
        assert!(matches!(prepared.body, BodyBlueprint::Empty));
        assert!(!prepared.headers.has_header(KnownHeaderName::ContentLength));
    }

    #[test]
    fn found_preserves_method_by_default() {
        let mut prepared = prepared(Method::Post, "http://example.test/");
        prepared.body = BodyBlueprint::Static(b"payload".to_vec());

        apply_redirect(
            &mut prepared,
            &RedirectPolicy::default(),
            Status::Found,
            Url::parse("http://example.test/next").unwrap(),
        );

        assert_eq!(prepared.method, Method::Post);
        assert!(matches!(prepared.body, BodyBlueprint::Static(_)));
    }

    #[test]
    fn found_rewrites_when_policy_disables_preservation() {
        let mut prepared = prepared(Method::Post, "http://example.test/");
        let policy = RedirectPolicy {
            preserve_method: false,
            ..RedirectPolicy::default()
        };

        apply_redirect(
            &mut prepared,
            &policy,
            Status::Found,
            Url::parse("http://example.test/next").unwrap(),
        );
        assert_eq!(prepared.method, Method::Get);
    }

    #[test]
    fn off_host_redirects_scrub_credentials() {
        let mut prepared = prepared(Method::Get, "http://a.test/");
        prepared
            .headers
            .insert(KnownHeaderName::Authorization, "Basic X");
        prepared
            .headers
            .insert(KnownHeaderName::ProxyAuthorization, "Basic Y");

        apply_redirect(
            &mut prepared,
            &RedirectPolicy::default(),
            Status::MovedPermanently,
            Url::parse("http://b.test/").unwrap(),
        );

        assert!(!prepared.headers.has_header(KnownHeaderName::Authorization));
        assert!(!prepared
            .headers
            .has_header(KnownHeaderName::ProxyAuthorization));
    }

    #[test]
    fn same_host_redirects_keep_credentials() {
        let mut prepared = prepared(Method::Get, "http://a.test/");
        prepared
            .headers
            .insert(KnownHeaderName::Authorization, "Basic X");

        apply_redirect(
            &mut prepared,
            &RedirectPolicy::default(),
            Status::TemporaryRedirect,
            Url::parse("http://a.test/elsewhere").unwrap(),
        );

        assert_eq!(
            prepared.headers.get_str(KnownHeaderName::Authorization),
            Some("Basic X")
        );
    }

    #[test]
    fn cookies_are_always_recomputed() {
        let mut prepared = prepared(Method::Get, "http://a.test/");
        prepared.headers.insert(KnownHeaderName::Cookie, "a=1");
        prepared.user_cookies.push(("a".into(), "1".into()));

        apply_redirect(
            &mut prepared,
            &RedirectPolicy::default(),
            Status::Found,
            Url::parse("http://a.test/next").unwrap(),
        );

        assert!(!prepared.headers.has_header(KnownHeaderName::Cookie));
        assert!(prepared.user_cookies.is_empty());
    }
}
