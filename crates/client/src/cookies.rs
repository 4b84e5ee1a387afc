//! RFC 6265 cookie storage.
//!
//! The jar indexes cookies by (domain, path, name) and implements the
//! §5.4 dispatch algorithm: domain match (exact for host-only
//! cookies, suffix otherwise), path prefix match, `Secure` restricted
//! to https, and expiry. Client-initiated requests carry no embedding
//! context, so every dispatch is treated as same-site; the stored
//! `SameSite` attribute is preserved for inspection.

use async_lock::RwLock;
use cookie::{Cookie, Expiration, SameSite};
use niquests_http::{Headers, KnownHeaderName};
use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    net::IpAddr,
    time::SystemTime,
};
use url::Url;

/// One cookie at rest in the jar.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCookie {
    /// cookie name
    pub name: String,
    /// cookie value
    pub value: String,
    /// normalized domain, without a leading dot
    pub domain: String,
    /// whether the cookie only matches its exact host
    pub host_only: bool,
    /// cookie path
    pub path: String,
    /// absolute expiry; None means a session cookie
    pub expires: Option<SystemTime>,
    /// only sent over https
    pub secure: bool,
    /// invisible to script; carried for completeness
    pub http_only: bool,
    /// declared same-site policy
    pub same_site: Option<SameSite>,
    creation: SystemTime,
}

impl StoredCookie {
    fn is_expired(&self) -> bool {
        self.expires
            .is_some_and(|expires| expires <= SystemTime::now())
    }
}

type JarKey = (String, String, String);

/// A session cookie jar.
pub struct Jar {
    store: RwLock<HashMap<JarKey, StoredCookie>>,
}

impl Debug for Jar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jar").finish()
    }
}

impl Default for Jar {
    fn default() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    if host.eq_ignore_ascii_case(domain) {
        return true;
    }

    if host.parse::<IpAddr>().is_ok() {
        return false;
    }

    host.len() > domain.len()
        && host.to_ascii_lowercase().ends_with(&domain.to_ascii_lowercase())
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }

    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

fn expiry(cookie: &Cookie<'_>) -> Option<SystemTime> {
    // max-age takes precedence over expires per RFC 6265 §5.3
    if let Some(max_age) = cookie.max_age() {
        let max_age = std::time::Duration::try_from(max_age).unwrap_or_default();
        return Some(SystemTime::now() + max_age);
    }

    match cookie.expires() {
        Some(Expiration::DateTime(datetime)) => Some(datetime.into()),
        _ => None,
    }
}

impl Jar {
    /// an empty jar
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one cookie directly, bypassing response parsing.
    pub async fn set(&self, cookie: StoredCookie) {
        let key = (
            cookie.domain.clone(),
            cookie.path.clone(),
            cookie.name.clone(),
        );
        self.store.write().await.insert(key, cookie);
    }

    /// Ingest every `Set-Cookie` header of a response received for
    /// `url`, per RFC 6265 §5.3: domain attributes must cover the
    /// request host, expired cookies delete existing entries, and
    /// cookies without a domain attribute become host-only.
    pub async fn store_response(&self, url: &Url, headers: &Headers) {
        let Some(values) = headers.get_values(KnownHeaderName::SetCookie) else {
            return;
        };
        let Some(host) = url.host_str() else { return };

        for value in values {
            let Some(value) = value.as_str() else {
                continue;
            };
            let cookie = match Cookie::parse(value) {
                Ok(cookie) => cookie,
                Err(e) => {
                    log::trace!("ignoring unparseable set-cookie: {e}");
                    continue;
                }
            };

            let (domain, host_only) = match cookie.domain() {
                Some(domain) => {
                    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                    if !domain_matches(host, &domain) {
                        log::trace!(
                            "rejecting cookie {} scoped to foreign domain {domain}",
                            cookie.name()
                        );
                        continue;
                    }
                    (domain, false)
                }
                None => (host.to_ascii_lowercase(), true),
            };

            let path = cookie
                .path()
                .filter(|path| path.starts_with('/'))
                .map(String::from)
                .unwrap_or_else(|| default_path(url));

            let stored = StoredCookie {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
                domain: domain.clone(),
                host_only,
                path: path.clone(),
                expires: expiry(&cookie),
                secure: cookie.secure().unwrap_or(false),
                http_only: cookie.http_only().unwrap_or(false),
                same_site: cookie.same_site(),
                creation: SystemTime::now(),
            };

            let key = (domain, path, stored.name.clone());
            let mut store = self.store.write().await;
            if stored.is_expired() {
                store.remove(&key);
            } else {
                store.insert(key, stored);
            }
        }
    }

    /// The cookies to dispatch for a request to `url`, most-specific
    /// path first, oldest first within equal specificity, per RFC
    /// 6265 §5.4.
    pub async fn request_cookies(&self, url: &Url) -> Vec<(String, String)> {
        let Some(host) = url.host_str() else {
            return vec![];
        };
        let https = url.scheme() == "https";
        let request_path = if url.path().is_empty() { "/" } else { url.path() };

        let store = self.store.read().await;
        let mut matches = store
            .values()
            .filter(|cookie| !cookie.is_expired())
            .filter(|cookie| {
                if cookie.host_only {
                    host.eq_ignore_ascii_case(&cookie.domain)
                } else {
                    domain_matches(host, &cookie.domain)
                }
            })
            .filter(|cookie| path_matches(request_path, &cookie.path))
            .filter(|cookie| https || !cookie.secure)
            .collect::<Vec<_>>();

        matches.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then(a.creation.cmp(&b.creation))
        });

        matches
            .into_iter()
            .map(|cookie| (cookie.name.clone(), cookie.value.clone()))
            .collect()
    }

    /// Compose a `Cookie` header value for `url`, merging
    /// request-level cookies over jar matches without mutating the
    /// jar. Returns None when there is nothing to send.
    pub async fn cookie_header(
        &self,
        url: &Url,
        request_cookies: &[(String, String)],
    ) -> Option<String> {
        let mut pairs = self.request_cookies(url).await;
        for (name, value) in request_cookies {
            match pairs.iter_mut().find(|(n, _)| n == name) {
                Some(pair) => pair.1 = value.clone(),
                None => pairs.push((name.clone(), value.clone())),
            }
        }

        if pairs.is_empty() {
            None
        } else {
            Some(
                pairs
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        }
    }

    /// every live cookie in the jar
    pub async fn iter(&self) -> Vec<StoredCookie> {
        self.store.read().await.values().cloned().collect()
    }

    /// drop expired cookies
    pub async fn clear_expired(&self) {
        self.store
            .write()
            .await
            .retain(|_, cookie| !cookie.is_expired());
    }

    /// drop every cookie scoped to this domain or its subdomains
    pub async fn clear_domain(&self, domain: &str) {
        let domain = domain.trim_start_matches('.').to_ascii_lowercase();
        self.store
            .write()
            .await
            .retain(|_, cookie| cookie.domain != domain && !domain_matches(&cookie.domain, &domain));
    }

    /// empty the jar
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_lite::future::block_on;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn response_headers(set_cookies: &[&'static str]) -> Headers {
        let mut headers = Headers::new();
        for value in set_cookies {
            headers.append(KnownHeaderName::SetCookie, *value);
        }
        headers
    }

    #[test]
    fn host_only_cookies_do_not_leak_to_subdomains() {
        block_on(async {
            let jar = Jar::new();
            jar.store_response(&url("http://example.test/"), &response_headers(&["a=1"]))
                .await;

            assert_eq!(
                jar.request_cookies(&url("http://example.test/")).await,
                vec![("a".to_string(), "1".to_string())]
            );
            assert!(jar
                .request_cookies(&url("http://sub.example.test/"))
                .await
                .is_empty());
        });
    }

    #[test]
    fn domain_cookies_cover_subdomains() {
        block_on(async {
            let jar = Jar::new();
            jar.store_response(
                &url("http://example.test/"),
                &response_headers(&["a=1; Domain=example.test"]),
            )
            .await;

            assert_eq!(
                jar.request_cookies(&url("http://sub.example.test/")).await,
                vec![("a".to_string(), "1".to_string())]
            );
        });
    }

    #[test]
    fn foreign_domain_attributes_are_rejected() {
        block_on(async {
            let jar = Jar::new();
            jar.store_response(
                &url("http://example.test/"),
                &response_headers(&["a=1; Domain=other.test"]),
            )
            .await;
            assert!(jar.iter().await.is_empty());
        });
    }

    #[test]
    fn path_prefix_matching() {
        block_on(async {
            let jar = Jar::new();
            jar.store_response(
                &url("http://example.test/"),
                &response_headers(&["a=1; Path=/docs"]),
            )
            .await;

            assert!(jar
                .request_cookies(&url("http://example.test/"))
                .await
                .is_empty());
            assert!(jar
                .request_cookies(&url("http://example.test/docs/deep"))
                .await
                .len()
                == 1);
            assert!(jar
                .request_cookies(&url("http://example.test/docserver"))
                .await
                .is_empty());
        });
    }

    #[test]
    fn secure_cookies_require_https() {
        block_on(async {
            let jar = Jar::new();
            jar.store_response(
                &url("https://example.test/"),
                &response_headers(&["a=1; Secure"]),
            )
            .await;

            assert!(jar
                .request_cookies(&url("http://example.test/"))
                .await
                .is_empty());
            assert_eq!(
                jar.request_cookies(&url("https://example.test/")).await.len(),
                1
            );
        });
    }

    #[test]
    fn max_age_zero_deletes() {
        block_on(async {
            let jar = Jar::new();
            let target = url("http://example.test/");
            jar.store_response(&target, &response_headers(&["a=1"])).await;
            assert_eq!(jar.iter().await.len(), 1);

            jar.store_response(&target, &response_headers(&["a=gone; Max-Age=0"]))
                .await;
            assert!(jar.request_cookies(&target).await.is_empty());
        });
    }

    #[test]
    fn longest_path_dispatches_first() {
        block_on(async {
            let jar = Jar::new();
            let target = url("http://example.test/docs/deep/page");
            jar.store_response(
                &target,
                &response_headers(&["outer=1; Path=/", "inner=2; Path=/docs/deep"]),
            )
            .await;

            let cookies = jar.request_cookies(&target).await;
            assert_eq!(
                cookies,
                vec![
                    ("inner".to_string(), "2".to_string()),
                    ("outer".to_string(), "1".to_string())
                ]
            );
        });
    }

    #[test]
    fn request_cookies_merge_without_mutating_jar() {
        block_on(async {
            let jar = Jar::new();
            let target = url("http://example.test/");
            jar.store_response(&target, &response_headers(&["a=jar", "b=jar"]))
                .await;

            let header = jar
                .cookie_header(&target, &[("a".to_string(), "override".to_string())])
                .await
                .unwrap();
            assert!(header.contains("a=override"));
            assert!(header.contains("b=jar"));

            // the jar itself is untouched
            let jar_cookies = jar.request_cookies(&target).await;
            assert!(jar_cookies.contains(&("a".to_string(), "jar".to_string())));
        });
    }

    #[test]
    fn scoped_clear() {
        block_on(async {
            let jar = Jar::new();
            jar.store_response(&url("http://a.test/"), &response_headers(&["a=1"]))
                .await;
            jar.store_response(&url("http://b.test/"), &response_headers(&["b=1"]))
                .await;

            jar.clear_domain("a.test").await;
            assert_eq!(jar.iter().await.len(), 1);
            assert_eq!(jar.iter().await[0].name, "b");
        });
    }
}
