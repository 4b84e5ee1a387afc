//! Remembering Alt-Svc upgrade offers.
//!
//! Origins advertise alternative endpoints (typically http/3) through
//! the `Alt-Svc` response header. The session caches the offers per
//! origin with their freshness lifetime and consults the cache on
//! pool acquire; a failed upgrade invalidates the entry so the next
//! request falls back cleanly.

use niquests_http::{
    typed::{parse_alt_svc, AltSvc, TypedHeader},
    Headers, KnownHeaderName,
};
use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    sync::Mutex,
    time::Instant,
};
use url::Url;

/// A cached alternative endpoint for one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSvcEntry {
    /// alpn protocol id of the alternative, e.g. `h3`
    pub protocol_id: String,
    /// host of the alternative authority; the origin's own host when
    /// the offer left it blank
    pub host: String,
    /// port of the alternative authority
    pub port: u16,
    expires: Instant,
}

impl AltSvcEntry {
    fn is_expired(&self) -> bool {
        self.expires <= Instant::now()
    }
}

/// Session-local Alt-Svc cache keyed by origin.
#[derive(Default)]
pub struct AltSvcCache {
    entries: Mutex<HashMap<url::Origin, AltSvcEntry>>,
}

impl Debug for AltSvcCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AltSvcCache")
            .field("entries", &self.entries.lock().unwrap().len())
            .finish()
    }
}

impl AltSvcCache {
    /// an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record any `Alt-Svc` offer carried by a response from `url`.
    /// Only h3 alternatives are retained, since that is the only
    /// upgrade the pool acts on; a `clear` value drops the entry.
    pub fn observe(&self, url: &Url, headers: &Headers) {
        let Some(value) = headers.folded(KnownHeaderName::AltSvc) else {
            return;
        };
        let Some(origin_host) = url.host_str() else {
            return;
        };
        let origin = url.origin();

        match parse_alt_svc(&value) {
            TypedHeader::AltSvc(AltSvc::Clear) => {
                self.entries.lock().unwrap().remove(&origin);
            }
            TypedHeader::AltSvc(AltSvc::Services(services)) => {
                let Some(h3) = services.iter().find(|s| s.protocol_id == "h3") else {
                    return;
                };

                let (host, port) = match h3.authority.rsplit_once(':') {
                    Some(("", port)) => (origin_host.to_string(), port),
                    Some((host, port)) => (host.to_string(), port),
                    None => return,
                };
                let Ok(port) = port.parse() else { return };

                log::debug!("caching h3 alternative {host}:{port} for {origin:?}");
                self.entries.lock().unwrap().insert(
                    origin,
                    AltSvcEntry {
                        protocol_id: "h3".to_string(),
                        host,
                        port,
                        expires: Instant::now() + h3.max_age,
                    },
                );
            }
            _ => {}
        }
    }

    /// the unexpired h3 alternative for this origin, if any
    pub fn lookup(&self, origin: &url::Origin) -> Option<AltSvcEntry> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(origin) {
            Some(entry) if entry.is_expired() => {
                entries.remove(origin);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// drop the entry for this origin, e.g. after a failed upgrade
    pub fn invalidate(&self, origin: &url::Origin) {
        self.entries.lock().unwrap().remove(origin);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn headers(value: &'static str) -> Headers {
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::AltSvc, value);
        headers
    }

    #[test]
    fn observe_and_lookup() {
        let cache = AltSvcCache::new();
        let target = url("https://example.test/page");
        cache.observe(&target, &headers("h3=\":443\"; ma=3600"));

        let entry = cache.lookup(&target.origin()).unwrap();
        assert_eq!(entry.host, "example.test");
        assert_eq!(entry.port, 443);
        assert_eq!(entry.protocol_id, "h3");
    }

    #[test]
    fn alternate_authority_is_respected() {
        let cache = AltSvcCache::new();
        let target = url("https://example.test/");
        cache.observe(&target, &headers("h3=\"alt.example.test:8443\""));

        let entry = cache.lookup(&target.origin()).unwrap();
        assert_eq!(entry.host, "alt.example.test");
        assert_eq!(entry.port, 8443);
    }

    #[test]
    fn non_h3_offers_are_ignored() {
        let cache = AltSvcCache::new();
        let target = url("https://example.test/");
        cache.observe(&target, &headers("h2=\"alt.example.test:443\""));
        assert!(cache.lookup(&target.origin()).is_none());
    }

    #[test]
    fn clear_drops_the_entry() {
        let cache = AltSvcCache::new();
        let target = url("https://example.test/");
        cache.observe(&target, &headers("h3=\":443\""));
        assert!(cache.lookup(&target.origin()).is_some());

        cache.observe(&target, &headers("clear"));
        assert!(cache.lookup(&target.origin()).is_none());
    }

    #[test]
    fn invalidate_supports_failed_upgrades() {
        let cache = AltSvcCache::new();
        let target = url("https://example.test/");
        cache.observe(&target, &headers("h3=\":443\""));
        cache.invalidate(&target.origin());
        assert!(cache.lookup(&target.origin()).is_none());
    }
}
