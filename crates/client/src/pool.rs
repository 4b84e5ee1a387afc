use crate::driver::MuxConnection;
use dashmap::DashMap;
use niquests_http::transport::BoxedTransport;
use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use url::Origin;

/// default number of distinct origins retained
pub const DEFAULT_POOL_CONNECTIONS: usize = 10;

/// default number of idle connections retained per origin
pub const DEFAULT_POOL_MAXSIZE: usize = 10;

/// An idle pooled item with an optional expiry.
pub(crate) struct PoolEntry<V> {
    item: V,
    expiry: Option<Instant>,
}

impl<V: Debug> Debug for PoolEntry<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolEntry")
            .field("item", &self.item)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl<V> PoolEntry<V> {
    pub(crate) fn new(item: V, expiry: Option<Instant>) -> Self {
        Self { item, expiry }
    }

    fn is_expired(&self) -> bool {
        match self.expiry {
            None => false,
            Some(instant) => instant < Instant::now(),
        }
    }

    fn take(self) -> Option<V> {
        if self.is_expired() {
            None
        } else {
            Some(self.item)
        }
    }
}

/// A per-origin set of idle http/1 transports, bounded by
/// `pool_maxsize`. Insertion beyond the cap discards the least
/// recently used entry; checkout hands back the most recently used.
struct IdleSet<V> {
    entries: Mutex<VecDeque<PoolEntry<V>>>,
    max_size: usize,
}

impl<V> IdleSet<V> {
    fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
        }
    }

    fn insert(&self, entry: PoolEntry<V>) {
        let mut entries = self.entries.lock().unwrap();
        while entries.len() >= self.max_size {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// most-recently-used first, skipping expired entries
    fn pop(&self) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        while let Some(entry) = entries.pop_back() {
            if let Some(item) = entry.take() {
                return Some(item);
            }
        }
        None
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

struct Bucket {
    idle: IdleSet<BoxedTransport>,
    mux: Mutex<Option<MuxConnection>>,
}

impl Bucket {
    fn new(max_size: usize) -> Self {
        Self {
            idle: IdleSet::new(max_size),
            mux: Mutex::new(None),
        }
    }

    fn is_empty(&self) -> bool {
        self.idle.is_empty() && self.mux.lock().unwrap().is_none()
    }
}

/// The session's connection pool: per-origin buckets of idle http/1
/// transports plus at most one shared multiplexed connection per
/// origin.
///
/// Two caps apply: `pool_maxsize` bounds connections retained per
/// origin, and `pool_connections` bounds the number of distinct
/// origins; the least-recently-used origin's idle connections are
/// evicted when the latter overflows.
pub struct Pool {
    pool_maxsize: usize,
    pool_connections: usize,
    idle_timeout: Option<Duration>,
    buckets: Arc<DashMap<Origin, Arc<Bucket>>>,
    recency: Arc<Mutex<VecDeque<Origin>>>,
}

impl Debug for Pool {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for item in self.buckets.iter() {
            map.entry(&item.key(), &item.value().idle.len());
        }
        map.finish()
    }
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Self {
            pool_maxsize: self.pool_maxsize,
            pool_connections: self.pool_connections,
            idle_timeout: self.idle_timeout,
            buckets: Arc::clone(&self.buckets),
            recency: Arc::clone(&self.recency),
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CONNECTIONS, DEFAULT_POOL_MAXSIZE)
    }
}

impl Pool {
    pub(crate) fn new(pool_connections: usize, pool_maxsize: usize) -> Self {
        Self {
            pool_maxsize: pool_maxsize.max(1),
            pool_connections: pool_connections.max(1),
            idle_timeout: None,
            buckets: Arc::default(),
            recency: Arc::default(),
        }
    }

    pub(crate) fn set_idle_timeout(&mut self, idle_timeout: Option<Duration>) {
        self.idle_timeout = idle_timeout;
    }

    fn bucket(&self, origin: &Origin) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.get(origin) {
            return Arc::clone(&bucket);
        }

        let bucket = Arc::new(Bucket::new(self.pool_maxsize));
        self.buckets.insert(origin.clone(), Arc::clone(&bucket));
        bucket
    }

    fn touch(&self, origin: &Origin) {
        let mut recency = self.recency.lock().unwrap();
        if let Some(position) = recency.iter().position(|o| o == origin) {
            recency.remove(position);
        }
        recency.push_back(origin.clone());

        while recency.len() > self.pool_connections {
            let Some(least_recent) = recency.pop_front() else {
                break;
            };
            log::debug!("evicting idle connections for {least_recent:?}");
            if let Some(bucket) = self.buckets.get(&least_recent) {
                bucket.idle.clear();
            }
            self.buckets
                .remove_if(&least_recent, |_, bucket| bucket.is_empty());
        }
    }

    /// check out the most recently used idle http/1 transport for
    /// this origin, if one remains
    pub(crate) fn checkout_h1(&self, origin: &Origin) -> Option<BoxedTransport> {
        let transport = self.buckets.get(origin).and_then(|bucket| bucket.idle.pop());
        if transport.is_some() {
            log::debug!("reusing pooled connection to {origin:?}");
            self.touch(origin);
        }
        transport
    }

    /// return an http/1 transport to its origin's bucket
    pub(crate) fn release_h1(&self, origin: Origin, mut entry: PoolEntry<BoxedTransport>) {
        log::debug!("saving connection to {origin:?}");
        if entry.expiry.is_none() {
            entry.expiry = self.idle_timeout.map(|timeout| Instant::now() + timeout);
        }
        self.bucket(&origin).idle.insert(entry);
        self.touch(&origin);
    }

    /// the shared multiplexed connection for this origin, provided it
    /// is still live
    pub(crate) fn mux(&self, origin: &Origin) -> Option<MuxConnection> {
        let bucket = self.buckets.get(origin)?;
        let mut slot = bucket.mux.lock().unwrap();
        match &*slot {
            Some(connection) if connection.is_closed() => {
                log::debug!("dropping shut-down mux connection for {origin:?}");
                *slot = None;
                None
            }
            Some(connection) => Some(connection.clone()),
            None => None,
        }
    }

    /// register a freshly negotiated multiplexed connection
    pub(crate) fn store_mux(&self, origin: Origin, connection: MuxConnection) {
        *self.bucket(&origin).mux.lock().unwrap() = Some(connection);
        self.touch(&origin);
    }

    /// remove a multiplexed connection that failed or announced
    /// shutdown
    pub(crate) fn remove_mux(&self, origin: &Origin) {
        if let Some(bucket) = self.buckets.get(origin) {
            *bucket.mux.lock().unwrap() = None;
        }
    }

    /// drop buckets that hold nothing
    pub(crate) fn cleanup(&self) {
        self.buckets.retain(|_k, bucket| !bucket.is_empty());
        let mut recency = self.recency.lock().unwrap();
        recency.retain(|origin| self.buckets.contains_key(origin));
    }

    /// drop every pooled connection
    pub(crate) fn clear(&self) {
        self.buckets.clear();
        self.recency.lock().unwrap().clear();
    }

    #[cfg(test)]
    fn origins(&self) -> Vec<Origin> {
        self.buckets.iter().map(|b| b.key().clone()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use niquests_http::synthetic::TestTransport;
    use url::Url;

    fn origin(url: &str) -> Origin {
        Url::parse(url).unwrap().origin()
    }

    fn transport() -> BoxedTransport {
        BoxedTransport::new(TestTransport::new().0)
    }

    #[test]
    fn mru_reuse_within_origin() {
        let pool = Pool::new(10, 10);
        let origin = origin("http://127.0.0.1:8080");

        for _ in 0..3 {
            pool.release_h1(origin.clone(), PoolEntry::new(transport(), None));
        }
        assert_eq!(pool.buckets.get(&origin).unwrap().idle.len(), 3);

        assert!(pool.checkout_h1(&origin).is_some());
        assert_eq!(pool.buckets.get(&origin).unwrap().idle.len(), 2);
        assert!(pool.checkout_h1(&origin).is_some());
        assert!(pool.checkout_h1(&origin).is_some());
        assert!(pool.checkout_h1(&origin).is_none());
    }

    #[test]
    fn per_origin_cap_discards_least_recent() {
        let pool = Pool::new(10, 5);
        let origin = origin("http://127.0.0.1:8080");

        for _ in 0..10 {
            pool.release_h1(origin.clone(), PoolEntry::new(transport(), None));
        }

        assert_eq!(pool.buckets.get(&origin).unwrap().idle.len(), 5);
    }

    #[test]
    fn expired_entries_are_skipped() {
        let pool = Pool::new(10, 10);
        let origin = origin("http://127.0.0.1:8080");

        pool.release_h1(
            origin.clone(),
            PoolEntry::new(transport(), Some(Instant::now() - Duration::from_secs(1))),
        );
        assert!(pool.checkout_h1(&origin).is_none());
    }

    #[test]
    fn origin_overflow_evicts_least_recently_used() {
        let pool = Pool::new(2, 10);

        let a = origin("http://a.test");
        let b = origin("http://b.test");
        let c = origin("http://c.test");

        pool.release_h1(a.clone(), PoolEntry::new(transport(), None));
        pool.release_h1(b.clone(), PoolEntry::new(transport(), None));
        pool.release_h1(c.clone(), PoolEntry::new(transport(), None));

        // a was least recently used and its bucket is now gone
        let origins = pool.origins();
        assert_eq!(origins.len(), 2);
        assert!(!origins.contains(&a));
        assert!(origins.contains(&b));
        assert!(origins.contains(&c));
    }

    #[test]
    fn cleanup_retains_live_buckets() {
        let pool = Pool::new(10, 10);
        let a = origin("http://a.test");
        let b = origin("http://b.test");

        pool.release_h1(a.clone(), PoolEntry::new(transport(), None));
        pool.release_h1(b.clone(), PoolEntry::new(transport(), None));
        assert_eq!(pool.origins().len(), 2);

        let _ = pool.checkout_h1(&a);
        pool.cleanup();
        assert_eq!(pool.origins(), vec![b]);
    }
}
