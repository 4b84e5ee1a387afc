//! Lazy response handles and the cooperative scheduler behind
//! `gather`.
//!
//! A multiplexed session returns a [`LazyResponse`] the moment a
//! request has been composed; the exchange itself is driven later,
//! concurrently with every other in-flight exchange, by
//! [`gather`][crate::Session::gather]. The scheduler polls pending
//! exchanges round-robin, so completion order follows readiness
//! rather than issue order.

use crate::{Response, Result};
use niquests_http::{Error, Headers, Status, Version};
use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};
use url::Url;

type ExchangeFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;
type Slot = Arc<Mutex<Option<Result<Response>>>>;

struct PendingExchange {
    id: u64,
    future: ExchangeFuture,
    slot: Slot,
}

/// Registry of in-flight lazy exchanges, keyed by stream id.
pub(crate) struct Scheduler {
    pending: Mutex<Vec<PendingExchange>>,
    rotation: AtomicUsize,
    next_id: AtomicU64,
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending.lock().unwrap().len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            pending: Mutex::new(vec![]),
            rotation: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Scheduler {
    /// register an exchange future; returns the handle pieces
    pub(crate) fn register(&self, future: ExchangeFuture) -> (u64, Slot) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot: Slot = Arc::default();
        self.pending.lock().unwrap().push(PendingExchange {
            id,
            future,
            slot: Arc::clone(&slot),
        });
        (id, slot)
    }

    /// the number of unresolved exchanges
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Drive pending exchanges to completion.
    ///
    /// With `targets`, only the named exchanges are awaited (others
    /// still make progress while being polled fairly). With
    /// `max_fetch`, resolution stops once that many exchanges
    /// completed. Resolving an exchange that has already completed is
    /// a no-op.
    pub(crate) async fn gather(
        &self,
        targets: Option<Vec<u64>>,
        max_fetch: Option<usize>,
    ) -> usize {
        GatherFuture {
            scheduler: self,
            targets,
            max_fetch,
            resolved: 0,
        }
        .await
    }
}

struct GatherFuture<'a> {
    scheduler: &'a Scheduler,
    targets: Option<Vec<u64>>,
    max_fetch: Option<usize>,
    resolved: usize,
}

impl GatherFuture<'_> {
    fn is_done(&self, pending: &[PendingExchange]) -> bool {
        if pending.is_empty() {
            return true;
        }

        if let Some(max_fetch) = self.max_fetch {
            if self.resolved >= max_fetch {
                return true;
            }
        }

        if let Some(targets) = &self.targets {
            return !pending.iter().any(|entry| targets.contains(&entry.id));
        }

        false
    }
}

impl Future for GatherFuture<'_> {
    type Output = usize;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let mut pending = this.scheduler.pending.lock().unwrap();

        if this.is_done(&pending) {
            return Poll::Ready(this.resolved);
        }

        // rotate the polling start so no stream starves another
        let len = pending.len();
        let start = this.scheduler.rotation.fetch_add(1, Ordering::Relaxed) % len;

        let mut completed = vec![];
        for offset in 0..len {
            let index = (start + offset) % len;
            let entry = &mut pending[index];

            match entry.future.as_mut().poll(cx) {
                Poll::Ready(result) => {
                    *entry.slot.lock().unwrap() = Some(result);
                    completed.push(index);
                    this.resolved += 1;

                    if this
                        .max_fetch
                        .is_some_and(|max_fetch| this.resolved >= max_fetch)
                    {
                        break;
                    }
                }
                Poll::Pending => {}
            }
        }

        completed.sort_unstable_by(|a, b| b.cmp(a));
        for index in completed {
            pending.remove(index);
        }

        if this.is_done(&pending) {
            Poll::Ready(this.resolved)
        } else {
            Poll::Pending
        }
    }
}

enum LazyState {
    Pending { slot: Slot, scheduler: Arc<Scheduler> },
    Resolved(Response),
    Errored(Option<Error>),
}

/// A response surrogate returned before its exchange completes.
///
/// The handle resolves exactly once: through
/// [`Session::gather`][crate::Session::gather], or implicitly through
/// the blocking facade. Touching an unresolved handle from async code
/// fails with [`Error::PrematureGatherAccess`] rather than silently
/// blocking the task.
pub struct LazyResponse {
    id: u64,
    state: LazyState,
}

impl Debug for LazyResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyResponse")
            .field("id", &self.id)
            .field("resolved", &matches!(self.state, LazyState::Resolved(_)))
            .finish()
    }
}

impl LazyResponse {
    pub(crate) fn new(id: u64, slot: Slot, scheduler: Arc<Scheduler>) -> Self {
        Self {
            id,
            state: LazyState::Pending { slot, scheduler },
        }
    }

    /// the stream id this handle is registered under
    pub fn id(&self) -> u64 {
        self.id
    }

    fn upgrade(&mut self) {
        if let LazyState::Pending { slot, .. } = &self.state {
            let result = slot.lock().unwrap().take();
            match result {
                Some(Ok(response)) => self.state = LazyState::Resolved(response),
                Some(Err(error)) => self.state = LazyState::Errored(Some(error)),
                None => {}
            }
        }
    }

    /// whether the exchange behind this handle has completed
    pub fn is_resolved(&mut self) -> bool {
        self.upgrade();
        !matches!(self.state, LazyState::Pending { .. })
    }

    pub(crate) fn scheduler(&self) -> Option<Arc<Scheduler>> {
        match &self.state {
            LazyState::Pending { scheduler, .. } => Some(Arc::clone(scheduler)),
            _ => None,
        }
    }

    /// Access the resolved response.
    ///
    /// # Errors
    ///
    /// [`Error::PrematureGatherAccess`] when the handle has not been
    /// gathered yet; the exchange's own error, once, when it failed.
    pub fn response(&mut self) -> Result<&mut Response> {
        self.upgrade();
        match &mut self.state {
            LazyState::Pending { .. } => Err(Error::PrematureGatherAccess),
            LazyState::Resolved(response) => Ok(response),
            LazyState::Errored(error) => Err(error
                .take()
                .unwrap_or_else(|| Error::Other("exchange already failed".into()))),
        }
    }

    /// Consume the handle into its response, with the same
    /// preconditions as [`LazyResponse::response`].
    pub fn into_response(mut self) -> Result<Response> {
        self.upgrade();
        match self.state {
            LazyState::Pending { .. } => Err(Error::PrematureGatherAccess),
            LazyState::Resolved(response) => Ok(response),
            LazyState::Errored(error) => Err(error
                .unwrap_or_else(|| Error::Other("exchange already failed".into()))),
        }
    }

    /// the status of the resolved response
    pub fn status(&mut self) -> Result<Status> {
        self.response().map(|response| response.status())
    }

    /// the headers of the resolved response
    pub fn headers(&mut self) -> Result<&Headers> {
        self.response().map(|response| &*response.headers())
    }

    /// the negotiated version of the resolved response
    pub fn version(&mut self) -> Result<Version> {
        self.response().map(|response| response.version())
    }

    /// the terminal url of the resolved response
    pub fn url(&mut self) -> Result<&Url> {
        self.response().map(|response| &*response.url())
    }
}
