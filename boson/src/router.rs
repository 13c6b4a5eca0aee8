//! Correlates outstanding requests with inbound responses for transports
//! whose reply arrives on a channel disjoint from the request channel
//! (the broker transport). §4.4.
//!
//! Invariant: a completion is resolved at most once, by exactly one of
//! [`ResponseRouter::complete`], [`ResponseRouter::cancel`], or
//! [`ResponseRouter::reap_expired`]. `DashMap::remove` performs the
//! atomic check-and-remove this requires, so `complete` and
//! `reap_expired` can never both observe the same entry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::envelope::{Request, Response};
use crate::error::{BosonError, Result};
use crate::executor::SharedExecutor;

/// A pending request: the request that opened the route and the sender
/// half of the channel its eventual completion will be delivered on.
struct PendingRequest {
    request: Request,
    reply: oneshot::Sender<Result<Response>>,
}

/// The completion returned by [`ResponseRouter::open`]. Resolves to
/// `Ok(response)` on [`ResponseRouter::complete`], or to a `TimeoutError`
/// on [`ResponseRouter::cancel`] / [`ResponseRouter::reap_expired`].
pub struct Completion {
    inner: oneshot::Receiver<Result<Response>>,
}

impl Future for Completion {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BosonError::not_connected(
                "the response router was dropped before a reply arrived",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Owns the promises for outstanding requests, completes them on matching
/// responses, and expires stale ones.
pub struct ResponseRouter {
    pending: DashMap<Uuid, PendingRequest>,
    executor: SharedExecutor,
}

impl ResponseRouter {
    pub fn new(executor: SharedExecutor) -> Self {
        ResponseRouter {
            pending: DashMap::new(),
            executor,
        }
    }

    /// Opens a route for `request`, returning the completion the caller
    /// awaits. MUST be called before the request is handed to the
    /// transport, so that an extremely fast reply can never arrive before
    /// a pending entry exists for it (§8, "no lost replies under
    /// fast-reply race").
    pub fn open(&self, request: &Request) -> Completion {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            request.id,
            PendingRequest {
                request: request.clone(),
                reply: tx,
            },
        );
        Completion { inner: rx }
    }

    /// Completes the pending entry for `response.id`, if any, by fulfilling
    /// its completion with `response`. The fulfillment is submitted to the
    /// configured executor rather than run inline on the calling (I/O)
    /// thread. If no entry is present the response is logged and
    /// discarded -- it arrived for a request that was already completed,
    /// cancelled, or reaped.
    pub fn complete(&self, response: Response) {
        match self.pending.remove(&response.id) {
            Some((_, pending)) => {
                self.executor.submit(Box::pin(async move {
                    // A dropped receiver (caller gone) is not an error here.
                    let _ = pending.reply.send(Ok(response));
                }));
            }
            None => {
                tracing::warn!(
                    request_id = %response.id,
                    "discarding response with no matching pending request (already completed, cancelled, or expired)"
                );
            }
        }
    }

    /// Cancels the pending entry for `request.id`, if present, failing its
    /// completion with a `TimeoutError`. A no-op if the entry is gone
    /// (another actor already resolved it).
    pub fn cancel(&self, request: &Request) {
        if let Some((_, pending)) = self.pending.remove(&request.id) {
            let err = BosonError::timeout(&request.service_type, request.id);
            let _ = pending.reply.send(Err(err));
        }
    }

    /// Snapshots all entries whose request has expired, then cancels each.
    /// Snapshot-then-mutate avoids iterator invalidation and
    /// self-referential removal under concurrent `complete` calls.
    pub fn reap_expired(&self) {
        let expired: Vec<Request> = self
            .pending
            .iter()
            .filter(|entry| entry.value().request.is_expired())
            .map(|entry| entry.value().request.clone())
            .collect();

        for request in expired {
            self.cancel(&request);
        }
    }

    /// Number of requests currently awaiting a reply. Exposed for tests
    /// and diagnostics only.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

pub type SharedResponseRouter = Arc<ResponseRouter>;
