//! The opaque executor the framework submits work to. Transports never
//! create worker threads themselves beyond the handful of persistent
//! daemons described in §5; all per-request work goes through here.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;

/// Runs submitted work "eventually, possibly in parallel." The framework
/// makes no further assumption about the implementation.
pub trait Executor: Send + Sync + 'static {
    /// Submits a future for execution and returns immediately. The
    /// future's own completion (if any) is observed by its caller through
    /// whatever channel they wired it to -- the executor itself reports
    /// nothing back.
    fn submit(&self, task: Pin<Box<dyn Future<Output = ()> + Send>>);
}

/// Default executor backed by a shared [`tokio::runtime::Handle`]. This is
/// the executor used unless a caller supplies their own via
/// [`crate::config::Config`].
#[derive(Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        TokioExecutor { handle }
    }

    /// Convenience constructor that grabs the handle of the runtime the
    /// caller is currently executing on.
    pub fn current() -> Self {
        TokioExecutor {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl Executor for TokioExecutor {
    fn submit(&self, task: Pin<Box<dyn Future<Output = ()> + Send>>) {
        let _: JoinHandle<()> = self.handle.spawn(task);
    }
}

/// A shared, non-owning reference to an executor. Transports hold this
/// rather than the concrete type so that the registry can compare
/// "distinct executors" by pointer identity on teardown (§4.8).
pub type SharedExecutor = Arc<dyn Executor>;
