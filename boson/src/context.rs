//! Ambient caller context (§6). The design note in spec.md §9 flags the
//! thread-local default as inadequate for cooperative-multitasking
//! runtimes, so the primary path threads context explicitly through the
//! proxy call and restores it on completion resumption; the pluggable
//! provider trait is kept for callers on runtimes where a true ambient is
//! still useful (e.g. a blocking, one-thread-per-call in-process setup).

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// A snapshot of caller-supplied key/value context, carried across the
/// wire on [`crate::envelope::Request::context`] and reinstated at both
/// ends.
pub type Context = HashMap<String, String>;

/// A pluggable source/sink for ambient context. `get` is called by the
/// proxy at call-start; `set` is called by the receiver before invocation
/// and by the proxy again when the completion resolves (to restore
/// whatever context the calling thread had, since "threads may have
/// changed" by the time the reply arrives).
pub trait ContextProvider: Send + Sync {
    fn get(&self) -> Context;
    fn set(&self, context: Context);
}

thread_local! {
    static CURRENT: RefCell<Context> = RefCell::new(Context::new());
}

/// Default provider: scopes context to the current worker thread via
/// `thread_local!`. Adequate for synchronous, thread-per-call transports
/// (in-process, the HTTP server's handler thread); inadequate once a
/// single logical call can hop between executor threads, which is why the
/// proxy always threads context explicitly rather than relying solely on
/// this.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadLocalContextProvider;

impl ContextProvider for ThreadLocalContextProvider {
    fn get(&self) -> Context {
        CURRENT.with(|c| c.borrow().clone())
    }

    fn set(&self, context: Context) {
        CURRENT.with(|c| *c.borrow_mut() = context);
    }
}

pub type SharedContextProvider = Arc<dyn ContextProvider>;

pub fn default_provider() -> SharedContextProvider {
    Arc::new(ThreadLocalContextProvider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_on_the_same_thread() {
        let provider = ThreadLocalContextProvider;
        let mut ctx = Context::new();
        ctx.insert("tenant".into(), "acme".into());
        provider.set(ctx.clone());
        assert_eq!(provider.get(), ctx);
    }

    #[test]
    fn each_thread_has_its_own_context() {
        let provider = ThreadLocalContextProvider;
        let mut ctx = Context::new();
        ctx.insert("tenant".into(), "acme".into());
        provider.set(ctx);

        let handle = std::thread::spawn(|| ThreadLocalContextProvider.get());
        let other = handle.join().unwrap();
        assert!(other.is_empty());
    }
}
