//! The transport-facing contract every binding (in-process, HTTP, broker)
//! satisfies, plus the three bindings themselves (§4.5-§4.7).
//!
//! [`DispatchTransport`] is the client-side half: it turns a built
//! [`Request`](crate::envelope::Request) into a
//! [`Response`](crate::envelope::Response), however it needs to (a direct
//! call, an HTTP POST, a broker publish + routed reply). [`ReceiveTransport`]
//! is the server-side half: given a [`ServiceAdapter`](crate::service::ServiceAdapter),
//! it arranges for inbound requests to reach it and ships back whatever
//! [`ReceiverCore`](crate::receiver::ReceiverCore) produces.

pub mod in_process;

#[cfg(feature = "http_transport")]
pub mod http;

#[cfg(feature = "broker_transport")]
pub mod broker;

use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::{Request, Response};
use crate::error::Result;
use crate::service::ServiceAdapter;

/// Client-side transport object (§3 "ClientProxy", §9 "Dispatcher").
#[async_trait]
pub trait DispatchTransport: Send + Sync {
    /// Marks the transport connected. A no-op for transports with no
    /// handshake (in-process); opens sockets/channels for the others.
    async fn connect(&self) -> Result<()>;

    /// Tears the transport down. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Ships `request` and returns the eventual `Response`. Transports
    /// that hold an open reply channel (HTTP) resolve this directly;
    /// the broker transport resolves it through its
    /// [`ResponseRouter`](crate::router::ResponseRouter).
    async fn dispatch(&self, request: Request) -> Result<Response>;
}

/// Server-side transport object (§3 "Receiver").
#[async_trait]
pub trait ReceiveTransport: Send + Sync {
    /// Installs `adapter` as the target of inbound requests and starts
    /// whatever listening the transport needs (a global map entry, an
    /// HTTP server, a broker consumer + daemons).
    async fn connect(&self, adapter: Arc<dyn ServiceAdapter>) -> Result<()>;

    /// Tears the transport down. Idempotent.
    async fn disconnect(&self) -> Result<()>;
}
