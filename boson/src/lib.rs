//! `boson` is an RPC framework built around one idea: application code
//! calls a locally-held service handle the same way regardless of
//! whether the counterpart lives in the same process, behind an HTTP
//! endpoint, or behind a message broker. Apply `#[boson_macros::service]`
//! to a trait and the macro generates the client proxy and the
//! receiver-side dispatch table; everything else in this crate is the
//! envelope those two talk through and the three transport bindings that
//! carry it.
//!
//! ```ignore
//! #[boson_macros::service]
//! pub trait HelloService {
//!     async fn say(&self, greeting: String) -> boson::error::Result<String>;
//! }
//! ```
//!
//! See `boson::registry::Registry` for wiring up an implementation
//! (`implement`) or a client (`consume`), and `boson::transports` for the
//! three bindings.

pub use async_trait;

pub mod codec;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod proxy;
pub mod receiver;
pub mod registry;
pub mod router;
pub mod service;
pub mod transports;

pub use boson_macros::service;
