//! Transport-agnostic error kinds shared by every component in the crate
//! (§7 of the design: the envelope, the router, and all three transports
//! report failures through this single vocabulary).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classifies a [`BosonError`]. Mirrors the error table in the design:
/// every caller-visible failure is exactly one of these kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum ErrorKind {
    /// Operation invoked on a dispatcher/receiver not in a connected state.
    NotConnected,
    /// The registry was asked to register a duplicate service contract.
    AlreadyRegistered,
    /// A service method does not satisfy the async-completion contract, or
    /// the argument shape at the call site does not match its declaration.
    Contract,
    /// The receiver could not resolve `(method_name, argument_types)` on
    /// its held implementation.
    Resolution,
    /// The codec failed to encode or decode bytes.
    Serialization,
    /// A wire-level failure: non-2xx HTTP status, an unexpectedly closed
    /// broker channel, or a refused connection.
    Transport,
    /// The request's deadline elapsed before a reply arrived, or a socket
    /// read timed out.
    Timeout,
    /// The service implementation itself raised an error.
    Invocation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotConnected => "not connected",
            ErrorKind::AlreadyRegistered => "already registered",
            ErrorKind::Contract => "contract violation",
            ErrorKind::Resolution => "method resolution failed",
            ErrorKind::Serialization => "serialization failure",
            ErrorKind::Transport => "transport failure",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Invocation => "invocation failed",
        };
        f.write_str(s)
    }
}

/// The crate's unified error type. Every fallible public operation returns
/// this (or wraps it). Carries an optional cause for local debugging; the
/// cause is never sent over the wire -- see [`RemoteError`] for the wire
/// form, which flattens the whole chain into `message`.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BosonError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BosonError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        BosonError {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BosonError {
            kind,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn not_connected(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotConnected, detail)
    }

    pub fn already_registered(contract: &str) -> Self {
        Self::new(
            ErrorKind::AlreadyRegistered,
            format!("a receiver or client proxy is already registered for '{contract}'"),
        )
    }

    pub fn contract(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Contract, detail)
    }

    pub fn resolution(method: &str, argument_types: &[String]) -> Self {
        Self::new(
            ErrorKind::Resolution,
            format!("no method '{method}({:?})' on the registered implementation", argument_types),
        )
    }

    pub fn timeout(service: &str, request_id: uuid::Uuid) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("request {request_id} to '{service}' timed out before a reply arrived"),
        )
    }

    /// Flattens this error (and its cause chain, if any) into the kind +
    /// message pair that travels over the wire as part of a `Response`.
    pub fn to_remote(&self) -> RemoteError {
        let mut message = self.message.clone();
        let mut cause = self.cause.as_deref().map(|c| c as &(dyn std::error::Error));
        while let Some(c) = cause {
            message.push_str(" caused by: ");
            message.push_str(&c.to_string());
            cause = c.source();
        }
        RemoteError {
            kind: self.kind,
            message,
        }
    }
}

/// The wire form of an error: carried on `Response::error`. Deliberately
/// has no cause chain -- causes are local debugging aids only.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

impl From<RemoteError> for BosonError {
    fn from(e: RemoteError) -> Self {
        BosonError::new(e.kind, e.message)
    }
}

pub type Result<T> = std::result::Result<T, BosonError>;
