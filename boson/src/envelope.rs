//! The self-describing unit of work (`Request`) and its reply (`Response`).
//! Every transport ships exactly these two types; nothing else crosses the
//! wire.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RemoteError;

/// Opaque argument/result value. Concretely this is always JSON-shaped:
/// self-describing for the general-purpose codec, and still perfectly
/// serializable (just without repeated field names) for the optimized
/// bincode codec, since bincode encodes `serde_json::Value` as an ordinary
/// tagged enum.
pub type Value = serde_json::Value;

/// A single remotely-callable invocation, fully self-contained.
///
/// Invariants (enforced at construction, see [`Request::new`]):
/// * `id` is unique per request.
/// * `argument_types.len() == arguments.len()`.
/// * `expires_at`, if set, is an absolute wall-clock deadline.
///
/// A `Request` is immutable once handed to a transport; transports that
/// need to stamp a reply address (the broker transport) do so by
/// constructing a new `Request` via [`Request::with_correlation`] before
/// publishing it, never by mutating one already in flight.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Request {
    pub id: Uuid,
    pub service_type: String,
    pub method_name: String,
    pub argument_types: Vec<String>,
    pub arguments: Vec<Value>,
    pub correlation: String,
    pub expires_at: Option<SystemTime>,
    pub context: HashMap<String, String>,
}

impl Request {
    /// Builds a new request with a freshly generated id. `ttl` becomes
    /// `expires_at = now + ttl` when provided.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service_type: impl Into<String>,
        method_name: impl Into<String>,
        argument_types: Vec<String>,
        arguments: Vec<Value>,
        context: HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Self {
        assert_eq!(
            argument_types.len(),
            arguments.len(),
            "argument_types and arguments must be the same length"
        );
        Request {
            id: Uuid::new_v4(),
            service_type: service_type.into(),
            method_name: method_name.into(),
            argument_types,
            arguments,
            correlation: String::new(),
            expires_at: ttl.map(|d| SystemTime::now() + d),
            context,
        }
    }

    /// Returns a copy of this request with `correlation` replaced. Used by
    /// transports (the broker dispatcher) that must address the reply
    /// destination before publishing.
    pub fn with_correlation(&self, correlation: impl Into<String>) -> Self {
        Request {
            correlation: correlation.into(),
            ..self.clone()
        }
    }

    /// True once `expires_at` is in the past. Requests with no deadline
    /// never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(t) => t <= SystemTime::now(),
            None => false,
        }
    }
}

/// The reply to a [`Request`]. Exactly one of `result` / `error` is
/// present; see [`Response::ok`] / [`Response::fail`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Response {
    pub id: Uuid,
    pub correlation: String,
    pub result: Option<Value>,
    pub error: Option<RemoteError>,
    pub expires_at: Option<SystemTime>,
    pub service_info: Option<String>,
}

impl Response {
    /// Successful reply to `request` carrying `result`.
    pub fn ok(request: &Request, result: Value) -> Self {
        Response {
            id: request.id,
            correlation: request.correlation.clone(),
            result: Some(result),
            error: None,
            expires_at: request.expires_at,
            service_info: None,
        }
    }

    /// Failed reply to `request`. Response construction itself never
    /// fails -- the error is captured into the response, not propagated.
    pub fn fail(request: &Request, error: RemoteError) -> Self {
        Response {
            id: request.id,
            correlation: request.correlation.clone(),
            result: None,
            error: Some(error),
            expires_at: request.expires_at,
            service_info: None,
        }
    }

    pub fn with_service_info(mut self, info: impl Into<String>) -> Self {
        self.service_info = Some(info.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}
