//! Generated-code support for `#[boson_macros::service]`: the receiver-side
//! dispatch contract (§4.3, §9 "Dynamic method dispatch") and the
//! (de)serialization helpers generated clients/adapters use to cross the
//! opaque [`Value`](crate::envelope::Value) boundary.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::envelope::Value;
use crate::error::{BosonError, ErrorKind, Result};

/// Resolves `(method_name, argument_types)` to a callable on a held
/// implementation and invokes it. One is generated per service contract by
/// `#[boson_macros::service]`; [`crate::receiver::ReceiverCore`] holds it
/// as a trait object so the rest of the framework never needs to know the
/// concrete service type.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// The fully-qualified contract name this adapter was generated for.
    fn contract_name(&self) -> &'static str;

    /// Invokes the method named `method_name`. `argument_types` are the
    /// ordered parameter type labels used to disambiguate overloads.
    /// Returns `Err` with `ErrorKind::Resolution` if no method matches.
    async fn dispatch(
        &self,
        method_name: &str,
        argument_types: &[String],
        arguments: Vec<Value>,
    ) -> Result<Value>;
}

/// Encodes a single call argument into the opaque `Value` boundary.
pub fn encode_argument<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| BosonError::with_cause(ErrorKind::Serialization, "failed to encode argument", e))
}

/// Decodes a single call argument out of the opaque `Value` boundary.
/// `type_name` only labels the error if decoding fails.
pub fn decode_argument<T: DeserializeOwned>(value: Value, type_name: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        BosonError::with_cause(
            ErrorKind::Serialization,
            format!("failed to decode argument as {type_name}"),
            e,
        )
    })
}

/// Encodes a method's return value into the opaque `Value` boundary.
pub fn encode_result<T: Serialize>(value: &T) -> Result<Value> {
    encode_argument(value)
}
