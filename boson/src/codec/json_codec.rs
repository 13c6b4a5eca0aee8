use super::{serialization_error, Codec};
use crate::envelope::{Request, Response};
use crate::error::{BosonError, ErrorKind, Result};

/// General-purpose codec. Self-describing: every value carries its own
/// JSON shape on the wire, so no schema needs to be registered up front.
/// Grounded on the teacher crate's `JSONTransport`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        JsonCodec
    }
}

impl Codec for JsonCodec {
    fn encode_request(&self, request: &Request) -> Result<Vec<u8>> {
        serde_json::to_vec(request)
            .map_err(|e| BosonError::with_cause(ErrorKind::Serialization, "json serialization failed", e))
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Request> {
        serde_json::from_slice(bytes).map_err(|e| serialization_error("Request", e))
    }

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>> {
        serde_json::to_vec(response)
            .map_err(|e| BosonError::with_cause(ErrorKind::Serialization, "json serialization failed", e))
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<Response> {
        serde_json::from_slice(bytes).map_err(|e| serialization_error("Response", e))
    }
}
