use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{serialization_error, Codec};
use crate::envelope::{Request, Response};
use crate::error::{BosonError, ErrorKind, RemoteError, Result};

/// Optimized codec. `Request`/`Response` are pre-registered in the sense
/// that bincode never writes a type tag ahead of a value -- the decoder
/// already knows, from the caller's type parameter, exactly which struct
/// layout to expect. Grounded on the teacher crate's `BincodeTransport`.
///
/// `envelope::Value` is `serde_json::Value`, which deserializes through
/// `deserialize_any` -- bincode's deserializer is not self-describing and
/// rejects that outright. So the wire shape here carries `arguments`/
/// `result` as pre-serialized JSON bytes rather than embedding `Value`
/// directly; everything else (ids, strings, the context map, `RemoteError`,
/// `expires_at`) is already a concrete, bincode-compatible type.
#[derive(Serialize, Deserialize)]
struct WireRequest {
    id: Uuid,
    service_type: String,
    method_name: String,
    argument_types: Vec<String>,
    arguments: Vec<Vec<u8>>,
    correlation: String,
    expires_at: Option<SystemTime>,
    context: HashMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    id: Uuid,
    correlation: String,
    result: Option<Vec<u8>>,
    error: Option<RemoteError>,
    expires_at: Option<SystemTime>,
    service_info: Option<String>,
}

fn json_bytes(value: &crate::envelope::Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| BosonError::with_cause(ErrorKind::Serialization, "failed to encode argument value", e))
}

fn json_value(bytes: &[u8]) -> Result<crate::envelope::Value> {
    serde_json::from_slice(bytes)
        .map_err(|e| BosonError::with_cause(ErrorKind::Serialization, "failed to decode argument value", e))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    pub fn new() -> Self {
        BincodeCodec
    }
}

impl Codec for BincodeCodec {
    fn encode_request(&self, request: &Request) -> Result<Vec<u8>> {
        let arguments = request.arguments.iter().map(json_bytes).collect::<Result<Vec<_>>>()?;
        let wire = WireRequest {
            id: request.id,
            service_type: request.service_type.clone(),
            method_name: request.method_name.clone(),
            argument_types: request.argument_types.clone(),
            arguments,
            correlation: request.correlation.clone(),
            expires_at: request.expires_at,
            context: request.context.clone(),
        };
        bincode::serialize(&wire)
            .map_err(|e| BosonError::with_cause(ErrorKind::Serialization, "bincode serialization failed", e))
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Request> {
        let wire: WireRequest = bincode::deserialize(bytes).map_err(|e| serialization_error("Request", e))?;
        let arguments = wire.arguments.iter().map(|b| json_value(b)).collect::<Result<Vec<_>>>()?;
        Ok(Request {
            id: wire.id,
            service_type: wire.service_type,
            method_name: wire.method_name,
            argument_types: wire.argument_types,
            arguments,
            correlation: wire.correlation,
            expires_at: wire.expires_at,
            context: wire.context,
        })
    }

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>> {
        let result = response.result.as_ref().map(json_bytes).transpose()?;
        let wire = WireResponse {
            id: response.id,
            correlation: response.correlation.clone(),
            result,
            error: response.error.clone(),
            expires_at: response.expires_at,
            service_info: response.service_info.clone(),
        };
        bincode::serialize(&wire)
            .map_err(|e| BosonError::with_cause(ErrorKind::Serialization, "bincode serialization failed", e))
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<Response> {
        let wire: WireResponse = bincode::deserialize(bytes).map_err(|e| serialization_error("Response", e))?;
        let result = wire.result.as_deref().map(json_value).transpose()?;
        Ok(Response {
            id: wire.id,
            correlation: wire.correlation,
            result,
            error: wire.error,
            expires_at: wire.expires_at,
            service_info: wire.service_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Request, Response};
    use std::collections::HashMap;

    #[test]
    fn round_trips_a_request() {
        let codec = BincodeCodec::new();
        let req = Request::new(
            "HelloService",
            "say",
            vec!["java.lang.String".into()],
            vec![serde_json::json!("Hello World")],
            HashMap::new(),
            None,
        );
        let bytes = codec.encode_request(&req).unwrap();
        let back = codec.decode_request(&bytes).unwrap();
        assert_eq!(back.id, req.id);
        assert_eq!(back.arguments, req.arguments);
    }

    #[test]
    fn round_trips_a_response() {
        let codec = BincodeCodec::new();
        let req = Request::new("HelloService", "say", vec![], vec![], HashMap::new(), None);
        let resp = Response::ok(&req, serde_json::json!(42));
        let bytes = codec.encode_response(&resp).unwrap();
        let back = codec.decode_response(&bytes).unwrap();
        assert_eq!(back.result, resp.result);
    }

    #[test]
    fn round_trips_a_response_carrying_a_nested_object_result() {
        // Exercises the deserialize_any path that a bare bincode encoding
        // of serde_json::Value cannot survive (see module docs).
        let codec = BincodeCodec::new();
        let req = Request::new("HelloService", "say", vec![], vec![], HashMap::new(), None);
        let resp = Response::ok(&req, serde_json::json!({"greeting": "Hello", "count": 3}));
        let bytes = codec.encode_response(&resp).unwrap();
        let back = codec.decode_response(&bytes).unwrap();
        assert_eq!(back.result, resp.result);
    }

    #[test]
    fn decode_failure_is_a_serialization_error() {
        let codec = BincodeCodec::new();
        let err = codec.decode_request(&[0xff, 0x00, 0x01]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }
}
