//! The opaque bytes<->value boundary used by every network transport
//! (§4.1). Two implementations ship with this crate; both satisfy the
//! same [`Codec`] trait and the same round-trip law: decoding what was
//! just encoded reproduces the original `Request`/`Response`.

#[cfg(feature = "bincode_codec")]
mod bincode_codec;
mod json_codec;

#[cfg(feature = "bincode_codec")]
pub use bincode_codec::BincodeCodec;
pub use json_codec::JsonCodec;

use crate::envelope::{Request, Response};
use crate::error::{BosonError, Result};

/// A pluggable bytes<->value boundary. Implementations MUST be safe for
/// concurrent use by many threads (§5) -- both shipped codecs are
/// stateless and satisfy this trivially.
///
/// Every transport holds this behind `Arc<dyn Codec>`, so the methods are
/// fixed to the two concrete types that ever cross a transport boundary
/// (§4.1: "the envelope ships exactly these two types") rather than
/// generic over `Serialize`/`DeserializeOwned` -- a trait object can't
/// dispatch a generic method.
pub trait Codec: Send + Sync + 'static {
    fn encode_request(&self, request: &Request) -> Result<Vec<u8>>;
    fn decode_request(&self, bytes: &[u8]) -> Result<Request>;
    fn encode_response(&self, response: &Response) -> Result<Vec<u8>>;
    fn decode_response(&self, bytes: &[u8]) -> Result<Response>;
}

fn serialization_error(expected_type: &str, cause: impl std::error::Error + Send + Sync + 'static) -> BosonError {
    BosonError::with_cause(
        crate::error::ErrorKind::Serialization,
        format!("failed to decode a {expected_type}"),
        cause,
    )
}
