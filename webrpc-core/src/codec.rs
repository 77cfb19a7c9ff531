//! The message codec interface — serialization of requests, responses, and
//! trailer metadata. This is a distinct concern from per-message
//! compression: there is no compression in this wire format, only a
//! pluggable way to turn request/response values into bytes.

use crate::error::{Kind, ServerRpcError};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// A pluggable message codec. The default and only codec this crate ships
/// is [`JsonCodec`], but the interface is designed so another could be
/// added without touching the frame or engine layers.
pub trait Codec: Send + Sync + 'static {
    /// MIME content type this codec speaks, e.g.
    /// `application/grpc-web+json`. Must match exactly on both `Content-Type`
    /// and `Accept`.
    fn content_type(&self) -> &'static str;

    fn encode_request(&self, value: &Value) -> Result<Vec<u8>, ServerRpcError>;
    fn decode_request(&self, bytes: &[u8]) -> Result<Value, ServerRpcError>;

    fn encode_message(&self, value: &Value) -> Result<Vec<u8>, ServerRpcError>;
    fn decode_message(&self, bytes: &[u8]) -> Result<Value, ServerRpcError>;
}

/// The default JSON codec. Rejects `undefined`/absent values on encode and
/// requires the decoded payload to be a JSON object (arrays and bare
/// scalars are rejected).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub const CONTENT_TYPE: &'static str = "application/grpc-web+json";

    fn encode(value: &Value) -> Result<Vec<u8>, ServerRpcError> {
        if value.is_null() {
            return Err(ServerRpcError::internal("cannot encode a null/undefined message"));
        }
        serde_json::to_vec(value)
            .map_err(|e| ServerRpcError::internal(format!("json encode failed: {e}")))
    }

    fn decode(bytes: &[u8]) -> Result<Value, ServerRpcError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ServerRpcError::internal(format!("json decode failed: {e}")))?;
        if !value.is_object() {
            return Err(ServerRpcError::internal("decoded JSON value must be an object"));
        }
        Ok(value)
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        Self::CONTENT_TYPE
    }

    fn encode_request(&self, value: &Value) -> Result<Vec<u8>, ServerRpcError> {
        Self::encode(value)
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Value, ServerRpcError> {
        Self::decode(bytes)
    }

    fn encode_message(&self, value: &Value) -> Result<Vec<u8>, ServerRpcError> {
        Self::encode(value)
    }

    fn decode_message(&self, bytes: &[u8]) -> Result<Value, ServerRpcError> {
        Self::decode(bytes)
    }
}

/// Typed convenience wrapper over a [`Codec`] for callers that want to work
/// with concrete `Serialize`/`Deserialize` types rather than raw `Value`.
pub fn encode_typed<T: Serialize>(codec: &dyn Codec, value: &T) -> Result<Vec<u8>, ServerRpcError> {
    let json = serde_json::to_value(value)
        .map_err(|e| ServerRpcError::internal(format!("failed to project value to json: {e}")))?;
    codec.encode_message(&json)
}

pub fn decode_typed<T: DeserializeOwned>(codec: &dyn Codec, bytes: &[u8]) -> Result<T, ServerRpcError> {
    let json = codec.decode_message(bytes)?;
    serde_json::from_value(json)
        .map_err(|e| ServerRpcError::new(Kind::Internal).with_internal_message(format!("failed to project json to value: {e}")))
}
