//! Request/response context plumbing: the connector contracts an
//! application implements to attach and read per-call metadata.
//!
//! `EncodedContext` is the lowercase-header-name to percent-encoded-value
//! map that rides over the wire in both directions. The connector traits
//! are small external collaborator interfaces; this crate ships no
//! implementation beyond [`NoopServerContext`]/[`NoopClientContext`] — a
//! connector's internals belong to the application, not this crate.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::collections::BTreeMap;

/// Header-name to percent-encoded-value map. Keys are always lowercase.
pub type EncodedContext = BTreeMap<String, String>;

const CONTEXT_VALUE_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(b'"');

pub fn percent_encode_value(value: &str) -> String {
    utf8_percent_encode(value, CONTEXT_VALUE_ENCODE_SET).to_string()
}

pub fn percent_decode_value(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Build an [`EncodedContext`] from raw `(name, value)` header pairs,
/// case-folding names and percent-decoding values.
pub fn context_from_headers<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> EncodedContext {
    headers
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), percent_decode_value(v)))
        .collect()
}

/// Render an [`EncodedContext`] back into `(name, value)` pairs suitable
/// for use as header values, percent-encoding each value.
pub fn context_to_headers(ctx: &EncodedContext) -> Vec<(String, String)> {
    ctx.iter()
        .map(|(k, v)| (k.clone(), percent_encode_value(v)))
        .collect()
}

/// Implemented by server-side applications to decode the per-call context
/// a client attached to its request, and to produce the context a
/// response carries back.
pub trait ServerContextConnector<T>: Send + Sync {
    fn decode_request_context(&self, encoded: &EncodedContext) -> Result<T, String>;
    fn provide_response_context(&self, error: Option<&crate::error::ServerRpcError>) -> EncodedContext;
}

/// Implemented by client-side applications to produce the per-call context
/// a request carries, and to decode the context a response carried back.
pub trait ClientContextConnector<T>: Send + Sync {
    fn provide_request_context(&self) -> Result<EncodedContext, String>;
    fn decode_response_context(&self, encoded: &EncodedContext) -> Result<T, String>;
}

/// A connector that carries no context at all: decode always yields `()`,
/// provide always yields an empty map.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopServerContext;

impl ServerContextConnector<()> for NoopServerContext {
    fn decode_request_context(&self, _encoded: &EncodedContext) -> Result<(), String> {
        Ok(())
    }

    fn provide_response_context(&self, _error: Option<&crate::error::ServerRpcError>) -> EncodedContext {
        EncodedContext::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClientContext;

impl ClientContextConnector<()> for NoopClientContext {
    fn provide_request_context(&self) -> Result<EncodedContext, String> {
        Ok(EncodedContext::new())
    }

    fn decode_response_context(&self, _encoded: &EncodedContext) -> Result<(), String> {
        Ok(())
    }
}
