//! The closed error taxonomy shared by the server and client engines.
//!
//! Unlike the full Connect/gRPC code set, this taxonomy has exactly twelve
//! kinds — there is no `deadlineExceeded`, `aborted`, `outOfRange`,
//! `dataLoss`, or `ok` variant. Deadlines are composed externally via
//! cancellation and the retry supervisor's backoff, not built in here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the twelve RPC outcome kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kind {
    Unknown,
    Canceled,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    ResourceExhausted,
    PermissionDenied,
    FailedPrecondition,
    Unimplemented,
    Internal,
    Unavailable,
    Unauthenticated,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Unknown => "unknown",
            Kind::Canceled => "canceled",
            Kind::InvalidArgument => "invalidArgument",
            Kind::NotFound => "notFound",
            Kind::AlreadyExists => "alreadyExists",
            Kind::ResourceExhausted => "resourceExhausted",
            Kind::PermissionDenied => "permissionDenied",
            Kind::FailedPrecondition => "failedPrecondition",
            Kind::Unimplemented => "unimplemented",
            Kind::Internal => "internal",
            Kind::Unavailable => "unavailable",
            Kind::Unauthenticated => "unauthenticated",
        }
    }

    /// Numeric `grpc-status` trailer value.
    pub fn grpc_status(&self) -> u32 {
        match self {
            Kind::Unknown => 2,
            Kind::Canceled => 1,
            Kind::InvalidArgument => 3,
            Kind::NotFound => 5,
            Kind::AlreadyExists => 6,
            Kind::ResourceExhausted => 8,
            Kind::PermissionDenied => 7,
            Kind::FailedPrecondition => 9,
            Kind::Unimplemented => 12,
            Kind::Internal => 13,
            Kind::Unavailable => 14,
            Kind::Unauthenticated => 16,
        }
    }

    /// Inverse of [`Kind::grpc_status`]. Unknown numeric codes map to
    /// `Unknown`, since the trailer's author may be a non-conformant peer.
    pub fn from_grpc_status(code: u32) -> Kind {
        match code {
            1 => Kind::Canceled,
            3 => Kind::InvalidArgument,
            5 => Kind::NotFound,
            6 => Kind::AlreadyExists,
            7 => Kind::PermissionDenied,
            8 => Kind::ResourceExhausted,
            9 => Kind::FailedPrecondition,
            12 => Kind::Unimplemented,
            13 => Kind::Internal,
            14 => Kind::Unavailable,
            16 => Kind::Unauthenticated,
            _ => Kind::Unknown,
        }
    }

    /// The HTTP status a server maps this kind to when it fails before any
    /// message frame has been sent.
    pub fn http_status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Kind::Unknown | Kind::Canceled | Kind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Kind::InvalidArgument | Kind::FailedPrecondition => StatusCode::BAD_REQUEST,
            Kind::NotFound => StatusCode::NOT_FOUND,
            Kind::AlreadyExists => StatusCode::CONFLICT,
            Kind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Kind::PermissionDenied => StatusCode::FORBIDDEN,
            Kind::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Kind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Kind::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    /// Inbound HTTP status decoding on the client: in addition to the
    /// direct inverse of `http_status`, 413/502/504 decode to kinds the
    /// server-side table never produces directly.
    pub fn from_http_status(status: http::StatusCode) -> Kind {
        match status.as_u16() {
            400 => Kind::InvalidArgument,
            401 => Kind::Unauthenticated,
            403 => Kind::PermissionDenied,
            404 => Kind::NotFound,
            409 => Kind::AlreadyExists,
            413 => Kind::InvalidArgument,
            429 => Kind::ResourceExhausted,
            501 => Kind::Unimplemented,
            502 => Kind::Unavailable,
            503 => Kind::Unavailable,
            504 => Kind::Unavailable,
            _ => Kind::Unknown,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised inside a handler. Only [`ServerRpcError::unsafe_transmitted_message`]
/// ever reaches the client; [`ServerRpcError::internal_message`] is for the
/// `reportError` sink only and must never be serialized onto the wire.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {}", internal_message.as_deref().unwrap_or("(no internal message)"))]
pub struct ServerRpcError {
    pub kind: Kind,
    pub internal_message: Option<String>,
    pub unsafe_transmitted_message: Option<String>,
}

impl ServerRpcError {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            internal_message: None,
            unsafe_transmitted_message: None,
        }
    }

    /// Attach a message that is safe to send to the client.
    pub fn with_message(mut self, unsafe_transmitted_message: impl Into<String>) -> Self {
        self.unsafe_transmitted_message = Some(unsafe_transmitted_message.into());
        self
    }

    /// Attach a message that is never sent to the client, only reported.
    pub fn with_internal_message(mut self, internal_message: impl Into<String>) -> Self {
        self.internal_message = Some(internal_message.into());
        self
    }

    /// Every unhandled handler/codec/context-connector failure becomes this:
    /// `internal` with no client-visible detail.
    pub fn internal(internal_message: impl Into<String>) -> Self {
        Self::new(Kind::Internal).with_internal_message(internal_message)
    }

    /// Failure decoding the request body with the negotiated codec.
    pub fn transport(internal_message: impl Into<String>) -> Self {
        Self::internal(internal_message)
    }

    /// Failure while the handler was already streaming.
    pub fn handler_protocol(internal_message: impl Into<String>) -> Self {
        Self::internal(internal_message)
    }
}

/// Errors observed by the client. Wire-level RPC outcomes, protocol
/// violations, and request-context failures are distinct variants.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// A `grpc-status`/HTTP-status outcome reported by the peer.
    #[error("{kind}{}", message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    Rpc {
        kind: Kind,
        message: Option<String>,
        context: Option<std::collections::BTreeMap<String, String>>,
    },
    /// A violation of the gRPC-Web wire contract: zero or multiple messages
    /// for a unary call, a malformed trailer, etc.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// `ContextClient::provideRequestContext()` failed before the request
    /// was even sent.
    #[error("request context error: {0}")]
    RequestContext(String),
}

impl ClientError {
    pub fn kind(&self) -> Kind {
        match self {
            ClientError::Rpc { kind, .. } => *kind,
            ClientError::Protocol(_) => Kind::InvalidArgument,
            ClientError::RequestContext(_) => Kind::Internal,
        }
    }

    pub fn rpc(kind: Kind, message: impl Into<String>) -> Self {
        ClientError::Rpc {
            kind,
            message: Some(message.into()),
            context: None,
        }
    }

    pub fn rpc_bare(kind: Kind) -> Self {
        ClientError::Rpc {
            kind,
            message: None,
            context: None,
        }
    }

    pub fn with_context(mut self, ctx: std::collections::BTreeMap<String, String>) -> Self {
        if let ClientError::Rpc { context, .. } = &mut self {
            *context = Some(ctx);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_status_round_trips() {
        for kind in [
            Kind::Unknown,
            Kind::Canceled,
            Kind::InvalidArgument,
            Kind::NotFound,
            Kind::AlreadyExists,
            Kind::ResourceExhausted,
            Kind::PermissionDenied,
            Kind::FailedPrecondition,
            Kind::Unimplemented,
            Kind::Internal,
            Kind::Unavailable,
            Kind::Unauthenticated,
        ] {
            assert_eq!(Kind::from_grpc_status(kind.grpc_status()), kind);
        }
    }

    #[test]
    fn http_status_table_matches_spec() {
        assert_eq!(Kind::Unknown.http_status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Kind::Canceled.http_status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Kind::InvalidArgument.http_status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(Kind::NotFound.http_status(), http::StatusCode::NOT_FOUND);
        assert_eq!(Kind::AlreadyExists.http_status(), http::StatusCode::CONFLICT);
        assert_eq!(Kind::ResourceExhausted.http_status(), http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(Kind::PermissionDenied.http_status(), http::StatusCode::FORBIDDEN);
        assert_eq!(Kind::Unimplemented.http_status(), http::StatusCode::NOT_IMPLEMENTED);
        assert_eq!(Kind::Unavailable.http_status(), http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(Kind::Unauthenticated.http_status(), http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn inbound_only_http_decodes() {
        assert_eq!(Kind::from_http_status(http::StatusCode::PAYLOAD_TOO_LARGE), Kind::InvalidArgument);
        assert_eq!(Kind::from_http_status(http::StatusCode::BAD_GATEWAY), Kind::Unavailable);
        assert_eq!(Kind::from_http_status(http::StatusCode::GATEWAY_TIMEOUT), Kind::Unavailable);
    }

    #[test]
    fn server_error_hides_internal_message() {
        let e = ServerRpcError::new(Kind::NotFound)
            .with_internal_message("language 'x' not found")
            .with_message("not found");
        assert_eq!(e.unsafe_transmitted_message.as_deref(), Some("not found"));
        assert_ne!(e.internal_message, e.unsafe_transmitted_message);
    }
}
