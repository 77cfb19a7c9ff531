//! The client engine: turns a method name and a request value into an
//! [`RpcStream`] over one gRPC-Web HTTP/1.1 request.
//!
//! Built on `reqwest`/`reqwest-middleware`, so that every call goes through
//! a `ClientWithMiddleware` and picks up whatever middleware stack the
//! caller configured (retries, auth, tracing propagation, ...).

use crate::stream::{CancelToken, RpcStream, StreamEvent, spawn_stream};
use futures::StreamExt;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrpc_core::{
    ChunkParser, Codec, ClientContextConnector, ClientError, EncodedContext, JsonCodec, Kind,
    context_from_headers, context_to_headers, decode_trailer_metadata, decode_typed,
    encode_typed, percent_decode_value,
};

struct EngineInner<Ctx> {
    base_url: String,
    http_client: ClientWithMiddleware,
    codec: Arc<dyn Codec>,
    context: Arc<dyn ClientContextConnector<Ctx>>,
}

/// Shared dispatch configuration for every call made against one base URL.
/// Cheap to clone: every field is already behind an `Arc` or is itself
/// reference-counted (`ClientWithMiddleware` wraps its own `reqwest::Client`).
pub struct ClientEngine<Ctx> {
    inner: Arc<EngineInner<Ctx>>,
}

impl<Ctx> Clone for ClientEngine<Ctx> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<Ctx: Send + Sync + 'static> ClientEngine<Ctx> {
    pub fn builder(
        base_url: impl Into<String>,
        context: impl ClientContextConnector<Ctx> + 'static,
    ) -> ClientEngineBuilder<Ctx> {
        ClientEngineBuilder {
            base_url: base_url.into(),
            http_client: None,
            codec: Arc::new(JsonCodec),
            context: Arc::new(context),
        }
    }

    /// Open one call. The returned stream is dormant until started —
    /// nothing is sent over the network before then.
    pub fn call<Req, Res>(&self, method: impl Into<String>, request: Req) -> RpcStream<Res>
    where
        Req: Serialize + Send + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        let engine = self.inner.clone();
        let method = method.into();
        spawn_stream(move |cancel, tx| run_call(engine, method, request, cancel, tx))
    }

    /// Typed unary convenience wrapper over [`call`](Self::call).
    pub async fn call_unary<Req, Res>(&self, method: impl Into<String>, request: Req) -> Result<Res, ClientError>
    where
        Req: Serialize + Send + 'static,
        Res: DeserializeOwned + Send + Unpin + 'static,
    {
        self.call(method, request).into_unary().await
    }

    /// Typed server-stream convenience wrapper over [`call`](Self::call).
    /// Returns the stream undriven; the caller decides when to `start()`
    /// it.
    pub fn call_server_stream<Req, Res>(&self, method: impl Into<String>, request: Req) -> RpcStream<Res>
    where
        Req: Serialize + Send + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        self.call(method, request)
    }
}

pub struct ClientEngineBuilder<Ctx> {
    base_url: String,
    http_client: Option<ClientWithMiddleware>,
    codec: Arc<dyn Codec>,
    context: Arc<dyn ClientContextConnector<Ctx>>,
}

impl<Ctx: Send + Sync + 'static> ClientEngineBuilder<Ctx> {
    pub fn http_client(mut self, client: ClientWithMiddleware) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn build(self) -> ClientEngine<Ctx> {
        let http_client = self.http_client.unwrap_or_else(|| {
            reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build()
        });
        ClientEngine {
            inner: Arc::new(EngineInner {
                base_url: self.base_url.trim_end_matches('/').to_string(),
                http_client,
                codec: self.codec,
                context: self.context,
            }),
        }
    }
}

/// The body of one call attempt: request-context → encode → send → status
/// check → response-context → frame loop. Runs as the detached task behind
/// an [`RpcStream`].
async fn run_call<Ctx, Req, Res>(
    engine: Arc<EngineInner<Ctx>>,
    method: String,
    request: Req,
    cancel: Arc<CancelToken>,
    tx: mpsc::UnboundedSender<StreamEvent<Res>>,
) where
    Ctx: Send + Sync + 'static,
    Req: Serialize + Send + 'static,
    Res: DeserializeOwned + Send + 'static,
{
    #[cfg(feature = "tracing")]
    let _span = tracing::info_span!("rpc.call", rpc.method = %method, otel.kind = "client").entered();

    let request_ctx = match engine.context.provide_request_context() {
        Ok(ctx) => ctx,
        Err(msg) => {
            let _ = tx.send(StreamEvent::Error(ClientError::RequestContext(msg)));
            return;
        }
    };

    let body = match encode_typed(engine.codec.as_ref(), &request) {
        Ok(bytes) => bytes,
        Err(err) => {
            let _ = tx.send(StreamEvent::Error(ClientError::Protocol(err.to_string())));
            return;
        }
    };

    let url = format!("{}/{}", engine.base_url, method);
    let mut builder = engine
        .http_client
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, engine.codec.content_type())
        .header(reqwest::header::ACCEPT, engine.codec.content_type())
        .body(body);
    for (name, value) in context_to_headers(&request_ctx) {
        builder = builder.header(name, value);
    }

    let response = tokio::select! {
        biased;
        _ = cancel.canceled() => {
            let _ = tx.send(StreamEvent::Canceled);
            return;
        }
        result = builder.send() => result,
    };

    let response = match response {
        Ok(r) => r,
        Err(err) => {
            let _ = tx.send(StreamEvent::Error(ClientError::rpc(Kind::Unavailable, err.to_string())));
            return;
        }
    };

    let status = response.status();
    let headers = response.headers().clone();
    let response_ctx: EncodedContext = context_from_headers(
        headers.iter().filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v))),
    );

    if !status.is_success() {
        let err = rpc_error_from_headers(&headers, status).with_context(response_ctx);
        let _ = tx.send(StreamEvent::Error(err));
        return;
    }

    // The response context is validated here but its decoded value has no
    // channel to reach the caller once a `Ready` event has already fired
    // with no payload slot — decoding surfaces errors without exposing the
    // value itself.
    if let Err(msg) = engine.context.decode_response_context(&response_ctx) {
        let _ = tx.send(StreamEvent::Error(ClientError::Protocol(format!(
            "response context: {msg}"
        ))));
        return;
    }

    let _ = tx.send(StreamEvent::Ready);

    let mut byte_stream = response.bytes_stream();
    let mut parser = ChunkParser::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.canceled() => {
                let _ = tx.send(StreamEvent::Canceled);
                return;
            }
            next = byte_stream.next() => next,
        };

        let chunk = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                let _ = tx.send(StreamEvent::Error(ClientError::rpc(Kind::Unavailable, err.to_string())));
                return;
            }
            None => {
                let _ = tx.send(StreamEvent::Error(ClientError::Protocol(
                    "connection closed before a trailer frame arrived".into(),
                )));
                return;
            }
        };

        for frame in parser.parse(chunk.as_ref()) {
            if frame.is_trailer {
                let trailer = decode_trailer_metadata(frame.payload.as_ref());
                let grpc_status = trailer
                    .iter()
                    .find(|(k, _)| k == "grpc-status")
                    .and_then(|(_, v)| v.parse::<u32>().ok())
                    .unwrap_or(2);
                if grpc_status == 0 {
                    let _ = tx.send(StreamEvent::Complete);
                } else {
                    let message = trailer
                        .iter()
                        .find(|(k, _)| k == "grpc-message")
                        .map(|(_, v)| percent_decode_value(v));
                    let kind = Kind::from_grpc_status(grpc_status);
                    let err = match message {
                        Some(m) => ClientError::rpc(kind, m),
                        None => ClientError::rpc_bare(kind),
                    };
                    let _ = tx.send(StreamEvent::Error(err));
                }
                return;
            }

            match decode_typed::<Res>(engine.codec.as_ref(), frame.payload.as_ref()) {
                Ok(value) => {
                    let _ = tx.send(StreamEvent::Message(value));
                }
                Err(err) => {
                    let _ = tx.send(StreamEvent::Error(ClientError::Protocol(err.to_string())));
                    return;
                }
            }
        }
    }
}

/// Map a non-success response to a `ClientError::Rpc`, preferring the
/// `grpc-status`/`grpc-message` headers the server's error paths set,
/// falling back to the HTTP status table for peers that never reached the
/// gRPC-Web layer (a proxy's raw 502, say).
fn rpc_error_from_headers(headers: &http::HeaderMap, status: http::StatusCode) -> ClientError {
    let kind = headers
        .get("grpc-status")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u32>().ok())
        .map(Kind::from_grpc_status)
        .unwrap_or_else(|| Kind::from_http_status(status));
    let message = headers
        .get("grpc-message")
        .and_then(|v| v.to_str().ok())
        .map(percent_decode_value);
    match message {
        Some(m) => ClientError::rpc(kind, m),
        None => ClientError::rpc_bare(kind),
    }
}
