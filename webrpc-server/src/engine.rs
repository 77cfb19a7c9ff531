//! The gRPC-Web server engine: mounts one route per schema method and
//! drives the request → context → dispatch → response pipeline.

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    response::Response,
    routing::post,
};
use futures::Stream;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use webrpc_core::{
    Codec, EncodedContext, JsonCodec, Kind, MethodKind, ServerContextConnector, ServerRpcError,
    ServiceSchema, context_from_headers, context_to_headers, encode_message_frame,
    encode_trailer_frame, encode_trailer_metadata, percent_encode_value,
};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type UnaryHandler<Ctx> =
    Arc<dyn Fn(Value, Ctx) -> BoxFuture<Result<Value, ServerRpcError>> + Send + Sync>;
pub type StreamHandler<Ctx> =
    Arc<dyn Fn(Value, StreamCallbacks, Ctx) -> BoxFuture<Result<(), ServerRpcError>> + Send + Sync>;

enum Handler<Ctx> {
    Unary(UnaryHandler<Ctx>),
    ServerStream(StreamHandler<Ctx>),
}

/// Signals a streaming handler emits through [`StreamCallbacks`]/[`StreamSender`],
/// carried to the task writing the HTTP response body. The handler runs
/// concurrently with body writing, not before it — messages must reach the
/// client as they are produced, not after the handler finishes.
enum Signal {
    Ready,
    Message(Value),
    Complete,
    Error(ServerRpcError),
}

type CloseFn = Box<dyn FnOnce() + Send>;

/// Passed to a server-stream handler. `on_ready` may be called at most
/// once and must precede any `on_message` call.
#[derive(Clone)]
pub struct StreamCallbacks {
    tx: mpsc::UnboundedSender<Signal>,
    ready_called: Arc<AtomicBool>,
    close: Arc<std::sync::Mutex<Option<CloseFn>>>,
}

impl StreamCallbacks {
    /// Announce the stream is open. `close` is invoked if the client
    /// disconnects before a terminal event. Returns `None` if called more
    /// than once.
    pub fn on_ready(&self, close: impl FnOnce() + Send + 'static) -> Option<StreamSender> {
        if self.ready_called.swap(true, Ordering::SeqCst) {
            return None;
        }
        *self.close.lock().unwrap() = Some(Box::new(close) as CloseFn);
        let _ = self.tx.send(Signal::Ready);
        Some(StreamSender { tx: self.tx.clone() })
    }
}

/// Returned by [`StreamCallbacks::on_ready`]; only through this handle can a
/// handler emit messages, enforcing "no message before ready" at the type
/// level.
#[derive(Clone)]
pub struct StreamSender {
    tx: mpsc::UnboundedSender<Signal>,
}

impl StreamSender {
    pub fn on_message(&self, value: Value) {
        let _ = self.tx.send(Signal::Message(value));
    }
}

pub struct MessageLimits {
    pub max_request_bytes: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        // Default request body cap: 100 KiB.
        Self { max_request_bytes: 100 * 1024 }
    }
}

/// Shared, cloneable dispatch configuration mounted at `/<method>` for every
/// schema method. Always held behind an `Arc` (see [`mount`]) rather than
/// cloned directly, since handlers are trait objects with no cheap `Clone`.
pub struct ServerEngine<Ctx> {
    schema: ServiceSchema,
    handlers: BTreeMap<String, Handler<Ctx>>,
    codec: Arc<dyn Codec>,
    context: Arc<dyn ServerContextConnector<Ctx>>,
    limits: MessageLimits,
    report_error: Option<Arc<dyn Fn(&ServerRpcError, &str) + Send + Sync>>,
}

impl<Ctx: Send + Sync + 'static> ServerEngine<Ctx> {
    pub fn builder(schema: ServiceSchema, context: impl ServerContextConnector<Ctx> + 'static) -> ServerEngineBuilder<Ctx> {
        ServerEngineBuilder {
            schema,
            handlers: BTreeMap::new(),
            codec: Arc::new(JsonCodec),
            context: Arc::new(context),
            limits: MessageLimits::default(),
            report_error: None,
        }
    }
}

pub struct ServerEngineBuilder<Ctx> {
    schema: ServiceSchema,
    handlers: BTreeMap<String, Handler<Ctx>>,
    codec: Arc<dyn Codec>,
    context: Arc<dyn ServerContextConnector<Ctx>>,
    limits: MessageLimits,
    report_error: Option<Arc<dyn Fn(&ServerRpcError, &str) + Send + Sync>>,
}

impl<Ctx: Send + Sync + 'static> ServerEngineBuilder<Ctx> {
    pub fn unary(mut self, method: impl Into<String>, handler: UnaryHandler<Ctx>) -> Self {
        let method = method.into();
        assert_eq!(
            self.schema.kind_of(&method),
            Some(MethodKind::Unary),
            "method {method:?} is not registered as unary in the schema"
        );
        self.handlers.insert(method, Handler::Unary(handler));
        self
    }

    pub fn server_stream(mut self, method: impl Into<String>, handler: StreamHandler<Ctx>) -> Self {
        let method = method.into();
        assert_eq!(
            self.schema.kind_of(&method),
            Some(MethodKind::ServerStream),
            "method {method:?} is not registered as server-stream in the schema"
        );
        self.handlers.insert(method, Handler::ServerStream(handler));
        self
    }

    pub fn message_limits(mut self, limits: MessageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn report_error(mut self, sink: impl Fn(&ServerRpcError, &str) + Send + Sync + 'static) -> Self {
        self.report_error = Some(Arc::new(sink));
        self
    }

    pub fn build(self) -> ServerEngine<Ctx> {
        ServerEngine {
            schema: self.schema,
            handlers: self.handlers,
            codec: self.codec,
            context: self.context,
            limits: self.limits,
            report_error: self.report_error,
        }
    }
}

/// Mount every schema method onto an axum [`Router`] at `/<method>`.
pub fn mount<Ctx: Send + Sync + 'static>(engine: ServerEngine<Ctx>) -> Router<()> {
    let engine = Arc::new(engine);
    let mut router = Router::new();
    let methods: Vec<String> = engine.schema.methods().map(|(n, _)| n.to_string()).collect();
    for method in methods {
        let path = format!("/{method}");
        router = router.route(&path, post(dispatch::<Ctx>)).with_state((engine.clone(), method));
    }
    router
}

fn report<Ctx: Send + Sync + 'static>(engine: &ServerEngine<Ctx>, err: &ServerRpcError, url: &str) {
    if let Some(sink) = &engine.report_error {
        // A panicking sink must never escalate past the call site.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink(err, url)));
        if result.is_err() {
            tracing::warn!(url, "reportError sink panicked");
        }
    }
}

async fn dispatch<Ctx: Send + Sync + 'static>(
    State((engine, method)): State<(Arc<ServerEngine<Ctx>>, String)>,
    req: axum::extract::Request,
) -> Response {
    let _span = tracing::info_span!("rpc.call", rpc.method = %method, otel.kind = "server").entered();

    if req.method() != Method::POST {
        return Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .body(Body::empty())
            .unwrap();
    }

    let content_type = engine.codec.content_type();
    let accept_ok = req
        .headers()
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == content_type)
        .unwrap_or(false);
    let content_type_ok = req
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == content_type)
        .unwrap_or(false);
    if !accept_ok || !content_type_ok {
        return Response::builder()
            .status(StatusCode::NOT_ACCEPTABLE)
            .body(Body::empty())
            .unwrap();
    }

    let headers = req.headers().clone();
    let limit = engine.limits.max_request_bytes;
    let body = req.into_body();
    let collected = match BodyExt::limited(body, limit).collect().await {
        Ok(c) => c.to_bytes(),
        Err(_) => {
            return error_before_headers(
                &engine,
                ServerRpcError::new(Kind::InvalidArgument).with_message("Request Too Large"),
            );
        }
    };

    let encoded_request_ctx: EncodedContext = context_from_headers(
        headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v))),
    );

    let ctx = match engine.context.decode_request_context(&encoded_request_ctx) {
        Ok(ctx) => ctx,
        Err(msg) => {
            let err = ServerRpcError::internal(msg);
            report(&engine, &err, &method);
            return error_before_headers(&engine, err);
        }
    };

    let request_value = match engine.codec.decode_request(&collected) {
        Ok(v) => v,
        Err(err) => {
            report(&engine, &err, &method);
            return error_before_headers(&engine, err);
        }
    };

    let handler = match engine.handlers.get(&method) {
        Some(h) => h,
        None => {
            return error_before_headers(&engine, ServerRpcError::new(Kind::Unimplemented).with_message("method not implemented"));
        }
    };

    match handler {
        Handler::Unary(f) => dispatch_unary(&engine, &method, f.clone(), request_value, ctx).await,
        Handler::ServerStream(f) => dispatch_stream(&engine, &method, f.clone(), request_value, ctx).await,
    }
}

async fn dispatch_unary<Ctx: Send + Sync + 'static>(
    engine: &ServerEngine<Ctx>,
    method: &str,
    handler: UnaryHandler<Ctx>,
    request: Value,
    ctx: Ctx,
) -> Response {
    match handler(request, ctx).await {
        Ok(response_value) => {
            let response_ctx = engine.context.provide_response_context(None);
            let message = match engine.codec.encode_message(&response_value) {
                Ok(bytes) => bytes,
                Err(err) => {
                    report(engine, &err, method);
                    return error_before_headers(engine, err);
                }
            };
            let mut body = Vec::new();
            body.extend_from_slice(&encode_message_frame(&message));
            body.extend_from_slice(&encode_trailer_frame(&encode_trailer_metadata(&[("grpc-status", "0")])));

            let mut builder = Response::builder().status(StatusCode::OK);
            apply_content_type(&mut builder, engine.codec.content_type());
            apply_response_context(&mut builder, &response_ctx);
            builder.body(Body::from(body)).unwrap()
        }
        Err(err) => {
            report(engine, &err, method);
            error_before_headers(engine, err)
        }
    }
}

/// `futures::Stream` of frame bytes backed by an mpsc receiver, with a
/// `Drop` impl that fires the handler's close callback if the stream is
/// torn down (client disconnect) before a terminal frame was ever yielded.
struct StreamBody {
    rx: mpsc::UnboundedReceiver<Signal>,
    codec: Arc<dyn Codec>,
    report_error: Option<Arc<dyn Fn(&ServerRpcError, &str) + Send + Sync>>,
    method: String,
    close: Arc<std::sync::Mutex<Option<CloseFn>>>,
    finished: bool,
}

impl Stream for StreamBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Signal::Message(value))) => match self.codec.encode_message(&value) {
                Ok(bytes) => Poll::Ready(Some(Ok(Bytes::from(encode_message_frame(&bytes))))),
                Err(err) => {
                    self.finished = true;
                    self.report(&err);
                    Poll::Ready(Some(Ok(error_trailer_bytes(&err))))
                }
            },
            Poll::Ready(Some(Signal::Complete)) => {
                self.finished = true;
                Poll::Ready(Some(Ok(Bytes::from(encode_trailer_frame(&encode_trailer_metadata(&[("grpc-status", "0")]))))))
            }
            Poll::Ready(Some(Signal::Error(err))) => {
                self.finished = true;
                self.report(&err);
                Poll::Ready(Some(Ok(error_trailer_bytes(&err))))
            }
            Poll::Ready(Some(Signal::Ready)) => {
                // Only one `Ready` signal is ever sent, and it is consumed
                // before this stream is constructed; treat a stray one as
                // a no-op poll rather than ending the stream.
                self.poll_next(cx)
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl StreamBody {
    fn report(&self, err: &ServerRpcError) {
        if let Some(sink) = &self.report_error {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink(err, &self.method)));
        }
    }
}

impl Drop for StreamBody {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(close) = self.close.lock().unwrap().take() {
                close();
            }
        }
    }
}

fn error_trailer_bytes(err: &ServerRpcError) -> Bytes {
    let message = err.unsafe_transmitted_message.as_deref().map(percent_encode_value).unwrap_or_default();
    Bytes::from(encode_trailer_frame(&encode_trailer_metadata(&[
        ("grpc-status", &err.kind.grpc_status().to_string()),
        ("grpc-message", &message),
    ])))
}

async fn dispatch_stream<Ctx: Send + Sync + 'static>(
    engine: &ServerEngine<Ctx>,
    method: &str,
    handler: StreamHandler<Ctx>,
    request: Value,
    ctx: Ctx,
) -> Response {
    let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
    let ready_called = Arc::new(AtomicBool::new(false));
    let close: Arc<std::sync::Mutex<Option<CloseFn>>> = Arc::new(std::sync::Mutex::new(None));
    let callbacks = StreamCallbacks {
        tx: tx.clone(),
        ready_called,
        close: close.clone(),
    };

    // The handler runs concurrently with response writing: a slow
    // server-stream handler must not block delivery of the messages it has
    // already emitted.
    tokio::spawn(async move {
        let result = handler(request, callbacks, ctx).await;
        let signal = match result {
            Ok(()) => Signal::Complete,
            Err(e) => Signal::Error(e),
        };
        let _ = tx.send(signal);
    });

    let first = rx.recv().await;
    match first {
        Some(Signal::Ready) => {
            let response_ctx = engine.context.provide_response_context(None);
            let body_stream = StreamBody {
                rx,
                codec: engine.codec.clone(),
                report_error: engine.report_error.clone(),
                method: method.to_string(),
                close,
                finished: false,
            };
            let mut builder = Response::builder().status(StatusCode::OK);
            apply_content_type(&mut builder, engine.codec.content_type());
            apply_response_context(&mut builder, &response_ctx);
            builder.body(Body::from_stream(body_stream)).unwrap()
        }
        Some(Signal::Complete) => {
            // A handler that resolves without ever calling on_ready is a
            // successful empty stream: the success trailer is the whole body.
            let mut body = Vec::new();
            body.extend_from_slice(&encode_trailer_frame(&encode_trailer_metadata(&[("grpc-status", "0")])));
            let mut builder = Response::builder().status(StatusCode::OK);
            apply_content_type(&mut builder, engine.codec.content_type());
            builder.body(Body::from(body)).unwrap()
        }
        Some(Signal::Error(err)) => {
            report(engine, &err, method);
            error_before_headers(engine, err)
        }
        Some(Signal::Message(_)) | None => {
            // Unreachable under normal operation: `on_message` is only
            // reachable through the `StreamSender` returned by `on_ready`.
            error_before_headers(engine, ServerRpcError::internal("handler protocol violation: message before ready"))
        }
    }
}

fn apply_content_type(builder: &mut http::response::Builder, content_type: &str) {
    if let Some(headers) = builder.headers_mut() {
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    }
}

fn apply_response_context(builder: &mut http::response::Builder, ctx: &EncodedContext) {
    if let Some(headers) = builder.headers_mut() {
        for (k, v) in context_to_headers(ctx) {
            if let (Ok(name), Ok(value)) = (
                http::header::HeaderName::try_from(k),
                HeaderValue::from_str(&v),
            ) {
                headers.insert(name, value);
            }
        }
    }
}

/// Error path for failures before any headers have been committed: the
/// mapped HTTP status plus `grpc-status`/`grpc-message` as response headers
/// and an empty body.
fn error_before_headers<Ctx: Send + Sync + 'static>(engine: &ServerEngine<Ctx>, err: ServerRpcError) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("grpc-status", HeaderValue::from_str(&err.kind.grpc_status().to_string()).unwrap());
    if let Some(msg) = &err.unsafe_transmitted_message {
        if let Ok(value) = HeaderValue::from_str(&percent_encode_value(msg)) {
            headers.insert("grpc-message", value);
        }
    }
    let response_ctx = engine.context.provide_response_context(Some(&err));
    for (k, v) in context_to_headers(&response_ctx) {
        if let (Ok(name), Ok(value)) = (http::header::HeaderName::try_from(k), HeaderValue::from_str(&v)) {
            headers.insert(name, value);
        }
    }

    let mut response = Response::builder().status(err.kind.http_status()).body(Body::empty()).unwrap();
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt as _;
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use webrpc_core::{NoopServerContext, decode_trailer_metadata};

    fn post(path: &str, body: &[u8]) -> axum::extract::Request {
        axum::extract::Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(http::header::CONTENT_TYPE, JsonCodec::CONTENT_TYPE)
            .header(http::header::ACCEPT, JsonCodec::CONTENT_TYPE)
            .body(Body::from(body.to_vec()))
            .unwrap()
    }

    fn increment_router() -> Router {
        let schema = ServiceSchema::new().register("increment", MethodKind::Unary);
        let engine = ServerEngine::builder(schema, NoopServerContext)
            .unary(
                "increment",
                Arc::new(|req: Value, _ctx: ()| {
                    Box::pin(async move {
                        let value = req.get("value").and_then(Value::as_i64).unwrap_or(0);
                        Ok(json!({ "value": value + 1 }))
                    })
                }),
            )
            .build();
        mount(engine)
    }

    #[tokio::test]
    async fn unary_success_writes_message_then_success_trailer() {
        let router = increment_router();
        let response = router
            .oneshot(post("/increment", br#"{"value":10}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();

        // One message frame carrying {"value":11} followed by a trailer
        // frame carrying an empty grpc-status.
        assert_eq!(body[0], 0x00);
        let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
        let message = &body[5..5 + len];
        assert_eq!(serde_json::from_slice::<Value>(message).unwrap(), json!({"value": 11}));

        let rest = &body[5 + len..];
        assert_eq!(rest[0], webrpc_core::TRAILER_FLAG);
        let trailer_len = u32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
        let trailer = decode_trailer_metadata(&rest[5..5 + trailer_len]);
        assert_eq!(trailer, vec![("grpc-status".to_string(), "0".to_string())]);
    }

    #[tokio::test]
    async fn unary_not_found_reports_internal_message_transmits_only_safe_message() {
        let schema = ServiceSchema::new().register("getHello", MethodKind::Unary);
        let reported: Arc<Mutex<Vec<(Kind, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
        let reported_for_sink = reported.clone();
        let engine = ServerEngine::builder(schema, NoopServerContext)
            .unary(
                "getHello",
                Arc::new(|_req: Value, _ctx: ()| {
                    Box::pin(async move {
                        Err(ServerRpcError::new(Kind::NotFound)
                            .with_internal_message("language 'x' not found")
                            .with_message("language 'x' not found"))
                    })
                }),
            )
            .report_error(move |err, _url| {
                reported_for_sink.lock().unwrap().push((err.kind, err.internal_message.clone()));
            })
            .build();
        let router = mount(engine);

        let response = router
            .oneshot(post("/getHello", br#"{"language":"x"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("grpc-status").unwrap(),
            &Kind::NotFound.grpc_status().to_string()
        );
        assert_eq!(
            response.headers().get("grpc-message").unwrap(),
            "language%20'x'%20not%20found"
        );

        let calls = reported.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Kind::NotFound);
        assert_eq!(calls[0].1.as_deref(), Some("language 'x' not found"));
    }

    #[tokio::test]
    async fn rejects_non_post_with_405() {
        let router = increment_router();
        let request = axum::extract::Request::builder()
            .method(Method::GET)
            .uri("/increment")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn rejects_content_negotiation_mismatch_with_406() {
        let router = increment_router();
        let request = axum::extract::Request::builder()
            .method(Method::POST)
            .uri("/increment")
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "application/json")
            .body(Body::from(&b"{}"[..]))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn rejects_oversized_request_body() {
        let schema = ServiceSchema::new().register("increment", MethodKind::Unary);
        let engine = ServerEngine::builder(schema, NoopServerContext)
            .unary(
                "increment",
                Arc::new(|req: Value, _ctx: ()| Box::pin(async move { Ok(req) })),
            )
            .message_limits(MessageLimits { max_request_bytes: 5 })
            .build();
        let router = mount(engine);

        let response = router
            .oneshot(post("/increment", br#"{"value":1234567890}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("grpc-message").unwrap(),
            "Request%20Too%20Large"
        );
    }

    #[tokio::test]
    async fn server_stream_emits_ready_then_messages_then_success_trailer() {
        let schema = ServiceSchema::new().register("streamNumbers", MethodKind::ServerStream);
        let engine = ServerEngine::builder(schema, NoopServerContext)
            .server_stream(
                "streamNumbers",
                Arc::new(|req: Value, callbacks: StreamCallbacks, _ctx: ()| {
                    Box::pin(async move {
                        let max = req.get("max").and_then(Value::as_u64).unwrap_or(0);
                        let sender = callbacks.on_ready(|| {}).unwrap();
                        for i in 0..max {
                            sender.on_message(json!({ "counter": i }));
                        }
                        Ok(())
                    })
                }),
            )
            .build();
        let router = mount(engine);

        let response = router
            .oneshot(post("/streamNumbers", br#"{"max":3}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();

        let mut parser = webrpc_core::ChunkParser::new();
        let frames = parser.parse(&body);
        assert_eq!(frames.len(), 4);
        assert!(!frames[0].is_trailer);
        assert!(!frames[1].is_trailer);
        assert!(!frames[2].is_trailer);
        assert!(frames[3].is_trailer);
        assert_eq!(
            serde_json::from_slice::<Value>(&frames[0].payload).unwrap(),
            json!({"counter": 0})
        );
        assert_eq!(decode_trailer_metadata(&frames[3].payload), vec![("grpc-status".to_string(), "0".to_string())]);
    }

    #[tokio::test]
    async fn server_stream_handler_completing_without_on_ready_sends_success_trailer_only() {
        // A handler that resolves without ever calling `on_ready` is a
        // successful empty stream, not a protocol error.
        let schema = ServiceSchema::new().register("streamNumbers", MethodKind::ServerStream);
        let engine = ServerEngine::builder(schema, NoopServerContext)
            .server_stream(
                "streamNumbers",
                Arc::new(|_req: Value, _callbacks: StreamCallbacks, _ctx: ()| {
                    Box::pin(async move { Ok(()) })
                }),
            )
            .build();
        let router = mount(engine);

        let response = router
            .oneshot(post("/streamNumbers", br#"{"max":0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();

        let mut parser = webrpc_core::ChunkParser::new();
        let frames = parser.parse(&body);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_trailer);
        assert_eq!(decode_trailer_metadata(&frames[0].payload), vec![("grpc-status".to_string(), "0".to_string())]);
    }
}
