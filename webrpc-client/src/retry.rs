//! The retry supervisor: a stream combinator that transparently re-opens a
//! failed stream with exponential backoff, forwarding the downstream event
//! grammar with one addition — `RetryingError`, fired once per failed
//! attempt, whether or not the supervisor goes on to retry it.
//!
//! Built the same way [`crate::stream::spawn_stream`] builds [`RpcStream`]:
//! a detached task communicating over an unbounded channel, started lazily,
//! cancellable through a shared [`CancelToken`]. The supervisor owns at most
//! one upstream attempt at a time: each loop iteration constructs a fresh
//! upstream via the caller's factory and drops the previous one before
//! making another, rather than holding multiple attempts' state live at
//! once.

use crate::stream::{CancelToken, RpcStream, StreamEvent};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use webrpc_core::{ClientError, Kind, compute_backoff};

/// Event grammar for a [`RetryStream`]: the same terminal discipline as
/// [`StreamEvent`] (exactly one of `Complete`/`Canceled`/`Error`, always
/// last), plus `RetryingError` for each failed attempt.
#[derive(Debug)]
pub enum RetryEvent<T> {
    Ready,
    Message(T),
    /// Fired once per failed attempt. `retries_since_ready` counts attempts
    /// since the last `Ready` (or since the stream started, if none yet).
    /// `abandoned` is true exactly on the attempt that will not be retried —
    /// it always immediately precedes `Error`.
    RetryingError {
        err: ClientError,
        retries_since_ready: u32,
        abandoned: bool,
    },
    Complete,
    Canceled,
    Error(ClientError),
}

impl<T> RetryEvent<T> {
    fn is_terminal(&self) -> bool {
        matches!(self, RetryEvent::Complete | RetryEvent::Canceled | RetryEvent::Error(_))
    }
}

/// Classifies the non-retryable kinds: protocol violations and the five RPC
/// kinds that indicate the request itself is unfixable by
/// retrying (`invalidArgument`, `permissionDenied`, `unauthenticated`,
/// `notFound`, `unimplemented`). Everything else, including transport
/// failures and request-context errors, is retried by default.
pub fn default_is_retryable(err: &ClientError) -> bool {
    match err {
        ClientError::Protocol(_) => false,
        ClientError::RequestContext(_) => true,
        ClientError::Rpc { kind, .. } => !matches!(
            kind,
            Kind::InvalidArgument
                | Kind::PermissionDenied
                | Kind::Unauthenticated
                | Kind::NotFound
                | Kind::Unimplemented
        ),
    }
}

/// Configuration for [`retry_stream`]. Deliberately jitter-free:
/// [`compute_backoff`] computes an exact delay from `constant_ms`,
/// `max_backoff_ms`, and `base` (see `webrpc_core::backoff`).
#[derive(Clone)]
pub struct RetryOptions {
    /// `-1` means unbounded.
    pub max_retries: i64,
    pub constant_ms: u64,
    pub max_backoff_ms: u64,
    pub base: f64,
    pub is_retryable: Arc<dyn Fn(&ClientError) -> bool + Send + Sync>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: -1,
            constant_ms: 100,
            max_backoff_ms: 10_000,
            base: 2.0,
            is_retryable: Arc::new(default_is_retryable),
        }
    }
}

impl RetryOptions {
    pub fn max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, constant_ms: u64, max_backoff_ms: u64, base: f64) -> Self {
        self.constant_ms = constant_ms;
        self.max_backoff_ms = max_backoff_ms;
        self.base = base;
        self
    }

    pub fn is_retryable(mut self, predicate: impl Fn(&ClientError) -> bool + Send + Sync + 'static) -> Self {
        self.is_retryable = Arc::new(predicate);
        self
    }

    fn retryable(&self, err: &ClientError, retries_since_ready: u32) -> bool {
        (self.is_retryable)(err)
            && (self.max_retries < 0 || (retries_since_ready as i64) < self.max_retries)
    }
}

/// A supervised sequence of [`RpcStream`] attempts presenting itself as a
/// single stream. Dormant until [`start`](RetryStream::start);
/// `cancel()` forwards to whichever upstream attempt is currently open.
pub struct RetryStream<T> {
    events: mpsc::UnboundedReceiver<RetryEvent<T>>,
    start: Option<oneshot::Sender<()>>,
    cancel: Arc<CancelToken>,
    terminal: bool,
}

impl<T> RetryStream<T> {
    pub fn start(&mut self) {
        if let Some(tx) = self.start.take() {
            let _ = tx.send(());
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T: Unpin> Stream for RetryStream<T> {
    type Item = RetryEvent<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.terminal {
            return Poll::Ready(None);
        }
        match self.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.terminal = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.terminal = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wrap a stream factory in a retry supervisor. `factory` is called
/// once per attempt — on construction, and again after every retryable
/// failure — and must return a fresh, unstarted [`RpcStream`] each time.
pub fn retry_stream<T, F>(factory: F, options: RetryOptions) -> RetryStream<T>
where
    T: Send + 'static,
    F: Fn() -> RpcStream<T> + Send + Sync + 'static,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (start_tx, start_rx) = oneshot::channel();
    let cancel = CancelToken::new();
    let cancel_for_task = cancel.clone();

    tokio::spawn(async move {
        if start_rx.await.is_err() {
            return;
        }
        if cancel_for_task.is_canceled() {
            let _ = events_tx.send(RetryEvent::Canceled);
            return;
        }
        run_attempts(factory, options, cancel_for_task, events_tx).await;
    });

    RetryStream {
        events: events_rx,
        start: Some(start_tx),
        cancel,
        terminal: false,
    }
}

async fn run_attempts<T, F>(
    factory: F,
    options: RetryOptions,
    cancel: Arc<CancelToken>,
    tx: mpsc::UnboundedSender<RetryEvent<T>>,
) where
    T: Send + 'static,
    F: Fn() -> RpcStream<T>,
{
    let mut retries_since_ready: u32 = 0;

    'attempts: loop {
        let mut upstream = factory();
        upstream.start();

        loop {
            tokio::select! {
                biased;
                _ = cancel.canceled() => {
                    upstream.cancel();
                    while let Some(event) = upstream.next().await {
                        if matches!(event, StreamEvent::Complete | StreamEvent::Canceled | StreamEvent::Error(_)) {
                            break;
                        }
                    }
                    let _ = tx.send(RetryEvent::Canceled);
                    return;
                }
                event = upstream.next() => {
                    match event {
                        Some(StreamEvent::Ready) => {
                            retries_since_ready = 0;
                            let _ = tx.send(RetryEvent::Ready);
                        }
                        Some(StreamEvent::Message(m)) => {
                            let _ = tx.send(RetryEvent::Message(m));
                        }
                        Some(StreamEvent::Complete) => {
                            let _ = tx.send(RetryEvent::Complete);
                            return;
                        }
                        Some(StreamEvent::Canceled) => {
                            let _ = tx.send(RetryEvent::Canceled);
                            return;
                        }
                        Some(StreamEvent::Error(err)) => {
                            let n = retries_since_ready;
                            if options.retryable(&err, n) {
                                #[cfg(feature = "tracing")]
                                tracing::debug!(retries_since_ready = n, error = %err, "retrying after failed attempt");
                                let _ = tx.send(RetryEvent::RetryingError {
                                    err,
                                    retries_since_ready: n,
                                    abandoned: false,
                                });
                                retries_since_ready += 1;
                                let delay = compute_backoff(options.constant_ms, options.max_backoff_ms, options.base, n);
                                tokio::select! {
                                    _ = cancel.canceled() => {
                                        let _ = tx.send(RetryEvent::Canceled);
                                        return;
                                    }
                                    _ = tokio::time::sleep(delay) => {}
                                }
                                continue 'attempts;
                            } else {
                                let _ = tx.send(RetryEvent::RetryingError {
                                    err: err.clone(),
                                    retries_since_ready: n,
                                    abandoned: true,
                                });
                                let _ = tx.send(RetryEvent::Error(err));
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    }
}
