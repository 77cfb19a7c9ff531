//! The stream abstraction: a uniform, event-driven handle over one RPC call
//! attempt, covering both unary calls (exactly one message then `complete`)
//! and server streams (zero or more messages then `complete`).
//!
//! Construction is separate from activation: a stream emits nothing until
//! `start()` is called, and `cancel()` is a distinct, idempotent operation
//! independent of dropping the handle. The underlying call runs as a
//! detached task from the moment of construction, synchronized with the
//! handle over channels — the same signal-channel technique `webrpc-server`
//! uses to decouple handler execution from response-body writing.

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{Notify, mpsc, oneshot};
use webrpc_core::ClientError;

/// One lifecycle event of a [`RpcStream`]. Exactly one of `Complete`,
/// `Canceled`, or `Error` is ever delivered, and it is always the last
/// event.
#[derive(Debug)]
pub enum StreamEvent<T> {
    Ready,
    Message(T),
    Complete,
    Canceled,
    Error(ClientError),
}

impl<T> StreamEvent<T> {
    fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Canceled | StreamEvent::Error(_))
    }
}

/// Shared cancellation flag plus a waiter list, so both the stream handle
/// and the detached task driving it observe the same `cancel()` call.
pub(crate) struct CancelToken {
    canceled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { canceled: AtomicBool::new(false), notify: Notify::new() })
    }

    pub(crate) fn cancel(&self) {
        if !self.canceled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called. Resolves immediately if it
    /// already has.
    pub(crate) async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// A handle over one RPC call attempt. Dormant until
/// [`start`](RpcStream::start); before that, polling never yields an item.
pub struct RpcStream<T> {
    events: mpsc::UnboundedReceiver<StreamEvent<T>>,
    start: Option<oneshot::Sender<()>>,
    cancel: Arc<CancelToken>,
    terminal: bool,
}

/// Spawn the task that drives one call attempt. `producer` is handed the
/// shared cancel token and the event sender; it is responsible for sending
/// exactly one terminal event before returning.
pub(crate) fn spawn_stream<T, F, Fut>(producer: F) -> RpcStream<T>
where
    T: Send + 'static,
    F: FnOnce(Arc<CancelToken>, mpsc::UnboundedSender<StreamEvent<T>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
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
            let _ = events_tx.send(StreamEvent::Canceled);
            return;
        }
        producer(cancel_for_task, events_tx).await;
    });

    RpcStream { events: events_rx, start: Some(start_tx), cancel, terminal: false }
}

impl<T> RpcStream<T> {
    /// Idempotent. The first call releases the detached task to begin the
    /// call; later calls are no-ops.
    pub fn start(&mut self) {
        if let Some(tx) = self.start.take() {
            let _ = tx.send(());
        }
    }

    /// Idempotent. Requests termination; a `Canceled` event is guaranteed
    /// unless a terminal event has already been delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T: Unpin> Stream for RpcStream<T> {
    type Item = StreamEvent<T>;

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

impl<T: Send + Unpin + 'static> RpcStream<T> {
    /// Unary adapter: promotes the stream into a single value. Zero or
    /// more-than-one messages before `complete` is a protocol error, and so
    /// is a terminal `canceled` — each a distinct, named outcome.
    pub async fn into_unary(mut self) -> Result<T, ClientError> {
        use futures::StreamExt;
        self.start();
        let mut value: Option<T> = None;
        loop {
            match self.next().await {
                Some(StreamEvent::Ready) => {}
                Some(StreamEvent::Message(m)) => {
                    if value.is_some() {
                        self.cancel();
                        return Err(ClientError::Protocol(
                            "unary call received more than one message".into(),
                        ));
                    }
                    value = Some(m);
                }
                Some(StreamEvent::Complete) => {
                    return value.ok_or_else(|| {
                        ClientError::Protocol("unary call completed with no message".into())
                    });
                }
                Some(StreamEvent::Canceled) => {
                    return Err(ClientError::rpc_bare(webrpc_core::Kind::Canceled));
                }
                Some(StreamEvent::Error(e)) => return Err(e),
                None => {
                    return Err(ClientError::Protocol(
                        "stream ended without a terminal event".into(),
                    ));
                }
            }
        }
    }

    /// Stream-as-array adapter: collects every message, resolving on
    /// `complete` and rejecting on `error` or `canceled`.
    pub async fn into_vec(mut self) -> Result<Vec<T>, ClientError> {
        use futures::StreamExt;
        self.start();
        let mut items = Vec::new();
        loop {
            match self.next().await {
                Some(StreamEvent::Ready) => {}
                Some(StreamEvent::Message(m)) => items.push(m),
                Some(StreamEvent::Complete) => return Ok(items),
                Some(StreamEvent::Canceled) => {
                    return Err(ClientError::Protocol("stream was canceled".into()));
                }
                Some(StreamEvent::Error(e)) => return Err(e),
                None => {
                    return Err(ClientError::Protocol(
                        "stream ended without a terminal event".into(),
                    ));
                }
            }
        }
    }

    /// Transform adapter: `f` is applied to each message. A `f` that
    /// fails emits `error` and ends the mapped stream; `cancel()` on the
    /// mapped stream cancels the source.
    pub fn map<U, F>(mut self, mut f: F) -> RpcStream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Result<U, ClientError> + Send + 'static,
    {
        use futures::StreamExt;
        spawn_stream(move |cancel, tx| async move {
            self.start();
            loop {
                tokio::select! {
                    _ = cancel.canceled() => {
                        self.cancel();
                        let _ = tx.send(StreamEvent::Canceled);
                        return;
                    }
                    event = self.next() => {
                        match event {
                            Some(StreamEvent::Ready) => {
                                let _ = tx.send(StreamEvent::Ready);
                            }
                            Some(StreamEvent::Message(m)) => match f(m) {
                                Ok(u) => {
                                    let _ = tx.send(StreamEvent::Message(u));
                                }
                                Err(e) => {
                                    let _ = tx.send(StreamEvent::Error(e));
                                    return;
                                }
                            },
                            Some(StreamEvent::Complete) => {
                                let _ = tx.send(StreamEvent::Complete);
                                return;
                            }
                            Some(StreamEvent::Canceled) => {
                                let _ = tx.send(StreamEvent::Canceled);
                                return;
                            }
                            Some(StreamEvent::Error(e)) => {
                                let _ = tx.send(StreamEvent::Error(e));
                                return;
                            }
                            None => return,
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use webrpc_core::Kind;

    fn scripted_stream(events: Vec<StreamEvent<i32>>) -> RpcStream<i32> {
        spawn_stream(move |cancel, tx| async move {
            for event in events {
                if cancel.is_canceled() {
                    let _ = tx.send(StreamEvent::Canceled);
                    return;
                }
                let terminal = event.is_terminal();
                let _ = tx.send(event);
                if terminal {
                    return;
                }
                // Give a consumer racing to call `cancel()` a chance to land
                // between scripted events instead of the whole script firing
                // before the executor hands control back.
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
    }

    #[tokio::test]
    async fn dormant_until_started() {
        let stream = scripted_stream(vec![StreamEvent::Message(1), StreamEvent::Complete]);
        // Dropping without starting must not panic or hang; the task simply
        // never runs its body because the oneshot sender is dropped.
        drop(stream);
    }

    #[tokio::test]
    async fn unary_adapter_fulfills_on_exactly_one_message() {
        let stream = scripted_stream(vec![
            StreamEvent::Ready,
            StreamEvent::Message(11),
            StreamEvent::Complete,
        ]);
        assert_eq!(stream.into_unary().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn unary_adapter_rejects_zero_messages() {
        let stream = scripted_stream(vec![StreamEvent::Ready, StreamEvent::Complete]);
        let err = stream.into_unary().await.unwrap_err();
        assert_eq!(err.kind(), Kind::InvalidArgument);
    }

    #[tokio::test]
    async fn unary_adapter_rejects_multiple_messages() {
        let stream = scripted_stream(vec![
            StreamEvent::Message(1),
            StreamEvent::Message(2),
            StreamEvent::Complete,
        ]);
        assert!(stream.into_unary().await.is_err());
    }

    #[tokio::test]
    async fn unary_adapter_rejects_late_cancel_with_distinct_kind() {
        let stream = scripted_stream(vec![StreamEvent::Ready, StreamEvent::Canceled]);
        let err = stream.into_unary().await.unwrap_err();
        assert_eq!(err.kind(), Kind::Canceled);
    }

    #[tokio::test]
    async fn as_vec_collects_all_messages() {
        let stream = scripted_stream(vec![
            StreamEvent::Ready,
            StreamEvent::Message(1),
            StreamEvent::Message(2),
            StreamEvent::Message(3),
            StreamEvent::Complete,
        ]);
        assert_eq!(stream.into_vec().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn map_adapter_transforms_messages() {
        let stream = scripted_stream(vec![
            StreamEvent::Ready,
            StreamEvent::Message(1),
            StreamEvent::Message(2),
            StreamEvent::Complete,
        ]);
        let mapped = stream.map(|v| Ok(v * 10));
        assert_eq!(mapped.into_vec().await.unwrap(), vec![10, 20]);
    }

    #[tokio::test]
    async fn map_adapter_propagates_f_error() {
        let stream = scripted_stream(vec![
            StreamEvent::Ready,
            StreamEvent::Message(1),
            StreamEvent::Complete,
        ]);
        let mapped = stream.map(|_| Err(ClientError::Protocol("boom".into())));
        assert!(mapped.into_vec().await.is_err());
    }

    #[tokio::test]
    async fn cancel_before_terminal_yields_canceled() {
        let mut stream = scripted_stream(vec![
            StreamEvent::Ready,
            StreamEvent::Message(1),
            StreamEvent::Message(2),
            StreamEvent::Complete,
        ]);
        stream.start();
        assert!(matches!(stream.next().await, Some(StreamEvent::Ready)));
        stream.cancel();
        // Whatever arrives from here on, the stream must end in `Canceled`
        // and never resume emitting messages after cancellation.
        let mut saw_canceled = false;
        while let Some(event) = stream.next().await {
            if matches!(event, StreamEvent::Canceled) {
                saw_canceled = true;
            }
        }
        assert!(saw_canceled);
    }
}
