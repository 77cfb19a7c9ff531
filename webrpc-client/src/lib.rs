//! gRPC-Web client engine.
//!
//! Opens calls against a `webrpc-server`-mounted service and exposes each as
//! an [`RpcStream`](stream::RpcStream): dormant until started, carrying the
//! same `ready → message* → (complete|canceled|error)` event grammar the
//! server side observes internally. [`retry::retry_stream`] wraps a call
//! factory with exponential-backoff re-invocation for callers that want
//! transparent retry on transient failures.
//!
//! ## Example
//!
//! ```ignore
//! use webrpc_client::ClientEngine;
//! use webrpc_core::NoopClientContext;
//!
//! let engine = ClientEngine::builder("http://localhost:3000", NoopClientContext).build();
//! let response: MyResponse = engine.call_unary("myMethod", MyRequest { .. }).await?;
//! ```
//!
//! ## Server Streaming Example
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut stream = engine.call_server_stream::<MyRequest, MyItem>("myMethod", request);
//! stream.start();
//! while let Some(event) = stream.next().await {
//!     // handle StreamEvent::{Ready, Message, Complete, Canceled, Error}
//! }
//! ```

mod client;
mod retry;
mod stream;

pub use client::{ClientEngine, ClientEngineBuilder};
pub use retry::{RetryEvent, RetryOptions, RetryStream, default_is_retryable, retry_stream};
pub use stream::{RpcStream, StreamEvent};

pub use webrpc_core as core;
