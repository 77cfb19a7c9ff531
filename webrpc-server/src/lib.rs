//! gRPC-Web server engine.
//!
//! Mounts one HTTP route per schema method and runs the request → context →
//! dispatch → response pipeline. Built on `axum`.

mod engine;

pub use engine::{
    MessageLimits, ServerEngine, ServerEngineBuilder, StreamCallbacks, StreamSender,
    UnaryHandler, StreamHandler, mount,
};

pub use webrpc_core as core;
