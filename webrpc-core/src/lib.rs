//! Core protocol types for webrpc.
//!
//! This crate provides shared types and functions used by both the server
//! (`webrpc-server`) and client (`webrpc-client`) crates.
//!
//! ## Modules
//!
//! - [`error`]: The closed RPC error taxonomy and status mapping tables
//! - [`frame`]: Frame en/decoding and trailer metadata serialization
//! - [`codec`]: The message codec interface and the default JSON codec
//! - [`context`]: Request/response context plumbing and connector traits
//! - [`schema`]: Schema-driven, IDL-free method registration
//! - [`backoff`]: The exponential backoff formula the retry supervisor uses

mod backoff;
mod codec;
mod context;
mod error;
mod frame;
mod schema;

pub use backoff::*;
pub use codec::*;
pub use context::*;
pub use error::*;
pub use frame::*;
pub use schema::*;
