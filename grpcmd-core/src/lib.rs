//! # grpcmd Core
//!
//! `grpcmd-core` is the engine behind the `grpcmd` CLI. It invokes any method on any gRPC
//! server without compile-time knowledge of the Protobuf schema, discovering the server's
//! API through Server Reflection or through local `.proto` files.
//!
//! ## Key Components
//!
//! * **[`Session`]:** Owns one connection, its reflection client and its descriptor source.
//!   Every operation of the engine hangs off a session.
//! * **[`catalog::MethodCatalog`]:** Lazily lists services and methods and memoizes them for
//!   the lifetime of the session.
//! * **[`resolver::resolve`]:** Maps a short method name typed by a human (`Echo`,
//!   `EchoService.Echo`, ...) to the single fully-qualified method the server exposes.
//! * **[`Session::call_with_result`]:** Drives one RPC and folds its events (headers,
//!   responses, trailers) into a [`CallResult`].
//! * **[`request::parse_request`]:** Splits raw request text into headers and a JSON body.
//! * **[`describe::MethodDescription`]:** Renders a method, its messages and a JSON request
//!   template.
//! * **[`store::ConfigStore`]:** Persistent key/value settings with a change watcher.
//!
//! ## Internal clients
//!
//! * **[`grpc::client::GrpcClient`]:** A dynamic gRPC client that moves
//!   `prost_reflect::DynamicMessage`s over the wire.
//! * **[`reflection::client::ReflectionClient`]:** A gRPC Reflection client offering the
//!   subset of the protocol the engine needs.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod catalog;
pub mod describe;
pub mod events;
pub mod grpc;
pub mod invoke;
pub mod reflection;
pub mod request;
pub mod resolver;
pub mod session;
pub mod source;
pub mod store;

pub use events::CallResult;
pub use invoke::{CallOutcome, InvokeError, ProtocolStatusError};
pub use session::Session;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
