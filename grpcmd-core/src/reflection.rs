//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server Reflection Protocol.
//!
//! It lets a [`crate::Session`] ask a server for its own Protobuf schema at runtime, so that
//! methods can be listed, resolved and invoked without pre-compiled descriptors.
pub mod client;
