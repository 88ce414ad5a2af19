//! # Echo Service
//!
//! **INTERNAL USE ONLY**: a small gRPC service covering the four call shapes, used with its
//! encoded descriptor set to exercise `grpcmd_core` sessions in integration tests.

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/echo.rs"));
}

pub use pb::echo_service_server::{EchoService, EchoServiceServer};

/// Encoded `FileDescriptorSet` of `proto/echo.proto`.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");

/// Path of the `.proto` source of the service.
pub const PROTO_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/proto/echo.proto");
