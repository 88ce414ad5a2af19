//! # Generic gRPC Client
//!
//! This module wraps a standard `tonic` client to provide a generic interface for
//! gRPC communication. It is agnostic to the specific Protobuf messages being exchanged.
//!
//! ## How it works
//!
//! The [`GrpcClient`] utilizes the [`super::codec::DynamicCodec`] to handle serialization.
//! Every call, whatever its streaming shape, goes through the bidirectional `streaming`
//! path of `tonic`: a unary call is a stream carrying a single request message. This gives
//! the caller uniform access to response headers, every response message and the trailers.
//!
//! ## Features
//!
//! * **Dynamic Pathing**: Constructs the HTTP/2 path (e.g., `/package.Service/Method`) at runtime.
//! * **Metadata Handling**: Converts `(key, value)` pairs into Tonic's `MetadataMap`,
//!   appending repeated keys instead of replacing them.
//! * **Deadline**: Propagates the remaining time budget as the `grpc-timeout` header.
use super::codec::DynamicCodec;
use crate::BoxError;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::{str::FromStr, time::Duration};
use tonic::{
    Response, Streaming,
    client::GrpcService,
    metadata::{
        AsciiMetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
    #[error("Invalid gRPC path '{0}': '{1}'")]
    InvalidPath(String, #[source] http::uri::InvalidUri),
}

/// A generic gRPC client moving [`DynamicMessage`]s.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Opens a call to `method`, sends every message of `payload` and returns the response
    /// stream once the server has answered with its headers.
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(Response))` - The call started; headers are in the response metadata.
    /// * `Ok(Err(Status))` - RPC executed, but the server ended it with a status before any
    ///   header was received (e.g. a trailers-only response).
    /// * `Err(GrpcRequestError)` - Failed to build the request or the client was not ready.
    pub async fn streaming(
        &mut self,
        method: &MethodDescriptor,
        payload: Vec<DynamicMessage>,
        headers: Vec<(String, String)>,
        timeout: Option<Duration>,
    ) -> Result<Result<Response<Streaming<DynamicMessage>>, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(method.output());
        let path = http_path(method)?;
        let mut request = build_request(tokio_stream::iter(payload), headers)?;

        if let Some(timeout) = timeout {
            request.set_timeout(timeout);
        }

        Ok(self.client.streaming(request, path, codec).await)
    }
}

fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, GrpcRequestError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).map_err(|e| GrpcRequestError::InvalidPath(path, e))
}

fn build_request<T>(
    payload: T,
    headers: Vec<(String, String)>,
) -> Result<tonic::Request<T>, GrpcRequestError> {
    let mut request = tonic::Request::new(payload);
    for (k, v) in headers {
        let key = AsciiMetadataKey::from_str(&k.to_ascii_lowercase()).map_err(|source| {
            GrpcRequestError::InvalidMetadataKey {
                key: k.clone(),
                source,
            }
        })?;
        let val = MetadataValue::from_str(&v)
            .map_err(|source| GrpcRequestError::InvalidMetadataValue { key: k, source })?;
        request.metadata_mut().append(key, val);
    }
    Ok(request)
}
