//! # Reflection Client
//!
//! A client for `grpc.reflection.v1`.
//!
//! Symbols are resolved into the files that define them. Every received file is inspected for
//! imports, and each import the caller does not already hold is requested by filename on the
//! same stream, until the closure of the symbol is complete. Files the caller already knows
//! are neither requested nor returned, so a growing local pool only ever downloads new files.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use crate::BoxError;
use futures_util::stream::once;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Streaming, client::GrpcService};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse,
    server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ReflectionResolveError {
    #[error("Could not open a reflection stream, the server might not support reflection: '{0}'")]
    ServerStreamInitFailed(#[source] tonic::Status),

    #[error("The reflection stream failed: '{0}'")]
    ServerStreamFailure(#[source] tonic::Status),

    #[error("Reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("Failed to queue a reflection request")]
    SendFailed,

    #[error("Server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Unexpected reflection response: {0}")]
    UnexpectedResponseType(String),

    #[error("Failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),
}

impl ReflectionResolveError {
    /// Returns `true` when the server answered that the requested symbol does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            ReflectionResolveError::ServerStreamFailure(status) => {
                status.code() == tonic::Code::NotFound
            }
            ReflectionResolveError::ServerError { code, .. } => {
                *code == i32::from(tonic::Code::NotFound)
            }
            _ => false,
        }
    }
}

// Capacity of the outgoing request queue of one resolution.
const REQUEST_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct ReflectionClient<T = Channel> {
    client: ServerReflectionClient<T>,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(channel: S) -> Self {
        Self {
            client: ServerReflectionClient::new(channel),
        }
    }

    /// Fetches the file defining `symbol` along with the imports it needs.
    ///
    /// `known` holds the names of files the caller already has. They are skipped both when
    /// received and when found among imports, so the returned set only holds new files.
    pub async fn file_descriptor_set_by_symbol(
        &mut self,
        symbol: &str,
        known: &HashSet<String>,
    ) -> Result<FileDescriptorSet, ReflectionResolveError> {
        tracing::debug!(symbol, known = known.len(), "requesting file containing symbol");

        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);

        let mut responses = self
            .client
            .server_reflection_info(ReceiverStream::new(rx))
            .await
            .map_err(ReflectionResolveError::ServerStreamInitFailed)?
            .into_inner();

        let mut closure = FileClosure::new(known);
        closure.request(&tx, MessageRequest::FileContainingSymbol(symbol.to_string())).await?;

        while closure.awaiting > 0 {
            let files = match next_response(&mut responses).await? {
                MessageResponse::FileDescriptorResponse(res) => res.file_descriptor_proto,
                other => {
                    return Err(ReflectionResolveError::UnexpectedResponseType(format!(
                        "{other:?}"
                    )));
                }
            };
            closure.awaiting -= 1;

            for import in closure.absorb(files)? {
                closure.request(&tx, MessageRequest::FileByFilename(import)).await?;
            }
        }

        tracing::debug!(symbol, files = closure.received.len(), "collected new files");

        Ok(FileDescriptorSet {
            file: closure.received,
        })
    }

    /// Lists all services exposed by the server.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionResolveError> {
        let req = request(MessageRequest::ListServices(String::new()));

        let mut responses = self
            .client
            .server_reflection_info(once(async { req }))
            .await
            .map_err(ReflectionResolveError::ServerStreamInitFailed)?
            .into_inner();

        match next_response(&mut responses).await? {
            MessageResponse::ListServicesResponse(resp) => {
                Ok(resp.service.into_iter().map(|s| s.name).collect())
            }
            other => Err(ReflectionResolveError::UnexpectedResponseType(format!(
                "{other:?}"
            ))),
        }
    }
}

/// The files of one resolution: those already held by the caller, those received so far and
/// the number of requests still unanswered.
struct FileClosure<'a> {
    known: &'a HashSet<String>,
    requested: HashSet<String>,
    received: Vec<FileDescriptorProto>,
    awaiting: usize,
}

impl<'a> FileClosure<'a> {
    fn new(known: &'a HashSet<String>) -> Self {
        Self {
            known,
            requested: HashSet::new(),
            received: Vec::new(),
            awaiting: 0,
        }
    }

    async fn request(
        &mut self,
        tx: &mpsc::Sender<ServerReflectionRequest>,
        message: MessageRequest,
    ) -> Result<(), ReflectionResolveError> {
        tx.send(request(message))
            .await
            .map_err(|_| ReflectionResolveError::SendFailed)?;
        self.awaiting += 1;
        Ok(())
    }

    /// Decodes a batch of files, keeps the new ones and returns the imports left to fetch.
    fn absorb(&mut self, batch: Vec<Vec<u8>>) -> Result<Vec<String>, ReflectionResolveError> {
        let mut imports = Vec::new();

        for raw in batch {
            let file = FileDescriptorProto::decode(raw.as_ref())?;
            let Some(name) = file.name.clone() else {
                continue;
            };

            if self.known.contains(&name) || self.has_received(&name) {
                continue;
            }
            self.requested.insert(name);

            for dependency in &file.dependency {
                if !self.known.contains(dependency) && self.requested.insert(dependency.clone()) {
                    imports.push(dependency.clone());
                }
            }

            self.received.push(file);
        }

        Ok(imports)
    }

    fn has_received(&self, name: &str) -> bool {
        self.received.iter().any(|f| f.name() == name)
    }
}

fn request(message: MessageRequest) -> ServerReflectionRequest {
    ServerReflectionRequest {
        // Servers ignore the host field in practice.
        host: String::new(),
        message_request: Some(message),
    }
}

/// Reads the next response of the stream, turning error responses into errors.
async fn next_response(
    responses: &mut Streaming<ServerReflectionResponse>,
) -> Result<MessageResponse, ReflectionResolveError> {
    let response = responses
        .message()
        .await
        .map_err(ReflectionResolveError::ServerStreamFailure)?
        .ok_or(ReflectionResolveError::StreamClosed)?;

    match response.message_response {
        Some(MessageResponse::ErrorResponse(e)) => Err(ReflectionResolveError::ServerError {
            code: e.error_code,
            message: e.error_message,
        }),
        Some(message) => Ok(message),
        None => Err(ReflectionResolveError::UnexpectedResponseType(
            "empty response".into(),
        )),
    }
}
