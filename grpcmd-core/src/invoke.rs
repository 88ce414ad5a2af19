//! # Invocation
//!
//! Drives a single RPC end-to-end as an ordered fold over its [`CallEvent`]s:
//!
//! 1. The JSON body is parsed into request messages before anything touches the network.
//!    Unknown fields are rejected.
//! 2. The call is issued through [`GrpcClient::streaming`], whatever the method's shape.
//! 3. Headers, every response and finally the status with its trailers are handed to an
//!    [`EventHandler`] in arrival order.
//!
//! A non-OK final status is never a local failure: it is reported as a
//! [`ProtocolStatusError`] and the caller decides what to do with it (the CLI maps it to
//! the exit code `64 + code`).
use crate::{
    BoxError,
    events::{CallEvent, CallResult, EventHandler},
    grpc::client::{GrpcClient, GrpcRequestError},
    request::split_header,
    resolver::ResolveError,
    source::SourceError,
};
use http_body::Body as HttpBody;
use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor, MethodDescriptor};
use std::{error::Error as _, time::Duration};
use tonic::{Code, Status, Streaming, client::GrpcService};

/// Offset added to a non-OK status code to form the process exit code.
pub const STATUS_EXIT_OFFSET: i32 = 64;

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Method '{0}' not found")]
    MethodNotFound(String),
    #[error("Invalid input: '{0}'")]
    InvalidInput(String),
    #[error("gRPC client request error: '{0}'")]
    Request(#[from] GrpcRequestError),
    #[error("Transport failure: '{0}'")]
    Transport(#[source] Status),
    #[error("Deadline exceeded before the call completed")]
    DeadlineExceeded,
    #[error(transparent)]
    Status(#[from] ProtocolStatusError),
}

/// The server ended the call with a non-OK status.
#[derive(Debug, thiserror::Error)]
#[error("ERROR:\n{formatted}")]
pub struct ProtocolStatusError {
    status: Status,
    formatted: String,
    result: Option<CallResult>,
}

impl ProtocolStatusError {
    pub fn new(status: Status) -> Self {
        let formatted = format_status(&status);
        Self {
            status,
            formatted,
            result: None,
        }
    }

    /// Attaches the result collected up to the failure.
    pub fn with_result(mut self, result: CallResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn code(&self) -> Code {
        self.status.code()
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// The status rendered as JSON, for display.
    pub fn formatted(&self) -> &str {
        &self.formatted
    }

    /// The partial result of a structured call: messages received before the failure and
    /// trailers holding the `status-code`.
    pub fn result(&self) -> Option<&CallResult> {
        self.result.as_ref()
    }

    /// The process exit code conventionally associated with this status.
    pub fn exit_code(&self) -> i32 {
        STATUS_EXIT_OFFSET + i32::from(self.code())
    }
}

/// The outcome of a successful non-structured call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOutcome {
    responses: usize,
}

impl CallOutcome {
    pub(crate) fn new(responses: usize) -> Self {
        Self { responses }
    }

    /// The number of response messages received.
    pub fn response_count(&self) -> usize {
        self.responses
    }
}

/// Renders a status the way a `google.rpc.Status` message is rendered to JSON.
pub fn format_status(status: &Status) -> String {
    let value = serde_json::json!({
        "code": i32::from(status.code()),
        "message": status.message(),
        "details": [],
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

/// Parses `body`, zero or more concatenated JSON objects, into messages of type `input`.
pub fn parse_messages(
    input: &MessageDescriptor,
    body: &str,
) -> Result<Vec<DynamicMessage>, InvokeError> {
    let options = DeserializeOptions::new().deny_unknown_fields(true);

    serde_json::Deserializer::from_str(body)
        .into_iter::<serde_json::Value>()
        .enumerate()
        .map(|(index, value)| {
            let value = value.map_err(|e| {
                InvokeError::InvalidInput(format!("request message #{}: {e}", index + 1))
            })?;
            DynamicMessage::deserialize_with_options(input.clone(), value, &options).map_err(
                |e| {
                    InvokeError::InvalidInput(format!(
                        "request message #{} does not match {}: {e}",
                        index + 1,
                        input.full_name()
                    ))
                },
            )
        })
        .collect()
}

/// Builds the request messages of a call to `method`.
///
/// Methods that take a single request send an empty message when the body holds none.
pub fn request_messages(
    method: &MethodDescriptor,
    body: &str,
) -> Result<Vec<DynamicMessage>, InvokeError> {
    let mut messages = parse_messages(&method.input(), body)?;

    if !method.is_client_streaming() {
        match messages.len() {
            0 => messages.push(DynamicMessage::new(method.input())),
            1 => {}
            n => {
                let kind = if method.is_server_streaming() {
                    "server-streaming"
                } else {
                    "unary"
                };
                return Err(InvokeError::InvalidInput(format!(
                    "method '{}' is a {kind} RPC, but request data contained {n} messages",
                    method.full_name()
                )));
            }
        }
    }

    Ok(messages)
}

/// Splits `"Key: Value"` header strings into metadata pairs.
pub fn header_pairs(headers: &[String]) -> Result<Vec<(String, String)>, InvokeError> {
    headers
        .iter()
        .map(|header| {
            split_header(header)
                .ok_or_else(|| InvokeError::InvalidInput(format!("malformed header '{header}'")))
        })
        .collect()
}

/// Runs one call and folds its events into `handler`.
///
/// Returns the number of responses received when the call ends with an OK status.
pub(crate) async fn invoke<S>(
    client: &mut GrpcClient<S>,
    method: &MethodDescriptor,
    messages: Vec<DynamicMessage>,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    handler: &mut impl EventHandler,
) -> Result<usize, InvokeError>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    handler.on_event(CallEvent::MethodResolved(method));

    tracing::debug!(
        method = method.full_name(),
        requests = messages.len(),
        "invoking method"
    );

    let mut responses = 0;
    let status = match client.streaming(method, messages, headers, timeout).await? {
        Ok(response) => {
            let (metadata, mut stream, _) = response.into_parts();
            handler.on_event(CallEvent::Headers(&metadata));
            drain(&mut stream, handler, &mut responses).await
        }
        Err(status) => status,
    };

    if status.source().is_some() {
        return Err(InvokeError::Transport(status));
    }

    handler.on_event(CallEvent::Trailers(&status));

    tracing::debug!(
        method = method.full_name(),
        responses,
        code = ?status.code(),
        "call completed"
    );

    if status.code() == Code::Ok {
        Ok(responses)
    } else {
        Err(ProtocolStatusError::new(status).into())
    }
}

async fn drain(
    stream: &mut Streaming<DynamicMessage>,
    handler: &mut impl EventHandler,
    responses: &mut usize,
) -> Status {
    loop {
        match stream.message().await {
            Ok(Some(message)) => {
                *responses += 1;
                handler.on_event(CallEvent::Response(&message));
            }
            Ok(None) => break,
            Err(status) => return status,
        }
    }

    match stream.trailers().await {
        Ok(trailers) => Status::with_metadata(Code::Ok, "", trailers.unwrap_or_default()),
        Err(status) => status,
    }
}
