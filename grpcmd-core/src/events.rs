//! # Call Events
//!
//! One invocation is an ordered stream of [`CallEvent`]s:
//!
//! ```text
//! MethodResolved -> Headers -> Response* -> Trailers
//! ```
//!
//! An [`EventHandler`] folds that stream. [`ResultCollector`] folds it into a [`CallResult`];
//! [`PrintingHandler`] writes each response as soon as it arrives.
use prost_reflect::{DynamicMessage, MethodDescriptor, SerializeOptions};
use serde::Serialize;
use std::{collections::BTreeMap, io::Write};
use tonic::{
    Status,
    metadata::{KeyAndValueRef, MetadataMap},
};

/// Trailer key carrying the numeric final status of the call.
pub const STATUS_CODE_KEY: &str = "status-code";

// Already represented by the status itself.
const RESERVED_TRAILERS: [&str; 3] = ["grpc-status", "grpc-message", "grpc-status-details-bin"];

/// An event observed while a call is in flight.
#[derive(Debug, Clone, Copy)]
pub enum CallEvent<'a> {
    /// The target method was resolved to this descriptor.
    MethodResolved(&'a MethodDescriptor),
    /// The server sent its response headers.
    Headers(&'a MetadataMap),
    /// The server sent a response message.
    Response(&'a DynamicMessage),
    /// The call ended with this status; its metadata holds the trailers.
    Trailers(&'a Status),
}

/// One step of the fold over the events of a call.
pub trait EventHandler {
    fn on_event(&mut self, event: CallEvent<'_>);
}

/// The outcome of one call: headers, formatted responses in arrival order and trailers.
///
/// Every metadata key maps to its values joined with `", "`. The trailers always contain
/// [`STATUS_CODE_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallResult {
    headers: BTreeMap<String, String>,
    messages: Vec<String>,
    trailers: BTreeMap<String, String>,
}

impl CallResult {
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn trailers(&self) -> &BTreeMap<String, String> {
        &self.trailers
    }

    /// The numeric status code recorded in the trailers, if the call got that far.
    pub fn status_code(&self) -> Option<i32> {
        self.trailers.get(STATUS_CODE_KEY)?.parse().ok()
    }
}

/// Folds call events into a [`CallResult`].
#[derive(Debug, Default)]
pub struct ResultCollector {
    result: CallResult,
    responses: usize,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the result folded so far.
    pub fn finish(self) -> CallResult {
        self.result
    }
}

impl EventHandler for ResultCollector {
    fn on_event(&mut self, event: CallEvent<'_>) {
        match event {
            CallEvent::MethodResolved(_) => {}
            CallEvent::Headers(metadata) => {
                self.result.headers.extend(joined_metadata(metadata));
            }
            CallEvent::Response(message) => {
                self.responses += 1;
                match format_message(message) {
                    Ok(text) => self.result.messages.push(text),
                    Err(err) => tracing::warn!(
                        "Error while formatting response message #{}: {err}",
                        self.responses
                    ),
                }
            }
            CallEvent::Trailers(status) => {
                self.result.trailers.insert(
                    STATUS_CODE_KEY.to_string(),
                    i32::from(status.code()).to_string(),
                );
                self.result
                    .trailers
                    .extend(joined_metadata(status.metadata()));
            }
        }
    }
}

/// Writes every formatted response to `W` as it arrives.
pub struct PrintingHandler<W> {
    out: W,
    responses: usize,
}

impl<W: Write> PrintingHandler<W> {
    pub fn new(out: W) -> Self {
        Self { out, responses: 0 }
    }
}

impl<W: Write> EventHandler for PrintingHandler<W> {
    fn on_event(&mut self, event: CallEvent<'_>) {
        let CallEvent::Response(message) = event else {
            return;
        };

        self.responses += 1;
        let written = match format_message(message) {
            Ok(text) => writeln!(self.out, "{text}"),
            Err(err) => writeln!(
                self.out,
                "Error while formatting response message #{}:\n\t{err}",
                self.responses
            ),
        };

        if let Err(err) = written {
            tracing::warn!("Failed to write response message #{}: {err}", self.responses);
        }
    }
}

/// Renders a message as pretty JSON, emitting fields that hold their default value.
pub fn format_message(message: &DynamicMessage) -> Result<String, serde_json::Error> {
    let options = SerializeOptions::new().skip_default_fields(false);

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    message.serialize_with_options(&mut serializer, &options)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn joined_metadata(metadata: &MetadataMap) -> BTreeMap<String, String> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in metadata.iter() {
        let (key, value) = match entry {
            KeyAndValueRef::Ascii(key, value) => (key.as_str(), value.as_encoded_bytes()),
            KeyAndValueRef::Binary(key, value) => (key.as_str(), value.as_encoded_bytes()),
        };

        if RESERVED_TRAILERS.contains(&key) {
            continue;
        }

        grouped
            .entry(key.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value).into_owned());
    }

    grouped
        .into_iter()
        .map(|(key, values)| (key, values.join(", ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::DescriptorPool;
    use tonic::{Code, metadata::MetadataValue};

    fn empty_message() -> DynamicMessage {
        let descriptor = DescriptorPool::global()
            .get_message_by_name("google.protobuf.Empty")
            .unwrap();
        DynamicMessage::new(descriptor)
    }

    #[test]
    fn test_collects_headers_messages_and_status() {
        let mut headers = MetadataMap::new();
        headers.insert("trace", MetadataValue::from_static("1"));

        let message = empty_message();
        let status = Status::new(Code::Ok, "");

        let mut collector = ResultCollector::new();
        collector.on_event(CallEvent::Headers(&headers));
        collector.on_event(CallEvent::Response(&message));
        collector.on_event(CallEvent::Response(&message));
        collector.on_event(CallEvent::Trailers(&status));
        let result = collector.finish();

        assert_eq!(result.headers().get("trace").unwrap(), "1");
        assert_eq!(result.messages(), ["{}", "{}"]);
        assert_eq!(result.trailers().get(STATUS_CODE_KEY).unwrap(), "0");
        assert_eq!(result.status_code(), Some(0));
    }

    #[test]
    fn test_joins_repeated_metadata_values() {
        let mut headers = MetadataMap::new();
        headers.append("x-tag", MetadataValue::from_static("a"));
        headers.append("x-tag", MetadataValue::from_static("b"));

        let mut collector = ResultCollector::new();
        collector.on_event(CallEvent::Headers(&headers));

        assert_eq!(collector.finish().headers().get("x-tag").unwrap(), "a, b");
    }

    #[test]
    fn test_records_failed_status_and_trailers() {
        let mut trailers = MetadataMap::new();
        trailers.insert("x-reason", MetadataValue::from_static("quota"));
        trailers.insert("grpc-message", MetadataValue::from_static("denied"));
        let status = Status::with_metadata(Code::PermissionDenied, "denied", trailers);

        let mut collector = ResultCollector::new();
        collector.on_event(CallEvent::Trailers(&status));
        let result = collector.finish();

        assert_eq!(result.status_code(), Some(7));
        assert_eq!(result.trailers().get("x-reason").unwrap(), "quota");
        assert!(!result.trailers().contains_key("grpc-message"));
        assert!(result.messages().is_empty());
    }

    #[test]
    fn test_printing_handler_writes_each_response() {
        let message = empty_message();
        let mut out = Vec::new();

        let mut handler = PrintingHandler::new(&mut out);
        handler.on_event(CallEvent::Response(&message));
        handler.on_event(CallEvent::Response(&message));

        assert_eq!(String::from_utf8(out).unwrap(), "{}\n{}\n");
    }
}
