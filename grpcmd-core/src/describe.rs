//! # Method Description
//!
//! Renders a method and its request/response messages as proto-like text, together with a
//! JSON template of the request that a user can fill in.
use crate::{events::format_message, resolver::ResolveError, source::SourceError};
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, MethodDescriptor, Value,
};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Descriptor for {0} is not a MethodDescriptor.")]
    NotAMethod(String),
    #[error("Failed to render the request template: '{0}'")]
    Template(#[from] serde_json::Error),
}

/// Text description of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescription {
    method: String,
    input: String,
    output: String,
    input_name: String,
    template: String,
}

impl MethodDescription {
    pub fn new(method: &MethodDescriptor) -> Result<Self, DescribeError> {
        Ok(Self {
            method: render_method(method),
            input: render_message(&method.input()),
            output: render_message(&method.output()),
            input_name: method.input().name().to_string(),
            template: format_message(&make_template(&method.input()))?,
        })
    }

    /// The `rpc` definition of the method.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Short name of the request message, e.g. `EchoRequest`.
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// A JSON request with every field set to its default value.
    pub fn template(&self) -> &str {
        &self.template
    }
}

impl fmt::Display for MethodDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}\n", self.method)?;
        writeln!(f, "{}\n", self.input)?;
        writeln!(f, "{}\n", self.output)?;
        writeln!(f, "{} Template:", self.input_name)?;
        write!(f, "{}", self.template)
    }
}

pub fn render_method(method: &MethodDescriptor) -> String {
    let input_stream = if method.is_client_streaming() {
        "stream "
    } else {
        ""
    };
    let output_stream = if method.is_server_streaming() {
        "stream "
    } else {
        ""
    };

    format!(
        "rpc {}({}.{}) returns ({}.{});",
        method.name(),
        input_stream,
        method.input().full_name(),
        output_stream,
        method.output().full_name()
    )
}

pub fn render_message(message: &MessageDescriptor) -> String {
    let mut out = format!("message {} {{\n", message.name());

    for field in message.fields() {
        if field.is_map() {
            if let Kind::Message(entry) = field.kind() {
                out.push_str(&format!(
                    "  map<{}, {}> {} = {};\n",
                    type_name(&entry.map_entry_key_field()),
                    type_name(&entry.map_entry_value_field()),
                    field.name(),
                    field.number()
                ));
            }
            continue;
        }

        let label = if field.is_list() {
            "repeated "
        } else if field.supports_presence() && field.containing_oneof().is_none() {
            "optional "
        } else {
            ""
        };

        out.push_str(&format!(
            "  {}{} {} = {};\n",
            label,
            type_name(&field),
            field.name(),
            field.number()
        ));
    }

    out.push('}');
    out
}

fn type_name(field: &FieldDescriptor) -> String {
    match field.kind() {
        Kind::Double => "double".into(),
        Kind::Float => "float".into(),
        Kind::Int32 => "int32".into(),
        Kind::Int64 => "int64".into(),
        Kind::Uint32 => "uint32".into(),
        Kind::Uint64 => "uint64".into(),
        Kind::Sint32 => "sint32".into(),
        Kind::Sint64 => "sint64".into(),
        Kind::Fixed32 => "fixed32".into(),
        Kind::Fixed64 => "fixed64".into(),
        Kind::Sfixed32 => "sfixed32".into(),
        Kind::Sfixed64 => "sfixed64".into(),
        Kind::Bool => "bool".into(),
        Kind::String => "string".into(),
        Kind::Bytes => "bytes".into(),
        Kind::Message(m) => format!(".{}", m.full_name()),
        Kind::Enum(e) => format!(".{}", e.full_name()),
    }
}

/// Builds a request template for `message`.
///
/// Nested messages are filled recursively, except recursive references and the
/// `google.protobuf` types, which stay unset. Repeated fields carry one element. The first
/// field of every oneof is set.
pub fn make_template(message: &MessageDescriptor) -> DynamicMessage {
    fill_template(message, &mut Vec::new())
}

fn fill_template(descriptor: &MessageDescriptor, path: &mut Vec<String>) -> DynamicMessage {
    let mut message = DynamicMessage::new(descriptor.clone());
    path.push(descriptor.full_name().to_string());

    for field in descriptor.fields() {
        if field.is_map() || !is_first_of_oneof(&field) {
            continue;
        }

        let element = match field.kind() {
            Kind::Message(nested)
                if nested.package_name() == "google.protobuf"
                    || path.iter().any(|p| p == nested.full_name()) =>
            {
                continue;
            }
            Kind::Message(nested) => Value::Message(fill_template(&nested, path)),
            kind if field.is_list() || field.supports_presence() => Value::default_value(&kind),
            _ => continue,
        };

        let value = if field.is_list() {
            Value::List(vec![element])
        } else {
            element
        };

        message.set_field(&field, value);
    }

    path.pop();
    message
}

fn is_first_of_oneof(field: &FieldDescriptor) -> bool {
    match field.containing_oneof() {
        Some(oneof) if !oneof.is_synthetic() => oneof
            .fields()
            .next()
            .is_some_and(|first| first.number() == field.number()),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::DescriptorPool;

    #[test]
    fn test_render_message() {
        let duration = DescriptorPool::global()
            .get_message_by_name("google.protobuf.Duration")
            .unwrap();

        assert_eq!(
            render_message(&duration),
            "message Duration {\n  int64 seconds = 1;\n  int32 nanos = 2;\n}"
        );
    }

    #[test]
    fn test_render_repeated_and_message_fields() {
        let list = DescriptorPool::global()
            .get_message_by_name("google.protobuf.ListValue")
            .unwrap();

        assert_eq!(
            render_message(&list),
            "message ListValue {\n  repeated .google.protobuf.Value values = 1;\n}"
        );
    }

    #[test]
    fn test_template_leaves_well_known_types_unset() {
        let list = DescriptorPool::global()
            .get_message_by_name("google.protobuf.ListValue")
            .unwrap();

        let template = make_template(&list);

        assert!(!template.has_field_by_name("values"));
    }
}
