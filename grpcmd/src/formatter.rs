use colored::*;
use grpcmd_core::{
    InvokeError, ProtocolStatusError,
    describe::{DescribeError, MethodDescription},
    request::RequestParseError,
    session::ConnectError,
    source::SourceError,
    store::ConfigStoreError,
};

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<String>);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

fn failure(heading: &str, err: impl std::fmt::Display) -> FormattedString {
    FormattedString(format!("{}\n\n'{}'", heading.red().bold(), err))
}

impl From<ProtocolStatusError> for FormattedString {
    fn from(err: ProtocolStatusError) -> Self {
        FormattedString(format!(
            "{}\n{}",
            "ERROR:".red().bold(),
            err.formatted()
        ))
    }
}

impl From<InvokeError> for FormattedString {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Status(status) => status.into(),
            InvokeError::Resolve(err) => FormattedString(err.to_string().yellow().to_string()),
            err => failure("Call Failed:", err),
        }
    }
}

impl From<ConnectError> for FormattedString {
    fn from(err: ConnectError) -> Self {
        failure("Connection Error:", err)
    }
}

impl From<SourceError> for FormattedString {
    fn from(err: SourceError) -> Self {
        failure("Schema Lookup Failed:", err)
    }
}

impl From<DescribeError> for FormattedString {
    fn from(err: DescribeError) -> Self {
        match err {
            DescribeError::Resolve(err) => FormattedString(err.to_string().yellow().to_string()),
            err => failure("Describe Failed:", err),
        }
    }
}

impl From<RequestParseError> for FormattedString {
    fn from(err: RequestParseError) -> Self {
        failure("Invalid Request:", err)
    }
}

impl From<ConfigStoreError> for FormattedString {
    fn from(err: ConfigStoreError) -> Self {
        failure("Config Error:", err)
    }
}

impl From<std::io::Error> for FormattedString {
    fn from(err: std::io::Error) -> Self {
        failure("Failed to read input:", err)
    }
}

impl From<serde_json::Error> for FormattedString {
    fn from(err: serde_json::Error) -> Self {
        failure("Failed to render output:", err)
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        for svc in services {
            out.push_str(&format!("{}\n", svc.green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<MethodDescription> for FormattedString {
    fn from(description: MethodDescription) -> Self {
        let method = match description.method().strip_prefix("rpc ") {
            Some(rest) => format!("{} {}", "rpc".cyan(), rest),
            None => description.method().to_string(),
        };

        FormattedString(format!(
            "{}\n\n{}\n\n{}\n\n{}\n{}",
            method,
            description.input(),
            description.output(),
            format!("{} Template:", description.input_name()).bold(),
            description.template()
        ))
    }
}
