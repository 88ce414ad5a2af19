//! # Connection Session
//!
//! A [`Session`] owns everything one command needs to talk to a server: the descriptor
//! source (and with it the reflection client), the dynamic gRPC client bound to the
//! connection, the memoized [`MethodCatalog`] and a deadline fixed when the session is
//! created. Every operation of the session runs against that deadline.
//!
//! ## Example
//!
//! ```rust,no_run
//! use grpcmd_core::Session;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::connect("localhost:50051").await?;
//!
//! println!("{}", session.listing().await?);
//!
//! let result = session
//!     .call_with_result("UnaryEcho", r#"{"message": "hello"}"#, &[])
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```
use crate::{
    BoxError,
    catalog::MethodCatalog,
    describe::{DescribeError, MethodDescription},
    events::{CallEvent, CallResult, EventHandler, PrintingHandler, ResultCollector},
    grpc::client::GrpcClient,
    invoke::{self, CallOutcome, InvokeError, ProtocolStatusError},
    reflection::client::ReflectionClient,
    resolver::resolve,
    source::{Descriptor, DescriptorSource, SourceError},
};
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::{io::Write, path::PathBuf, time::Duration};
use tokio::time::{Instant, timeout_at};
use tonic::{
    Status,
    client::GrpcService,
    transport::{Channel, Endpoint},
};

/// Time budget of a session, from its creation to its last call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when connecting to a gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
    #[error("Timed out connecting to '{0}'")]
    Timeout(String),
}

/// One connection to a gRPC server and the schema used to talk to it.
#[derive(Debug)]
pub struct Session<S = Channel> {
    // Fields drop in declaration order: reflection client, then connection.
    source: DescriptorSource<S>,
    grpc_client: GrpcClient<S>,
    catalog: MethodCatalog,
    deadline: Instant,
    address: String,
}

impl Session<Channel> {
    /// Connects to `address` and discovers its schema through server reflection.
    ///
    /// A bare `host:port` is dialed over plaintext HTTP/2; an address carrying a scheme
    /// (e.g. `https://api.example.com`) is used as is.
    pub async fn connect(address: &str) -> Result<Self, ConnectError> {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        let channel = dial(address, deadline).await?;

        tracing::debug!(address, "connected");

        let mut session = Self::with_deadline(channel, deadline);
        session.address = address.to_string();
        Ok(session)
    }
}

/// Dials `address`, giving up at `deadline`.
async fn dial(address: &str, deadline: Instant) -> Result<Channel, ConnectError> {
    let endpoint = Endpoint::new(normalize_address(address))
        .map_err(|e| ConnectError::InvalidUrl(address.to_string(), e))?;

    timeout_at(deadline, endpoint.connect())
        .await
        .map_err(|_| ConnectError::Timeout(address.to_string()))?
        .map_err(|e| ConnectError::ConnectionFailed(address.to_string(), e))
}

impl<S> Session<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Creates a reflection-backed session over an existing service or channel.
    pub fn from_service(service: S) -> Self {
        Self::with_deadline(service, Instant::now() + DEFAULT_TIMEOUT)
    }

    fn with_deadline(service: S, deadline: Instant) -> Self {
        let reflection_client = ReflectionClient::new(service.clone());
        Self {
            source: DescriptorSource::from_reflection(reflection_client),
            grpc_client: GrpcClient::new(service),
            catalog: MethodCatalog::new(),
            deadline,
            address: String::new(),
        }
    }

    /// Switches the schema to the one described by local `.proto` files. The reflection
    /// client is released.
    pub fn with_proto_files(
        mut self,
        import_paths: &[PathBuf],
        files: &[PathBuf],
    ) -> Result<Self, SourceError> {
        self.replace_source(DescriptorSource::from_proto_files(import_paths, files)?);
        Ok(self)
    }

    /// Switches the schema to an encoded `FileDescriptorSet`. The reflection client is
    /// released.
    pub fn with_file_descriptor(mut self, bytes: &[u8]) -> Result<Self, SourceError> {
        self.replace_source(DescriptorSource::from_file_descriptor(bytes)?);
        Ok(self)
    }

    /// The address this session was connected to, empty for in-process services.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Time left before the session deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub async fn services(&mut self) -> Result<Vec<String>, SourceError> {
        timeout_at(self.deadline, self.catalog.services(&mut self.source))
            .await
            .map_err(|_| SourceError::DeadlineExceeded)?
            .map(<[String]>::to_vec)
    }

    pub async fn methods(&mut self) -> Result<Vec<String>, SourceError> {
        self.cached_methods().await.map(<[String]>::to_vec)
    }

    /// Every service followed by its tab-indented methods.
    pub async fn listing(&mut self) -> Result<String, SourceError> {
        timeout_at(self.deadline, self.catalog.listing(&mut self.source))
            .await
            .map_err(|_| SourceError::DeadlineExceeded)?
            .map(str::to_string)
    }

    /// The shortest unambiguous label of every method, in listing order.
    pub async fn nonambiguous_methods(&mut self) -> Result<Vec<String>, SourceError> {
        timeout_at(self.deadline, self.catalog.nonambiguous_methods(&mut self.source))
            .await
            .map_err(|_| SourceError::DeadlineExceeded)?
    }

    /// Maps a user-typed `hint` to exactly one fully qualified method.
    pub async fn resolve_method(&mut self, hint: &str) -> Result<String, InvokeError> {
        let methods = self.cached_methods().await.map_err(|err| match err {
            SourceError::DeadlineExceeded => InvokeError::DeadlineExceeded,
            err => InvokeError::Source(err),
        })?;
        Ok(resolve(methods, hint)?)
    }

    /// Looks up any fully qualified symbol of the schema.
    pub async fn find_symbol(&mut self, symbol: &str) -> Result<Descriptor, SourceError> {
        timeout_at(self.deadline, self.source.find_symbol(symbol))
            .await
            .map_err(|_| SourceError::DeadlineExceeded)?
    }

    /// Describes the method matching `hint`, along with a request template.
    pub async fn describe_method(&mut self, hint: &str) -> Result<MethodDescription, DescribeError> {
        let name = resolve(self.cached_methods().await?, hint)?;

        match self.find_symbol(&name).await? {
            Descriptor::Method(method) => MethodDescription::new(&method),
            _ => Err(DescribeError::NotAMethod(name)),
        }
    }

    /// Calls the method matching `hint` and writes every response to `out` as it arrives.
    ///
    /// `body` holds zero or more concatenated JSON request messages, `headers` are
    /// `"Key: Value"` strings sent as request metadata.
    pub async fn call(
        &mut self,
        hint: &str,
        body: &str,
        headers: &[String],
        out: impl Write,
    ) -> Result<CallOutcome, InvokeError> {
        let mut handler = PrintingHandler::new(out);
        let responses = self.run(hint, body, headers, &mut handler).await?;
        Ok(CallOutcome::new(responses))
    }

    /// Calls the method matching `hint` and collects headers, responses and trailers.
    ///
    /// When the server ends the call with a non-OK status, the returned
    /// [`crate::ProtocolStatusError`] carries the result collected up to that point.
    pub async fn call_with_result(
        &mut self,
        hint: &str,
        body: &str,
        headers: &[String],
    ) -> Result<CallResult, InvokeError> {
        let mut collector = ResultCollector::new();

        match self.run(hint, body, headers, &mut collector).await {
            Ok(_) => Ok(collector.finish()),
            Err(InvokeError::Status(err)) => Err(err.with_result(collector.finish()).into()),
            Err(err) => Err(err),
        }
    }

    /// Releases the session: the descriptor source first, then the connection.
    pub fn close(self) {
        let Self {
            source,
            grpc_client,
            address,
            ..
        } = self;

        drop(source);
        tracing::debug!(address = %address, "released descriptor source");
        drop(grpc_client);
        tracing::debug!(address = %address, "released connection");
    }

    async fn run(
        &mut self,
        hint: &str,
        body: &str,
        headers: &[String],
        handler: &mut impl EventHandler,
    ) -> Result<usize, InvokeError> {
        let method = self.find_method(hint).await?;
        let messages = invoke::request_messages(&method, body)?;
        let headers = invoke::header_pairs(headers)?;
        let remaining = self.remaining();

        let outcome = timeout_at(
            self.deadline,
            invoke::invoke(
                &mut self.grpc_client,
                &method,
                messages,
                headers,
                Some(remaining),
                &mut *handler,
            ),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(method = method.full_name(), "session deadline exceeded");
                let status = Status::deadline_exceeded("session deadline exceeded");
                handler.on_event(CallEvent::Trailers(&status));
                Err(ProtocolStatusError::new(status).into())
            }
        }
    }

    async fn find_method(&mut self, hint: &str) -> Result<MethodDescriptor, InvokeError> {
        let name = self.resolve_method(hint).await?;
        tracing::debug!(hint, method = %name, "resolved method");

        match timeout_at(self.deadline, self.source.find_method(&name)).await {
            Err(_) => Err(InvokeError::DeadlineExceeded),
            Ok(Err(SourceError::SymbolNotFound(_))) => Err(InvokeError::MethodNotFound(name)),
            Ok(result) => Ok(result?),
        }
    }

    async fn cached_methods(&mut self) -> Result<&[String], SourceError> {
        timeout_at(self.deadline, self.catalog.methods(&mut self.source))
            .await
            .map_err(|_| SourceError::DeadlineExceeded)?
    }

    fn replace_source(&mut self, source: DescriptorSource<S>) {
        let reflected = self.source.is_reflection();
        self.source = source;
        if reflected {
            tracing::debug!("released reflection client");
        }
        self.catalog = MethodCatalog::new();
    }
}

fn normalize_address(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}
