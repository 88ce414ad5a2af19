//! # Descriptor Sources
//!
//! A descriptor source is the queryable catalog of services, methods and messages the engine
//! works against. It is either:
//!
//! * **live**, backed by the server's reflection service. Files are fetched on demand and
//!   accumulated into a local [`DescriptorPool`], so a symbol is never fetched twice.
//! * **static**, backed by a [`DescriptorPool`] built from local `.proto` files or from an
//!   encoded `FileDescriptorSet`.
//!
//! The [`ServiceLister`] trait is the seam the [`crate::catalog::MethodCatalog`] is written
//! against.
use crate::{
    BoxError,
    reflection::client::{ReflectionClient, ReflectionResolveError},
};
use http_body::Body as HttpBody;
use prost_reflect::{
    DescriptorError, DescriptorPool, EnumDescriptor, MessageDescriptor, MethodDescriptor,
    ServiceDescriptor,
};
use std::{
    collections::HashSet,
    future::Future,
    path::{Path, PathBuf},
};
use tonic::{client::GrpcService, transport::Channel};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Reflection resolution failed: '{0}'")]
    ReflectionResolve(#[from] ReflectionResolveError),
    #[error("Failed to build descriptor pool: '{0}'")]
    DescriptorError(#[from] DescriptorError),
    #[error("Failed to parse proto files: '{0}'")]
    ProtoParse(#[from] Box<protox::Error>),
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),
    #[error("Symbol '{0}' not found")]
    SymbolNotFound(String),
    #[error("Deadline exceeded while querying the descriptor source")]
    DeadlineExceeded,
}

/// Lists services and their methods.
pub trait ServiceLister {
    /// Lists the fully qualified names of all services (e.g. `echo.EchoService`).
    fn list_services(&mut self) -> impl Future<Output = Result<Vec<String>, SourceError>>;

    /// Lists the fully qualified names of the methods of `service` in declaration order
    /// (e.g. `echo.EchoService.UnaryEcho`).
    fn list_methods(
        &mut self,
        service: &str,
    ) -> impl Future<Output = Result<Vec<String>, SourceError>>;
}

/// A generic wrapper for the different kinds of Protobuf descriptors a symbol can name.
#[derive(Debug, Clone)]
pub enum Descriptor {
    Service(ServiceDescriptor),
    Method(MethodDescriptor),
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
}

impl Descriptor {
    /// Returns the full_name (e.g.,`my.package.v1.MyMessage`) of the inner descriptor
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::Service(v) => v.full_name(),
            Descriptor::Method(v) => v.full_name(),
            Descriptor::Message(v) => v.full_name(),
            Descriptor::Enum(v) => v.full_name(),
        }
    }

    /// Returns the inner [`MethodDescriptor`] if this variant is `Method`.
    pub fn method_descriptor(&self) -> Option<&MethodDescriptor> {
        match self {
            Descriptor::Method(d) => Some(d),
            _ => None,
        }
    }
}

/// The descriptor source of a [`crate::Session`].
#[derive(Debug, Clone)]
pub enum DescriptorSource<S = Channel> {
    /// Schema discovered through the server reflection service.
    Reflection {
        client: ReflectionClient<S>,
        pool: DescriptorPool,
    },
    /// Schema loaded from local files.
    Static(DescriptorPool),
}

impl<S> DescriptorSource<S> {
    pub fn from_reflection(client: ReflectionClient<S>) -> Self {
        Self::Reflection {
            client,
            pool: DescriptorPool::new(),
        }
    }

    /// Builds a static source from `.proto` files, see [`pool_from_proto_files`].
    pub fn from_proto_files(
        import_paths: &[PathBuf],
        files: &[PathBuf],
    ) -> Result<Self, SourceError> {
        pool_from_proto_files(import_paths, files).map(Self::Static)
    }

    /// Builds a static source from an encoded `FileDescriptorSet`.
    pub fn from_file_descriptor(bytes: &[u8]) -> Result<Self, SourceError> {
        pool_from_file_descriptor(bytes).map(Self::Static)
    }

    /// Returns `true` when this source talks to a reflection service.
    pub fn is_reflection(&self) -> bool {
        matches!(self, Self::Reflection { .. })
    }
}

impl<S> DescriptorSource<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Finds the descriptor of the method with the given fully qualified name
    /// (e.g. `echo.EchoService.UnaryEcho`).
    pub async fn find_method(&mut self, method: &str) -> Result<MethodDescriptor, SourceError> {
        match self.find_symbol(method).await? {
            Descriptor::Method(descriptor) => Ok(descriptor),
            _ => Err(SourceError::SymbolNotFound(method.to_string())),
        }
    }

    /// Resolves a fully qualified symbol (service, method, message or enum).
    ///
    /// A reflection-backed source fetches the file defining the symbol when the local pool
    /// does not know it yet. Method symbols are fetched through their parent service.
    pub async fn find_symbol(&mut self, symbol: &str) -> Result<Descriptor, SourceError> {
        match self {
            Self::Static(pool) => {
                lookup(pool, symbol).ok_or_else(|| SourceError::SymbolNotFound(symbol.into()))
            }
            Self::Reflection { client, pool } => {
                if let Some(descriptor) = lookup(pool, symbol) {
                    return Ok(descriptor);
                }

                let fetched = match load_symbol(client, pool, symbol).await {
                    Err(SourceError::ReflectionResolve(err)) if err.is_not_found() => {
                        let parent = symbol.rsplit_once('.').map(|(parent, _)| parent);
                        match parent {
                            Some(parent) => load_symbol(client, pool, parent).await,
                            None => Err(SourceError::ReflectionResolve(err)),
                        }
                    }
                    other => other,
                };

                match fetched {
                    Err(SourceError::ReflectionResolve(err)) if err.is_not_found() => {
                        Err(SourceError::SymbolNotFound(symbol.to_string()))
                    }
                    Err(err) => Err(err),
                    Ok(()) => lookup(pool, symbol)
                        .ok_or_else(|| SourceError::SymbolNotFound(symbol.to_string())),
                }
            }
        }
    }
}

impl<S> ServiceLister for DescriptorSource<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    async fn list_services(&mut self) -> Result<Vec<String>, SourceError> {
        match self {
            Self::Static(pool) => pool.list_services().await,
            Self::Reflection { client, .. } => Ok(client.list_services().await?),
        }
    }

    async fn list_methods(&mut self, service: &str) -> Result<Vec<String>, SourceError> {
        match self.find_symbol(service).await {
            Ok(Descriptor::Service(descriptor)) => Ok(method_names(&descriptor)),
            Ok(_) | Err(SourceError::SymbolNotFound(_)) => {
                Err(SourceError::ServiceNotFound(service.to_string()))
            }
            Err(err) => Err(err),
        }
    }
}

impl ServiceLister for DescriptorPool {
    async fn list_services(&mut self) -> Result<Vec<String>, SourceError> {
        Ok(self.services().map(|s| s.full_name().to_string()).collect())
    }

    async fn list_methods(&mut self, service: &str) -> Result<Vec<String>, SourceError> {
        self.get_service_by_name(service)
            .map(|descriptor| method_names(&descriptor))
            .ok_or_else(|| SourceError::ServiceNotFound(service.to_string()))
    }
}

/// Builds a descriptor pool by parsing `.proto` files.
///
/// The directory of every file is appended to `import_paths`, so a file can always be found
/// and its sibling imports resolved even when no import path is given.
pub fn pool_from_proto_files(
    import_paths: &[PathBuf],
    files: &[PathBuf],
) -> Result<DescriptorPool, SourceError> {
    let includes = extended_import_paths(import_paths, files);
    tracing::debug!(?includes, ?files, "parsing proto files");

    let fd_set = protox::compile(files, &includes).map_err(Box::new)?;
    Ok(DescriptorPool::from_file_descriptor_set(fd_set)?)
}

/// Builds a descriptor pool from an encoded `FileDescriptorSet`.
pub fn pool_from_file_descriptor(bytes: &[u8]) -> Result<DescriptorPool, SourceError> {
    Ok(DescriptorPool::decode(bytes)?)
}

fn extended_import_paths(import_paths: &[PathBuf], files: &[PathBuf]) -> Vec<PathBuf> {
    let parents = files.iter().map(|file| match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    });

    import_paths.iter().cloned().chain(parents).collect()
}

fn method_names(service: &ServiceDescriptor) -> Vec<String> {
    service
        .methods()
        .map(|m| m.full_name().to_string())
        .collect()
}

fn lookup(pool: &DescriptorPool, symbol: &str) -> Option<Descriptor> {
    if let Some(descriptor) = pool.get_service_by_name(symbol) {
        return Some(Descriptor::Service(descriptor));
    }

    if let Some(descriptor) = pool.get_message_by_name(symbol) {
        return Some(Descriptor::Message(descriptor));
    }

    if let Some(descriptor) = pool.get_enum_by_name(symbol) {
        return Some(Descriptor::Enum(descriptor));
    }

    let (service, method) = symbol.rsplit_once('.')?;
    pool.get_service_by_name(service)?
        .methods()
        .find(|m| m.name() == method)
        .map(Descriptor::Method)
}

async fn load_symbol<S>(
    client: &mut ReflectionClient<S>,
    pool: &mut DescriptorPool,
    symbol: &str,
) -> Result<(), SourceError>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    let known: HashSet<String> = pool.files().map(|file| file.name().to_string()).collect();
    let fd_set = client.file_descriptor_set_by_symbol(symbol, &known).await?;

    tracing::debug!(symbol, new_files = fd_set.file.len(), "merging reflected files");

    pool.add_file_descriptor_protos(fd_set.file)?;
    Ok(())
}
