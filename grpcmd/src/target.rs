//! # Command Target
//!
//! Commands run either against a live server, through a [`Session`], or against local schema
//! files alone when no address is given. Only the former can issue calls.
use crate::{cli::SchemaArgs, formatter::FormattedString};
use grpcmd_core::{
    Session,
    catalog::MethodCatalog,
    describe::{DescribeError, MethodDescription},
    resolver::resolve,
    source::{DescriptorSource, SourceError},
};

pub enum Target {
    Online(Session),
    Offline {
        source: DescriptorSource,
        catalog: MethodCatalog,
    },
}

impl Target {
    pub async fn open(address: Option<&str>, schema: &SchemaArgs) -> Result<Self, FormattedString> {
        match address {
            Some(address) => Ok(Self::Online(connect(address, schema).await?)),
            None => match local_source(schema)? {
                Some(source) => Ok(Self::Offline {
                    source,
                    catalog: MethodCatalog::new(),
                }),
                None => Err(FormattedString(
                    "A server address is required unless --proto or --file-descriptor-set is given"
                        .to_string(),
                )),
            },
        }
    }

    pub async fn services(&mut self) -> Result<Vec<String>, SourceError> {
        match self {
            Self::Online(session) => session.services().await,
            Self::Offline { source, catalog } => catalog.services(source).await.map(<[String]>::to_vec),
        }
    }

    pub async fn listing(&mut self) -> Result<String, SourceError> {
        match self {
            Self::Online(session) => session.listing().await,
            Self::Offline { source, catalog } => catalog.listing(source).await.map(str::to_string),
        }
    }

    pub async fn nonambiguous_methods(&mut self) -> Result<Vec<String>, SourceError> {
        match self {
            Self::Online(session) => session.nonambiguous_methods().await,
            Self::Offline { source, catalog } => catalog.nonambiguous_methods(source).await,
        }
    }

    pub async fn describe(&mut self, hint: &str) -> Result<MethodDescription, DescribeError> {
        match self {
            Self::Online(session) => session.describe_method(hint).await,
            Self::Offline { source, catalog } => {
                let name = resolve(catalog.methods(source).await?, hint)?;
                MethodDescription::new(&source.find_method(&name).await?)
            }
        }
    }

    pub fn close(self) {
        if let Self::Online(session) = self {
            session.close();
        }
    }
}

/// Connects to `address`, switching to the local schema when one is given.
pub async fn connect(address: &str, schema: &SchemaArgs) -> Result<Session, FormattedString> {
    let session = Session::connect(address).await?;

    if !schema.protos.is_empty() {
        return Ok(session.with_proto_files(&schema.import_paths, &schema.protos)?);
    }

    match &schema.file_descriptor_set {
        Some(path) => Ok(session.with_file_descriptor(&std::fs::read(path)?)?),
        None => Ok(session),
    }
}

fn local_source(schema: &SchemaArgs) -> Result<Option<DescriptorSource>, FormattedString> {
    if !schema.protos.is_empty() {
        return Ok(Some(DescriptorSource::from_proto_files(
            &schema.import_paths,
            &schema.protos,
        )?));
    }

    match &schema.file_descriptor_set {
        Some(path) => Ok(Some(DescriptorSource::from_file_descriptor(&std::fs::read(path)?)?)),
        None => Ok(None),
    }
}
