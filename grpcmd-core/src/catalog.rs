//! # Method Catalog
//!
//! Lazily discovers every service and method of a descriptor source and memoizes them.
//! Once filled, the catalog never queries its source again.
use crate::source::{ServiceLister, SourceError};
use std::collections::HashMap;

/// Memoized services, methods and the human-readable listing of a descriptor source.
#[derive(Debug, Clone, Default)]
pub struct MethodCatalog {
    services: Option<Vec<String>>,
    methods: Option<Vec<String>>,
    listing: String,
}

impl MethodCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all service names exposed by `source`, in listing order.
    pub async fn services(
        &mut self,
        source: &mut impl ServiceLister,
    ) -> Result<&[String], SourceError> {
        if self.services.is_none() {
            let services = source.list_services().await?;
            tracing::debug!(count = services.len(), "cached services");
            self.services = Some(services);
        }

        Ok(self.services.as_deref().unwrap_or_default())
    }

    /// Returns the fully qualified names of all methods, grouped per service in listing order.
    pub async fn methods(
        &mut self,
        source: &mut impl ServiceLister,
    ) -> Result<&[String], SourceError> {
        if self.methods.is_none() {
            let services = self.services(source).await?.to_vec();

            let mut methods = Vec::new();
            let mut listing = String::new();

            for service in &services {
                let service_methods = source.list_methods(service).await?;

                listing.push_str(service);
                listing.push('\n');
                for method in &service_methods {
                    let short = method
                        .strip_prefix(service.as_str())
                        .and_then(|rest| rest.strip_prefix('.'))
                        .unwrap_or_else(|| bare_name(method));
                    listing.push('\t');
                    listing.push_str(short);
                    listing.push('\n');
                }
                listing.push('\n');

                methods.extend(service_methods);
            }

            tracing::debug!(count = methods.len(), "cached methods");
            self.listing = listing;
            self.methods = Some(methods);
        }

        Ok(self.methods.as_deref().unwrap_or_default())
    }

    /// Returns one line per service followed by its tab-indented methods.
    pub async fn listing(&mut self, source: &mut impl ServiceLister) -> Result<&str, SourceError> {
        self.methods(source).await?;
        Ok(self.listing.trim_end_matches('\n'))
    }

    /// Returns the shortest unambiguous label of every method, see [`nonambiguous`].
    pub async fn nonambiguous_methods(
        &mut self,
        source: &mut impl ServiceLister,
    ) -> Result<Vec<String>, SourceError> {
        Ok(nonambiguous(self.methods(source).await?))
    }
}

/// Returns the part of a fully qualified name after its last `.`.
pub fn bare_name(fully_qualified: &str) -> &str {
    fully_qualified
        .rsplit_once('.')
        .map_or(fully_qualified, |(_, name)| name)
}

/// Labels each method by its bare name, unless another method shares that bare name, in
/// which case every method carrying it keeps its fully qualified name.
pub fn nonambiguous(methods: &[String]) -> Vec<String> {
    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for method in methods {
        *occurrences.entry(bare_name(method)).or_default() += 1;
    }

    methods
        .iter()
        .map(|method| {
            let name = bare_name(method);
            if occurrences[name] > 1 {
                method.clone()
            } else {
                name.to_string()
            }
        })
        .collect()
}
