use grpcmd_core::{
    catalog::MethodCatalog,
    source::{ServiceLister, SourceError},
};

/// A fixed two-service source counting how often it is queried.
#[derive(Default)]
struct CountingLister {
    service_queries: usize,
    method_queries: usize,
}

impl ServiceLister for CountingLister {
    async fn list_services(&mut self) -> Result<Vec<String>, SourceError> {
        self.service_queries += 1;
        Ok(vec!["a.Alpha".to_string(), "b.Beta".to_string()])
    }

    async fn list_methods(&mut self, service: &str) -> Result<Vec<String>, SourceError> {
        self.method_queries += 1;
        match service {
            "a.Alpha" => Ok(vec!["a.Alpha.Get".to_string(), "a.Alpha.List".to_string()]),
            "b.Beta" => Ok(vec!["b.Beta.Get".to_string()]),
            other => Err(SourceError::ServiceNotFound(other.to_string())),
        }
    }
}

#[tokio::test]
async fn test_catalog_queries_source_once() {
    let mut source = CountingLister::default();
    let mut catalog = MethodCatalog::new();

    for _ in 0..3 {
        catalog.services(&mut source).await.unwrap();
        catalog.methods(&mut source).await.unwrap();
        catalog.listing(&mut source).await.unwrap();
    }

    assert_eq!(source.service_queries, 1);
    assert_eq!(source.method_queries, 2);
}

#[tokio::test]
async fn test_catalog_methods_and_listing() {
    let mut source = CountingLister::default();
    let mut catalog = MethodCatalog::new();

    assert_eq!(
        catalog.methods(&mut source).await.unwrap(),
        ["a.Alpha.Get", "a.Alpha.List", "b.Beta.Get"]
    );
    assert_eq!(
        catalog.listing(&mut source).await.unwrap(),
        "a.Alpha\n\tGet\n\tList\n\nb.Beta\n\tGet"
    );
    assert_eq!(
        catalog.nonambiguous_methods(&mut source).await.unwrap(),
        vec!["a.Alpha.Get", "List", "b.Beta.Get"]
    );
}

#[tokio::test]
async fn test_catalog_propagates_source_errors() {
    struct FailingLister;

    impl ServiceLister for FailingLister {
        async fn list_services(&mut self) -> Result<Vec<String>, SourceError> {
            Ok(vec!["ghost.Service".to_string()])
        }

        async fn list_methods(&mut self, service: &str) -> Result<Vec<String>, SourceError> {
            Err(SourceError::ServiceNotFound(service.to_string()))
        }
    }

    let mut catalog = MethodCatalog::new();
    let result = catalog.methods(&mut FailingLister).await;

    assert!(matches!(result, Err(SourceError::ServiceNotFound(s)) if s == "ghost.Service"));
}
