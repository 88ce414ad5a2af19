use echo_service::{EchoServiceServer, FILE_DESCRIPTOR_SET, PROTO_PATH};
use echo_service_impl::EchoServiceImpl;
use grpcmd_core::{
    InvokeError, Session,
    catalog::MethodCatalog,
    source::{DescriptorSource, SourceError},
};
use std::path::PathBuf;
use tonic::{service::Routes, transport::Channel};

mod echo_service_impl;

// The server exposes no reflection service: the schema must come from local files.
fn echo_routes() -> Routes {
    Routes::new(EchoServiceServer::new(EchoServiceImpl))
}

#[tokio::test]
async fn test_file_descriptor_session() {
    let mut session = Session::from_service(echo_routes())
        .with_file_descriptor(FILE_DESCRIPTOR_SET)
        .unwrap();

    assert_eq!(
        session.services().await.unwrap(),
        vec!["echo.EchoService".to_string()]
    );

    let result = session
        .call_with_result("UnaryEcho", r#"{"message": "offline schema"}"#, &[])
        .await
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&result.messages()[0]).unwrap();
    assert_eq!(value["message"], "offline schema");
}

#[tokio::test]
async fn test_proto_file_session() {
    let mut session = Session::from_service(echo_routes())
        .with_proto_files(&[], &[PathBuf::from(PROTO_PATH)])
        .unwrap();

    let listing = session.listing().await.unwrap();
    assert_eq!(
        listing,
        "echo.EchoService\n\tUnaryEcho\n\tServerStreamingEcho\n\tClientStreamingEcho\n\tBidirectionalEcho\n\tInspect"
    );

    let result = session
        .call_with_result("ClientStreamingEcho", r#"{"message": "x"}{"message": "y"}"#, &[])
        .await
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&result.messages()[0]).unwrap();
    assert_eq!(value["message"], "xy");
}

#[tokio::test]
async fn test_reflection_session_without_reflection_service_fails() {
    let mut session = Session::from_service(echo_routes());

    let result = session.call_with_result("UnaryEcho", "{}", &[]).await;

    assert!(matches!(
        result,
        Err(InvokeError::Source(SourceError::ReflectionResolve(_)))
    ));
}

#[tokio::test]
async fn test_missing_proto_file() {
    let result = Session::from_service(echo_routes())
        .with_proto_files(&[], &[PathBuf::from("/does/not/exist.proto")]);

    assert!(matches!(result, Err(SourceError::ProtoParse(_))));
}

#[tokio::test]
async fn test_invalid_file_descriptor() {
    let result = Session::from_service(echo_routes()).with_file_descriptor(b"not a descriptor");

    assert!(matches!(result, Err(SourceError::DescriptorError(_))));
}

#[tokio::test]
async fn test_offline_catalog_from_proto_files() {
    let mut source =
        DescriptorSource::<Channel>::from_proto_files(&[], &[PathBuf::from(PROTO_PATH)]).unwrap();
    let mut catalog = MethodCatalog::new();

    let labels = catalog.nonambiguous_methods(&mut source).await.unwrap();

    assert_eq!(
        labels,
        vec![
            "UnaryEcho",
            "ServerStreamingEcho",
            "ClientStreamingEcho",
            "BidirectionalEcho",
            "Inspect"
        ]
    );

    let method = source
        .find_method("echo.EchoService.Inspect")
        .await
        .unwrap();
    assert_eq!(method.input().full_name(), "echo.Node");
}
