use echo_service::EchoService;
use echo_service::pb::{EchoRequest, EchoResponse, Node};

use futures_util::Stream;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tonic::{
    Code, Request, Response, Status, Streaming,
    metadata::{MetadataMap, MetadataValue},
};

/// Request message making the service answer with a failure.
pub const FAILING_MESSAGE: &str = "error";

/// Request message making a server stream hang after its first response.
pub const STALLING_MESSAGE: &str = "stall";

pub struct EchoServiceImpl;

fn failure(code: Code, message: &str) -> Status {
    let mut trailers = MetadataMap::new();
    trailers.insert("x-reason", MetadataValue::from_static("requested"));
    Status::with_metadata(code, message, trailers)
}

#[tonic::async_trait]
impl EchoService for EchoServiceImpl {
    type BidirectionalEchoStream = Pin<Box<dyn Stream<Item = Result<EchoResponse, Status>> + Send>>;
    type ServerStreamingEchoStream = ReceiverStream<Result<EchoResponse, Status>>;

    async fn unary_echo(
        &self,
        request: Request<EchoRequest>,
    ) -> Result<Response<EchoResponse>, Status> {
        let tags = request.metadata().get_all("x-tag").iter().count();
        let message = request.into_inner().message;

        if message == FAILING_MESSAGE {
            return Err(failure(Code::InvalidArgument, "invalid message"));
        }

        let mut response = Response::new(EchoResponse { message });
        response
            .metadata_mut()
            .insert("x-tag-count", MetadataValue::from(tags));
        Ok(response)
    }

    async fn server_streaming_echo(
        &self,
        request: Request<EchoRequest>,
    ) -> Result<Response<Self::ServerStreamingEchoStream>, Status> {
        let msg = request.into_inner().message;
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            if msg == STALLING_MESSAGE {
                let first = EchoResponse {
                    message: format!("{msg} - seq 0"),
                };
                tx.send(Ok(first)).await.ok();
                tx.closed().await;
                return;
            }

            if msg == FAILING_MESSAGE {
                let first = EchoResponse {
                    message: format!("{msg} - seq 0"),
                };
                tx.send(Ok(first)).await.ok();
                tx.send(Err(failure(Code::Aborted, "stream aborted")))
                    .await
                    .ok();
                return;
            }

            for i in 0..3 {
                let response = EchoResponse {
                    message: format!("{msg} - seq {i}"),
                };
                tx.send(Ok(response)).await.ok();
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn client_streaming_echo(
        &self,
        request: Request<Streaming<EchoRequest>>,
    ) -> Result<Response<EchoResponse>, Status> {
        let mut stream = request.into_inner();
        let mut full_msg = String::new();

        while let Some(req) = stream.next().await {
            full_msg.push_str(&req?.message);
        }

        Ok(Response::new(EchoResponse { message: full_msg }))
    }

    async fn bidirectional_echo(
        &self,
        request: Request<Streaming<EchoRequest>>,
    ) -> Result<Response<Self::BidirectionalEchoStream>, Status> {
        let mut in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            while let Some(result) = in_stream.next().await {
                let item = result.map(|req| EchoResponse {
                    message: format!("echo: {}", req.message),
                });
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn inspect(&self, request: Request<Node>) -> Result<Response<Node>, Status> {
        Ok(Response::new(request.into_inner()))
    }
}
