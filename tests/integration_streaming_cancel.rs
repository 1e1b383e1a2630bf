//! Scenario 2: a server-streaming call where the caller drops its stream
//! handle before the server is done. The server handler's context must
//! observe the cancellation instead of streaming forever.

mod common;

use std::sync::Arc;
use std::time::Duration;

use grpc_ws_transport::metadata::Metadata;
use grpc_ws_transport::method::MethodKind;
use grpc_ws_transport::{Bytes, Client, Config, Server};
use tokio::sync::{Mutex, Notify};

#[tokio::test]
async fn dropping_client_stream_cancels_server_handler() {
    let (client_ws, server_ws) = common::connected_pair().await;

    let cancelled = Arc::new(Notify::new());
    let server = Arc::new(Server::new(Config::default()));
    server
        .register_fn("/counter.Counter/Stream", MethodKind::ServerStreaming, {
            let cancelled = cancelled.clone();
            move |mut stream| {
                let cancelled = cancelled.clone();
                async move {
                    let ctx = stream.context().clone();
                    let mut i: u64 = 0;
                    loop {
                        tokio::select! {
                            biased;
                            () = ctx.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_millis(5)) => {
                                i += 1;
                                if stream.send_msg(&Bytes::from(i.to_be_bytes().to_vec())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    cancelled.notify_one();
                    // no finish(): the stream was already torn down by the
                    // peer's RST_STREAM, so the drop safety net is a no-op
                    // once the registry has already forgotten this id.
                }
            }
        })
        .await;
    let server_task = tokio::spawn({
        let server = server.clone();
        async move { server.serve_connection(server_ws).await }
    });

    let client_ws = Arc::new(Mutex::new(Some(client_ws)));
    let client = Client::connect(
        move || {
            let client_ws = client_ws.clone();
            async move {
                match client_ws.lock().await.take() {
                    Some(ws) => Ok(ws),
                    None => std::future::pending().await,
                }
            }
        },
        Config::default(),
    );

    let mut stream = client.request("/counter.Counter/Stream", Metadata::new()).await.expect("open stream");
    stream.close_send().await.unwrap();
    let _first: Option<Bytes> = stream.recv_msg().await.unwrap();
    drop(stream);

    tokio::time::timeout(Duration::from_secs(2), cancelled.notified())
        .await
        .expect("server handler should observe cancellation");

    client.shutdown().await;
    let _ = server_task.await;
}
