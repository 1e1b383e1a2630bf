//! A tiny demo binary exercising both endpoints end to end: `serve` runs
//! an echo method over a TCP listener, `call` opens one stream against a
//! running server and prints the echoed reply.

use std::sync::Arc;

use clap::{crate_version, App, Arg, SubCommand};
use grpc_ws_transport::marshal::json::Json;
use grpc_ws_transport::method::MethodKind;
use grpc_ws_transport::{Client, Config, Server};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Echo {
    message: String,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = App::new("grpc-ws-demo")
        .version(crate_version!())
        .subcommand(
            SubCommand::with_name("serve")
                .arg(Arg::with_name("addr").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("call")
                .arg(Arg::with_name("url").required(true).index(1))
                .arg(Arg::with_name("message").required(true).index(2)),
        )
        .get_matches();

    match matches.subcommand() {
        ("serve", Some(sub)) => serve(sub.value_of("addr").expect("missing addr")).await,
        ("call", Some(sub)) => {
            call(
                sub.value_of("url").expect("missing url"),
                sub.value_of("message").expect("missing message"),
            )
            .await
        }
        _ => eprintln!("usage: grpc-ws-demo <serve ADDR | call URL MESSAGE>"),
    }
}

async fn serve(addr: &str) {
    let server = Arc::new(Server::new(Config::default()));
    server
        .register_fn("/demo.Echo/Say", MethodKind::Unary, |mut stream| async move {
            let request: Option<Json<Echo>> = stream.recv_msg().await.unwrap_or(None);
            if let Some(Json(echo)) = request {
                let _ = stream.send_msg(&Json(echo)).await;
            }
            stream.finish(grpc_ws_transport::Status::ok()).await;
        })
        .await;

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind");
    log::info!("listening on {addr}");
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("accept failed: {err}");
                continue;
            }
        };
        let server = server.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(socket).await {
                Ok(ws) => {
                    log::info!("connection from {peer}");
                    server.serve_connection(ws).await;
                }
                Err(err) => log::warn!("handshake with {peer} failed: {err}"),
            }
        });
    }
}

async fn call(url: &str, message: &str) {
    let url = url::Url::parse(url).expect("invalid url");
    let client = Client::connect(
        move || {
            let url = url.clone();
            async move {
                let (ws, _) = tokio_tungstenite::connect_async(url)
                    .await
                    .map_err(grpc_ws_transport::error::TransportError::WebSocket)?;
                Ok(ws)
            }
        },
        Config::default(),
    );

    let mut stream = client
        .request("/demo.Echo/Say", grpc_ws_transport::Metadata::new())
        .await
        .expect("open stream");
    stream
        .send_msg(&Json(Echo {
            message: message.to_owned(),
        }))
        .await
        .expect("send request");
    stream.close_send().await.expect("half-close");

    match stream.recv_msg::<Json<Echo>>().await {
        Ok(Some(Json(echo))) => println!("{}", echo.message),
        Ok(None) => println!("(empty response)"),
        Err(status) => eprintln!("rpc failed: {status}"),
    }

    client.shutdown().await;
}
