//! Shared scaffolding for the integration suite: an in-memory WebSocket
//! pair built on `tokio::io::duplex`, so these tests exercise the real
//! `tokio-tungstenite` handshake and framing without touching a socket.

use tokio::io::DuplexStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::WebSocketStream;

pub async fn connected_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let server_handshake = tokio::spawn(tokio_tungstenite::accept_async(server_io));
    let request = "ws://localhost/".into_client_request().unwrap();
    let (client, _response) = tokio_tungstenite::client_async(request, client_io)
        .await
        .expect("client handshake");
    let server = server_handshake.await.unwrap().expect("server handshake");
    (client, server)
}
