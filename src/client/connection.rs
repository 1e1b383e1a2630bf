//! The client-side connection loop (C7, §4.7). Owns reconnection with
//! exponential backoff; each successful connect produces one generation
//! of `ConnectionState` the rest of the client routes new requests
//! through. Grounded on `connection.rs::Connection::connect_with_retry`'s
//! retry-with-backoff shape, generalized from "one HTTP/2 connection
//! attempt per request" to "one long-lived multiplexed socket the client
//! reconnects underneath transparently".

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::{Notify, RwLock};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::frame::{Flags, Frame, CONTROL_STREAM_ID};
use crate::registry::StreamRegistry;
use crate::transport::next_frame;
use crate::writer::{spawn_writer, WriterHandle};

/// Everything a new request needs from the currently-live connection.
/// Replaced wholesale on every successful reconnect; requests hold an
/// `Arc` snapshot rather than reaching through a lock per call.
pub struct ConnectionState {
    pub registry: Arc<StreamRegistry>,
    pub writer: WriterHandle,
    pub ct: CancellationToken,
}

/// Run the reconnect loop until `shutdown_ct` is cancelled. `connector` is
/// called once per attempt; on success the resulting socket is split into
/// a writer actor and a read loop, and `current` is updated so
/// `Client::request` can see the new generation.
pub async fn run<C, Fut, S>(
    connector: C,
    config: Arc<Config>,
    current: Arc<RwLock<Option<Arc<ConnectionState>>>>,
    shutdown_ct: CancellationToken,
) where
    C: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, crate::error::TransportError>> + Send,
    S: Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message> + Unpin + Send + 'static,
    <S as Sink<Message>>::Error: fmt::Debug,
{
    let mut attempt: u32 = 0;
    while !shutdown_ct.is_cancelled() {
        match connector().await {
            Ok(ws_stream) => {
                attempt = 0;
                run_one_generation(ws_stream, &config, &current, &shutdown_ct).await;
            }
            Err(err) => {
                log::warn!("connect attempt failed: {err}");
                let delay = config.reconnect_delay(attempt);
                attempt = attempt.saturating_add(1);
                tokio::select! {
                    () = shutdown_ct.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    *current.write().await = None;
}

async fn run_one_generation<S>(
    ws_stream: S,
    config: &Arc<Config>,
    current: &Arc<RwLock<Option<Arc<ConnectionState>>>>,
    shutdown_ct: &CancellationToken,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message> + Unpin + Send + 'static,
    <S as Sink<Message>>::Error: fmt::Debug,
{
    let (sink, mut source) = ws_stream.split();
    let (writer, writer_task) = spawn_writer(sink, config.send_queue_capacity);
    let registry = Arc::new(StreamRegistry::new(usize::MAX));
    let ct = shutdown_ct.child_token();
    let pong_notify = Arc::new(Notify::new());

    *current.write().await = Some(Arc::new(ConnectionState {
        registry: registry.clone(),
        writer: writer.clone(),
        ct: ct.clone(),
    }));

    let keepalive = crate::client::keepalive::spawn(
        writer.clone(),
        pong_notify.clone(),
        ct.clone(),
        config.ping_interval,
        config.pong_timeout,
    );

    read_loop(&mut source, &registry, &ct, config.max_payload_size, &pong_notify).await;

    ct.cancel();
    keepalive.abort();
    registry.clear();
    *current.write().await = None;
    drop(writer);
    let _ = writer_task.await;
}

async fn read_loop<S>(
    source: &mut S,
    registry: &Arc<StreamRegistry>,
    ct: &CancellationToken,
    max_payload_size: u32,
    pong_notify: &Arc<Notify>,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send,
{
    loop {
        tokio::select! {
            biased;
            () = ct.cancelled() => break,
            next = next_frame(source, max_payload_size) => match next {
                None => break,
                Some(Err(err)) => {
                    log::warn!("client connection closing: {err}");
                    break;
                }
                Some(Ok(None)) => continue,
                Some(Ok(Some(frame))) => route_frame(frame, registry, pong_notify),
            },
        }
    }
}

fn route_frame(frame: Frame, registry: &StreamRegistry, pong_notify: &Arc<Notify>) {
    if frame.stream_id == CONTROL_STREAM_ID {
        if frame.flags.contains(Flags::PONG) {
            pong_notify.notify_one();
        }
        return;
    }

    let id = frame.stream_id;
    let terminal = frame.flags.intersects(Flags::TRAILERS | Flags::RST_STREAM);
    if let Some(inbound) = registry.with_mut(id, |entry| {
        entry.touch();
        entry.inbound.clone()
    }) {
        let _ = inbound.try_send(frame);
    }
    if terminal {
        registry.remove(id);
    }
}
