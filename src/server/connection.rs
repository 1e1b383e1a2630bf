//! The server-side connection loop (C6, §4.6). One instance per accepted
//! WebSocket, grounded on `connection.rs::Connection::handle_connection`'s
//! read-loop-plus-dispatch-by-frame-type shape, generalized from HTTP/2's
//! settings/headers/data/rst-stream dispatch to this protocol's flag-byte
//! dispatch, and from "one response future per request" to "one spawned
//! handler task per stream, reachable from the method registry".

use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::frame::{Flags, Frame, CONTROL_STREAM_ID};
use crate::metadata::{self, Metadata};
use crate::method::{dispatch, MethodRegistry};
use crate::registry::{StreamEntry, StreamRegistry};
use crate::server::adapter::ServerStream;
use crate::status::ResetCode;
use crate::transport::next_frame;
use crate::writer::spawn_writer;

/// Drive one server connection to completion: reads frames until the
/// socket closes or a policy violation forces it shut, dispatching each
/// one by stream id and flag class. Returns once the socket is gone and
/// every spawned handler task has had its cancellation token tripped.
pub async fn run<S>(ws_stream: S, methods: Arc<MethodRegistry>, config: Arc<Config>, shutdown_ct: CancellationToken)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message> + Unpin + Send + 'static,
    <S as Sink<Message>>::Error: std::fmt::Debug,
{
    let (sink, mut source) = ws_stream.split();
    let (writer, writer_task) = spawn_writer(sink, config.send_queue_capacity);
    let registry = Arc::new(StreamRegistry::new(config.max_concurrent_streams));
    let connection_ct = shutdown_ct.child_token();

    let idle_task = crate::idle::spawn(
        registry.clone(),
        writer.clone(),
        config.idle_timeout,
        config.idle_check_interval,
        connection_ct.clone(),
    );

    loop {
        tokio::select! {
            biased;
            () = shutdown_ct.cancelled() => {
                // §4.8 step 2: reset every active stream with NO_ERROR before
                // the cancellation cascade tears down the connection context.
                for id in registry.ids() {
                    let _ = writer.send(Frame::rst_stream(id, ResetCode::NoError)).await;
                }
                break;
            }
            frame = next_frame(&mut source, config.max_payload_size) => {
                match frame {
                    None => break,
                    Some(Err(err)) => {
                        log::warn!("server connection closing: {err}");
                        break;
                    }
                    Some(Ok(None)) => continue,
                    Some(Ok(Some(frame))) => {
                        if frame.stream_id == CONTROL_STREAM_ID {
                            handle_control_frame(frame, &writer).await;
                        } else {
                            handle_stream_frame(frame, &registry, &writer, &methods, &connection_ct).await;
                        }
                    }
                }
            }
        }
    }

    connection_ct.cancel();
    idle_task.abort();
    registry.clear();
    drop(writer);
    let _ = writer_task.await;
}

async fn handle_control_frame(frame: Frame, writer: &crate::writer::WriterHandle) {
    if frame.flags.contains(Flags::PING) {
        let _ = writer.send(Frame::pong()).await;
    }
    // PONG on the server side has nothing to watch: only the client runs
    // the keepalive watchdog (§4.9).
}

async fn handle_stream_frame(
    frame: Frame,
    registry: &Arc<StreamRegistry>,
    writer: &crate::writer::WriterHandle,
    methods: &Arc<MethodRegistry>,
    connection_ct: &CancellationToken,
) {
    let id = frame.stream_id;

    if frame.flags.contains(Flags::RST_STREAM) {
        if let Some(ct) = registry.with_mut(id, |entry| entry.cancellation.clone()) {
            ct.cancel();
        }
        if !registry.remove(id) {
            // RST_STREAM racing a TRAILERS-driven close that already won
            // (§9): first arrival wins, the second is a harmless no-op.
            log::warn!("stream {id}: RST_STREAM arrived after the stream was already closed");
        }
        return;
    }

    if frame.flags.contains(Flags::HEADERS) {
        open_stream(frame, registry, writer, methods, connection_ct).await;
        return;
    }

    let Some(inbound) = registry.with_mut(id, |entry| {
        entry.touch();
        entry.inbound.clone()
    }) else {
        // Frame for an id we don't know about: already closed, or a
        // stray. Not a protocol violation worth resetting over (§4.6).
        return;
    };

    if frame.flags.contains(Flags::DATA) {
        let _ = inbound.send(frame.clone()).await;
    }

    if frame.flags.contains(Flags::EOS) {
        let closed = registry
            .with_mut(id, |entry| {
                entry.state = entry.state.on_eos(true);
                entry.state.is_closed()
            })
            .unwrap_or(false);
        if closed {
            registry.remove(id);
        }
    }
}

async fn open_stream(
    frame: Frame,
    registry: &Arc<StreamRegistry>,
    writer: &crate::writer::WriterHandle,
    methods: &Arc<MethodRegistry>,
    connection_ct: &CancellationToken,
) {
    let id = frame.stream_id;
    let request_metadata = Metadata::decode(&frame.payload);
    let Some(path) = request_metadata.get(metadata::KEY_PATH).map(str::to_owned) else {
        let _ = writer.send(Frame::rst_stream(id, ResetCode::ProtocolError)).await;
        return;
    };

    let Some(handler) = methods.lookup(&path).await else {
        let _ = writer.send(Frame::rst_stream(id, ResetCode::RefusedStream)).await;
        return;
    };

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(32);
    let stream_ct = connection_ct.child_token();
    let entry = StreamEntry::new(inbound_tx, stream_ct.clone());

    if !registry.try_insert(id, entry) {
        let _ = writer.send(Frame::rst_stream(id, ResetCode::RefusedStream)).await;
        return;
    }
    registry.with_mut(id, |entry| entry.state = entry.state.on_headers());

    let stream = ServerStream::new(
        id,
        writer.clone(),
        inbound_rx,
        stream_ct,
        request_metadata,
        registry.clone(),
    );
    tokio::spawn(dispatch(handler, stream));
}
