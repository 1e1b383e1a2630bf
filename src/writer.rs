//! The connection I/O actor (C2, §4.2). A single task owns the socket's
//! write side; producers enqueue encoded frames on a bounded channel.
//! Grounded on `connection.rs::spawn_request_sender`'s "one dedicated task
//! writes, everyone else enqueues" rationale, reimplemented with
//! `tokio::sync::mpsc` + `tokio::spawn` in place of `std::thread::spawn` +
//! `std::sync::mpsc`, since here one physical socket carries every stream
//! instead of one socket per HTTP/2 connection attempt.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::frame::Frame;

/// A request to close the socket with a specific WS close code, taking
/// priority over any frames still queued behind it (§4.5 step 1, §4.7.3:
/// id-wraparound and watchdog expiry both close with code 4000).
pub(crate) struct CloseRequest {
    pub(crate) code: u16,
    pub(crate) reason: String,
}

/// Handle held by every frame producer (adapters, ping scheduler, shutdown
/// path). Cloning is cheap; it is just a pair of `Sender` clones.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Frame>,
    close_tx: mpsc::Sender<CloseRequest>,
}

impl WriterHandle {
    /// Enqueue a frame. Blocks (thereby propagating backpressure, §5) when
    /// the bounded queue is full; fails if the writer actor has exited.
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).await.map_err(|_| TransportError::WriterGone)
    }

    /// Non-blocking enqueue for call sites that must not await (e.g.
    /// `Drop` impls). Fails immediately if the queue is full or closed.
    pub fn try_send(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx
            .try_send(frame)
            .map_err(|_| TransportError::WriterGone)
    }

    /// Ask the writer actor to send a WS close frame with `code` and stop.
    /// Used for the two conditions the wire format closes with a specific
    /// code instead of a plain codeless close: client stream-id
    /// wraparound and keepalive watchdog expiry.
    pub async fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), TransportError> {
        self.close_tx
            .send(CloseRequest {
                code,
                reason: reason.into(),
            })
            .await
            .map_err(|_| TransportError::WriterGone)
    }

    /// Build a handle directly from a channel sender, bypassing
    /// `spawn_writer`. Used by adapter/connection unit tests that want to
    /// observe enqueued frames without running a real writer actor.
    #[cfg(test)]
    #[must_use]
    pub fn for_test(tx: mpsc::Sender<Frame>) -> Self {
        let (close_tx, _close_rx) = mpsc::channel(1);
        Self { tx, close_tx }
    }

    /// Like `for_test`, but also exposes the close-request channel so a
    /// test can assert a specific WS close code was requested.
    #[cfg(test)]
    #[must_use]
    pub fn for_test_with_close(tx: mpsc::Sender<Frame>) -> (Self, mpsc::Receiver<CloseRequest>) {
        let (close_tx, close_rx) = mpsc::channel(1);
        (Self { tx, close_tx }, close_rx)
    }
}

/// Spawn the single writer task for one connection. `sink` is the send
/// half of a WebSocket (any `Sink<Message>` — tungstenite's, or a test
/// double). Returns a cloneable handle producers enqueue onto, and a
/// `JoinHandle` the connection loop can await on shutdown.
pub fn spawn_writer<S>(sink: S, capacity: usize) -> (WriterHandle, tokio::task::JoinHandle<()>)
where
    S: futures_util::Sink<Message> + Unpin + Send + 'static,
    S::Error: std::fmt::Debug,
{
    let (tx, mut rx) = mpsc::channel::<Frame>(capacity);
    let (close_tx, mut close_rx) = mpsc::channel::<CloseRequest>(1);
    let handle = tokio::spawn(async move {
        let mut sink = sink;
        loop {
            tokio::select! {
                biased;
                close = close_rx.recv() => {
                    if let Some(CloseRequest { code, reason }) = close {
                        let close_frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if let Err(err) = sink.send(Message::Close(Some(close_frame))).await {
                            log::warn!("writer actor: failed to send close frame {code}: {err:?}");
                        }
                    }
                    break;
                }
                frame = rx.recv() => match frame {
                    None => break,
                    Some(frame) => {
                        let bytes = frame.encode();
                        if let Err(err) = sink.send(Message::Binary(bytes)).await {
                            log::warn!("writer actor: send failed, closing connection: {err:?}");
                            break;
                        }
                    }
                },
            }
        }
        let _ = sink.close().await;
    });
    (WriterHandle { tx, close_tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Flags;

    #[tokio::test]
    async fn writer_preserves_fifo_order_from_one_producer() {
        let (sink, mut collected_rx) = test_sink();
        let (handle, join) = spawn_writer(sink, 10);

        for i in 0..5u32 {
            handle
                .send(Frame::new(Flags::DATA, i + 1, vec![i as u8]))
                .await
                .unwrap();
        }
        drop(handle);
        join.await.unwrap();

        let mut seen = Vec::new();
        while let Some(msg) = collected_rx.recv().await {
            seen.push(msg);
        }
        let ids: Vec<u32> = seen
            .iter()
            .map(|bytes| u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn close_sends_the_requested_code_and_stops_the_actor() {
        let (sink, mut collected_rx) = test_message_sink();
        let (handle, join) = spawn_writer(sink, 10);

        handle.close(4000, "no pong within timeout").await.unwrap();
        join.await.unwrap();

        let Message::Close(Some(close_frame)) = collected_rx.recv().await.unwrap() else {
            panic!("expected a close message");
        };
        assert_eq!(u16::from(close_frame.code), 4000);
        assert_eq!(close_frame.reason, "no pong within timeout");
    }

    /// A minimal in-memory `Sink<Message>` double that records every
    /// binary message it receives, for writer-actor unit tests that don't
    /// need a real WebSocket.
    fn test_sink() -> (
        impl futures_util::Sink<Message, Error = std::convert::Infallible> + Unpin,
        tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        use std::convert::Infallible;
        use std::pin::Pin;
        use std::task::{Context, Poll};

        struct RecordingSink(tokio::sync::mpsc::UnboundedSender<Vec<u8>>);

        impl futures_util::Sink<Message> for RecordingSink {
            type Error = Infallible;

            fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
                if let Message::Binary(bytes) = item {
                    let _ = self.0.send(bytes);
                }
                Ok(())
            }

            fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (RecordingSink(tx), rx)
    }

    /// Like `test_sink`, but records every `Message` verbatim (including
    /// `Close`), for tests that need to observe the close code/reason.
    fn test_message_sink() -> (
        impl futures_util::Sink<Message, Error = std::convert::Infallible> + Unpin,
        tokio::sync::mpsc::UnboundedReceiver<Message>,
    ) {
        use std::convert::Infallible;
        use std::pin::Pin;
        use std::task::{Context, Poll};

        struct RecordingSink(tokio::sync::mpsc::UnboundedSender<Message>);

        impl futures_util::Sink<Message> for RecordingSink {
            type Error = Infallible;

            fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
                let _ = self.0.send(item);
                Ok(())
            }

            fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (RecordingSink(tx), rx)
    }
}
