//! The server stream adapter (C4, §4.4). Presents one demultiplexed
//! stream as the standard gRPC server-stream capability set
//! (`sendMsg`/`recvMsg`/`setHeader`/`sendHeader`/`setTrailer`/`context`).
//! Grounded on `stream.rs::Stream`'s per-stream buffers and
//! `send_response` completion, generalized from "buffer the whole body,
//! send once" to "stream messages one `DATA` frame at a time", since gRPC
//! server-streaming sends many messages per call where HTTP/2 sent exactly
//! one response body.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{HeaderEncodeError, TransportError};
use crate::frame::{Flags, Frame};
use crate::marshal::{Marshal, MarshalError, Unmarshal};
use crate::metadata::{self, Metadata};
use crate::registry::{StreamEntry, StreamRegistry};
use crate::status::{Code, Status};
use crate::writer::WriterHandle;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("headers already sent")]
    HeadersAlreadySent,
    #[error("stream is already finished")]
    StreamFinished,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    #[error(transparent)]
    HeaderEncode(#[from] HeaderEncodeError),
}

pub struct ServerStream {
    id: u32,
    writer: WriterHandle,
    inbound: mpsc::Receiver<Frame>,
    cancellation: CancellationToken,
    request_metadata: Metadata,
    pending_headers: Metadata,
    headers_sent: bool,
    trailer_metadata: Metadata,
    finished: bool,
    registry: Arc<StreamRegistry>,
}

impl ServerStream {
    #[must_use]
    pub fn new(
        id: u32,
        writer: WriterHandle,
        inbound: mpsc::Receiver<Frame>,
        cancellation: CancellationToken,
        request_metadata: Metadata,
        registry: Arc<StreamRegistry>,
    ) -> Self {
        Self {
            id,
            writer,
            inbound,
            cancellation,
            request_metadata,
            pending_headers: Metadata::new(),
            headers_sent: false,
            trailer_metadata: Metadata::new(),
            finished: false,
            registry,
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// A child of the connection context carrying incoming metadata
    /// extracted from the initial `HEADERS` frame (§4.4 `context()`).
    #[must_use]
    pub fn request_metadata(&self) -> &Metadata {
        &self.request_metadata
    }

    /// Cancelled when `RST_STREAM` is received for this id, or when the
    /// connection context is cancelled (§5: "cascades to all streams").
    #[must_use]
    pub fn context(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Merge metadata into the pending header map. Fails if headers have
    /// already been sent (§4.4).
    pub fn set_header(&mut self, md: Metadata) -> Result<(), AdapterError> {
        if self.headers_sent {
            return Err(AdapterError::HeadersAlreadySent);
        }
        self.pending_headers.merge(md);
        Ok(())
    }

    /// Merge and immediately emit a `HEADERS` frame. Idempotent guard: the
    /// second call fails without emitting a second `HEADERS` frame
    /// (Testable Properties, §8).
    pub async fn send_header(&mut self, md: Metadata) -> Result<(), AdapterError> {
        if self.headers_sent {
            return Err(AdapterError::HeadersAlreadySent);
        }
        self.pending_headers.merge(md);
        self.flush_headers().await
    }

    async fn flush_headers(&mut self) -> Result<(), AdapterError> {
        if self.headers_sent {
            return Ok(());
        }
        let payload = std::mem::take(&mut self.pending_headers).encode()?;
        self.writer
            .send(Frame::new(Flags::HEADERS, self.id, payload))
            .await?;
        self.headers_sent = true;
        self.registry.with_mut(self.id, StreamEntry::touch);
        Ok(())
    }

    /// Merge metadata into the trailer map; applied when the handler
    /// returns (via `finish`).
    pub fn set_trailer(&mut self, md: Metadata) {
        self.trailer_metadata.merge(md);
    }

    /// Serialize `message`, wrap as a `DATA` frame, enqueue. The first
    /// call auto-emits any pending headers (§4.4).
    pub async fn send_msg<M: Marshal>(&mut self, message: &M) -> Result<(), AdapterError> {
        if self.finished {
            return Err(AdapterError::StreamFinished);
        }
        self.flush_headers().await?;
        let bytes = message.marshal()?;
        self.writer.send(Frame::new(Flags::DATA, self.id, bytes)).await?;
        self.registry.with_mut(self.id, StreamEntry::touch);
        Ok(())
    }

    /// Block until a payload appears on the inbound queue, the queue is
    /// closed by `EOS` (`Ok(None)`), or the stream context is cancelled
    /// (`Err` with the cancellation cause).
    pub async fn recv_msg<M: Unmarshal>(&mut self) -> Result<Option<M>, Status> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Status::cancelled()),
            frame = self.inbound.recv() => match frame {
                Some(frame) => M::unmarshal(&frame.payload)
                    .map(Some)
                    .map_err(|e| Status::new(Code::Internal, e.to_string())),
                None => Ok(None),
            },
        }
    }

    /// Build the `TRAILERS` payload (`grpc-status`, `grpc-message`, plus
    /// trailer metadata), encode with `TRAILERS|EOS`, enqueue, and mark
    /// the stream finished. Idempotent: a second call is a no-op, which is
    /// what makes the `Drop` safety net below harmless after an explicit
    /// `finish`.
    pub async fn finish(&mut self, status: Status) {
        if self.finished {
            return;
        }
        self.finished = true;
        let mut trailers = std::mem::take(&mut self.trailer_metadata);
        trailers.insert(metadata::KEY_GRPC_STATUS, (status.code as i32).to_string());
        trailers.insert(metadata::KEY_GRPC_MESSAGE, status.message.clone());
        let payload = match trailers.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("trailer metadata failed to encode, dropping offending pair: {err}");
                let mut fallback = Metadata::new();
                fallback.insert(metadata::KEY_GRPC_STATUS, (Code::Internal as i32).to_string());
                fallback.insert(metadata::KEY_GRPC_MESSAGE, "trailer metadata encode error");
                fallback.encode().expect("fallback trailer metadata is always encodable")
            }
        };
        let _ = self
            .writer
            .send(Frame::new(Flags::TRAILERS | Flags::EOS, self.id, payload))
            .await;
        self.registry.remove(self.id);
    }
}

impl Drop for ServerStream {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // A handler that panics or returns without calling `finish` must
        // not leave the stream silently hanging on the wire (§4.4: "a
        // handler panic maps to status INTERNAL"). `finish` is async, so
        // from `Drop` we can only best-effort enqueue via the non-blocking
        // writer path.
        self.finished = true;
        let mut trailers = Metadata::new();
        trailers.insert(metadata::KEY_GRPC_STATUS, (Code::Internal as i32).to_string());
        trailers.insert(metadata::KEY_GRPC_MESSAGE, "stream dropped without explicit completion");
        if let Ok(payload) = trailers.encode() {
            let _ = self
                .writer
                .try_send(Frame::new(Flags::TRAILERS | Flags::EOS, self.id, payload));
        }
        self.registry.remove(self.id);
    }
}
