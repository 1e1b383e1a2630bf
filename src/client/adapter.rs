//! The client-side stream adapter (C5, §4.5). Mirrors
//! `server::adapter::ServerStream` with the roles reversed: the caller
//! sends `DATA` and reads `HEADERS`/`DATA`/`TRAILERS` back. Grounded on
//! `response.rs::Response`'s single-future completion, generalized to a
//! pollable multi-message stream and given the same drop-based safety net
//! as the server side, except here dropping mid-flight means the caller
//! gave up, so the fallback is `RST_STREAM(CANCEL)` rather than a
//! synthesized trailer (§4.5's "dropping a response handle before it
//! completes cancels the call").

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{HeaderEncodeError, TransportError};
use crate::frame::{Flags, Frame};
use crate::marshal::{Marshal, MarshalError, Unmarshal};
use crate::metadata::{self, Metadata};
use crate::registry::StreamRegistry;
use crate::status::{Code, Status};
use crate::writer::WriterHandle;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("stream is already finished")]
    StreamFinished,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    #[error(transparent)]
    HeaderEncode(#[from] HeaderEncodeError),
}

pub struct ClientStream {
    id: u32,
    writer: WriterHandle,
    inbound: mpsc::Receiver<Frame>,
    cancellation: CancellationToken,
    registry: Arc<StreamRegistry>,
    response_metadata: Metadata,
    status: Option<Status>,
    send_closed: bool,
    finished: bool,
}

impl ClientStream {
    #[must_use]
    pub fn new(
        id: u32,
        writer: WriterHandle,
        inbound: mpsc::Receiver<Frame>,
        cancellation: CancellationToken,
        registry: Arc<StreamRegistry>,
    ) -> Self {
        Self {
            id,
            writer,
            inbound,
            cancellation,
            registry,
            response_metadata: Metadata::new(),
            status: None,
            send_closed: false,
            finished: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Headers the server has sent back so far. Empty until the first
    /// `HEADERS` frame for this id has been observed by `recv_msg`.
    #[must_use]
    pub fn response_metadata(&self) -> &Metadata {
        &self.response_metadata
    }

    /// The final status, once `recv_msg` has surfaced the `TRAILERS`
    /// frame that carries it. `None` while the call is still in flight.
    #[must_use]
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    #[must_use]
    pub fn context(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Serialize and send one request message (§4.5).
    pub async fn send_msg<M: Marshal>(&mut self, message: &M) -> Result<(), AdapterError> {
        if self.send_closed {
            return Err(AdapterError::StreamFinished);
        }
        let bytes = message.marshal()?;
        self.writer.send(Frame::new(Flags::DATA, self.id, bytes)).await?;
        Ok(())
    }

    /// Half-close the send side: no more request messages will follow
    /// (unary and client-streaming calls use this once; server-streaming
    /// calls use it right after the single request message). Idempotent.
    pub async fn close_send(&mut self) -> Result<(), AdapterError> {
        if self.send_closed {
            return Ok(());
        }
        self.send_closed = true;
        self.writer
            .send(Frame::new(Flags::DATA | Flags::EOS, self.id, Vec::new()))
            .await?;
        Ok(())
    }

    /// Read the next inbound frame for this stream: a `HEADERS` frame
    /// updates `response_metadata` and is skipped transparently; a `DATA`
    /// frame is unmarshalled and returned; a `TRAILERS` frame records the
    /// final status and ends the stream (`Ok(None)`); cancellation (local
    /// `RST_STREAM` or a dead connection) surfaces as `Err`.
    pub async fn recv_msg<M: Unmarshal>(&mut self) -> Result<Option<M>, Status> {
        loop {
            if self.finished {
                return Ok(None);
            }
            tokio::select! {
                biased;
                () = self.cancellation.cancelled() => {
                    self.finished = true;
                    return Err(self.status.clone().unwrap_or_else(Status::cancelled));
                }
                frame = self.inbound.recv() => match frame {
                    None => {
                        self.finished = true;
                        return Err(self.status.clone().unwrap_or_else(|| {
                            Status::unavailable("connection closed before trailers arrived")
                        }));
                    }
                    Some(frame) if frame.flags.contains(Flags::HEADERS) => {
                        self.response_metadata.merge(Metadata::decode(&frame.payload));
                        continue;
                    }
                    Some(frame) if frame.flags.contains(Flags::TRAILERS) => {
                        let trailers = Metadata::decode(&frame.payload);
                        let code = trailers
                            .get(metadata::KEY_GRPC_STATUS)
                            .and_then(|s| s.parse::<i32>().ok())
                            .and_then(num_traits::FromPrimitive::from_i32)
                            .unwrap_or(Code::Unknown);
                        let message = trailers.get(metadata::KEY_GRPC_MESSAGE).unwrap_or_default().to_owned();
                        let status = Status::new(code, message);
                        self.finished = true;
                        if status.code.is_ok() {
                            return Ok(None);
                        }
                        let err = status.clone();
                        self.status = Some(status);
                        return Err(err);
                    }
                    Some(frame) => {
                        return M::unmarshal(&frame.payload)
                            .map(Some)
                            .map_err(|e| Status::new(Code::Internal, e.to_string()));
                    }
                },
            }
        }
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        if self.finished {
            return;
        }
        let _ = self
            .writer
            .try_send(Frame::rst_stream(self.id, crate::status::ResetCode::Cancel));
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn stream_with_channels() -> (ClientStream, mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        let (writer_tx, writer_rx) = mpsc::channel(16);
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let registry = Arc::new(StreamRegistry::new(100));
        let stream = ClientStream::new(
            1,
            WriterHandle::for_test(writer_tx),
            inbound_rx,
            CancellationToken::new(),
            registry,
        );
        (stream, inbound_tx, writer_rx)
    }

    #[tokio::test]
    async fn recv_msg_surfaces_data_then_ok_trailers() {
        let (mut stream, inbound_tx, _writer_rx) = stream_with_channels();
        inbound_tx
            .send(Frame::new(Flags::DATA, 1, Bytes::from_static(b"hi")))
            .await
            .unwrap();
        let mut trailers = Metadata::new();
        trailers.insert(metadata::KEY_GRPC_STATUS, "0");
        inbound_tx
            .send(Frame::new(Flags::TRAILERS | Flags::EOS, 1, trailers.encode().unwrap()))
            .await
            .unwrap();

        let first: Option<Bytes> = stream.recv_msg().await.unwrap();
        assert_eq!(first.unwrap().as_ref(), b"hi");
        let second: Result<Option<Bytes>, Status> = stream.recv_msg().await;
        assert_eq!(second, Ok(None));
    }

    #[tokio::test]
    async fn recv_msg_surfaces_error_status_from_trailers() {
        let (mut stream, inbound_tx, _writer_rx) = stream_with_channels();
        let mut trailers = Metadata::new();
        trailers.insert(metadata::KEY_GRPC_STATUS, "5"); // NotFound
        trailers.insert(metadata::KEY_GRPC_MESSAGE, "nope");
        inbound_tx
            .send(Frame::new(Flags::TRAILERS | Flags::EOS, 1, trailers.encode().unwrap()))
            .await
            .unwrap();

        let result: Result<Option<Bytes>, Status> = stream.recv_msg().await;
        assert_eq!(result, Err(Status::new(Code::NotFound, "nope")));
    }

    #[tokio::test]
    async fn drop_before_completion_sends_rst_stream_cancel() {
        let (stream, _inbound_tx, mut writer_rx) = stream_with_channels();
        let ct = stream.context().clone();
        drop(stream);

        let frame = writer_rx.recv().await.unwrap();
        assert!(frame.flags.contains(Flags::RST_STREAM));
        assert_eq!(
            frame.payload.as_ref(),
            crate::status::ResetCode::Cancel.to_be_bytes().as_slice()
        );
        assert!(ct.is_cancelled());
    }
}
