//! WebSocket transport glue (§6.2's "WebSocket transport" collaborator).
//! The core is generic over any `Sink`/`Stream` of
//! `tokio_tungstenite::tungstenite::Message`; `tokio-tungstenite` is the
//! concrete default.

use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::frame::Frame;

/// Trait alias (via blanket impl) for "something we can read decoded
/// frames out of". Kept separate from `Sink` so read and write halves of
/// a split `WebSocketStream` can be held independently, matching how the
/// writer actor (§4.2) owns only the write half.
pub trait FrameSource: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin + Send {}
impl<T> FrameSource for T where
    T: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin + Send
{
}

pub trait FrameSink: Sink<Message> + Unpin + Send {}
impl<T> FrameSink for T where T: Sink<Message> + Unpin + Send {}

/// Read the next binary WebSocket message and decode it as a `Frame`.
/// Non-binary messages (text, ping/pong/close frames the library handles
/// at its own layer) are surfaced as `Ok(None)` so the connection loop can
/// log-and-skip per §4.6 step 2; socket closure is `Ok(None)` too,
/// distinguished from "skip one frame" by the caller checking
/// `source.next()` returned `None` versus `Some(Ok(None))`.
pub async fn next_frame<S>(source: &mut S, max_payload: u32) -> Option<Result<Option<Frame>, TransportError>>
where
    S: FrameSource,
{
    match source.next().await {
        None => None,
        Some(Err(err)) => Some(Err(TransportError::WebSocket(err))),
        Some(Ok(Message::Binary(bytes))) => match Frame::decode(&bytes, max_payload) {
            Ok(frame) => Some(Ok(Some(frame))),
            Err(decode_err) => {
                log::warn!("dropping malformed frame: {decode_err}");
                if decode_err.is_policy_violation() {
                    Some(Err(TransportError::Closed))
                } else {
                    Some(Ok(None))
                }
            }
        },
        Some(Ok(Message::Close(_))) => None,
        Some(Ok(_other)) => {
            log::debug!("ignoring non-binary websocket message");
            Some(Ok(None))
        }
    }
}
