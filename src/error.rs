//! Error taxonomy (§7). Wire-format and header-encode errors are closed,
//! typed enums (`thiserror`); transport errors wrap the underlying
//! WebSocket library's error type.

use thiserror::Error;

/// Recoverable frame decode failures (§4.1). The caller decides whether a
/// given variant should close the connection (`Oversize` always does;
/// `TooSmall`/`Truncated` are logged and the frame is dropped).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("frame shorter than the 9-byte header ({len} bytes)")]
    TooSmall { len: usize },

    #[error("declared payload length {declared} exceeds configured maximum {max}")]
    Oversize { declared: u32, max: u32 },

    #[error("declared payload length {declared} exceeds available bytes {available}")]
    Truncated { declared: u32, available: usize },
}

impl FrameDecodeError {
    /// Per §4.6 step 2: only `Oversize` is a policy violation severe enough
    /// to close the connection outright; the others are tolerated.
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, FrameDecodeError::Oversize { .. })
    }
}

/// Header/trailer block encode failures (§9: "do not guess" on embedded
/// newlines — reject at encode time instead).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderEncodeError {
    #[error("header value for {key:?} contains an embedded newline")]
    EmbeddedNewline { key: String },
}

/// Transport-level failures: socket closures, write failures, peer loss.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed")]
    Closed,

    #[error("send queue is gone; writer actor has exited")]
    WriterGone,
}

/// Stream-lifecycle failures that are not reified into a `Status` because
/// they close the whole connection rather than one stream (§7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamIdError {
    #[error("client stream id space exhausted")]
    Exhausted,
}
