//! The stream state machine shared by both endpoints (§4.3). Which side
//! originates a given transition differs; the states and the shape of the
//! graph do not.

/// `idle -> open -> half-closed(local|remote) -> closed`, with `RST_STREAM`
/// and non-zero-status `TRAILERS` as shortcuts to `Closed` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// Why a stream reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Ok,
    Error(crate::status::Status),
    Cancelled,
    Reset(crate::status::ResetCode),
}

impl StreamState {
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, StreamState::Closed)
    }

    /// Apply the effect of sending (`!recv`) or receiving (`recv`) EOS on
    /// this side of the stream. `HEADERS` (the first frame) opens the
    /// stream; `RST_STREAM` always terminates immediately; a `TRAILERS`
    /// frame is treated as carrying EOS from the server by the caller,
    /// same as plain `DATA|EOS`.
    #[must_use]
    pub fn on_headers(self) -> StreamState {
        match self {
            StreamState::Idle => StreamState::Open,
            other => other,
        }
    }

    #[must_use]
    pub fn on_eos(self, recv: bool) -> StreamState {
        match (self, recv) {
            (StreamState::Open, true) => StreamState::HalfClosedRemote,
            (StreamState::Open, false) => StreamState::HalfClosedLocal,
            (StreamState::HalfClosedLocal, true) => StreamState::Closed,
            (StreamState::HalfClosedRemote, false) => StreamState::Closed,
            // Simultaneous EOS from both sides observed one at a time:
            // the second call for the same stream closes it (§4.3 tie-break).
            (StreamState::HalfClosedLocal, false) => StreamState::HalfClosedLocal,
            (StreamState::HalfClosedRemote, true) => StreamState::HalfClosedRemote,
            (other, _) => other,
        }
    }

    #[must_use]
    pub fn on_reset(self) -> StreamState {
        StreamState::Closed
    }
}
