//! The binary frame codec (C1, §4.1, §6.1).
//!
//! Wire layout, fixed: byte 0 flags, bytes 1-4 stream-id (big-endian),
//! bytes 5-8 length (big-endian), bytes 9.. payload.

use crate::error::FrameDecodeError;
use bitflags::bitflags;
use bytes::Bytes;

/// Header size in bytes: 1 (flags) + 4 (stream id) + 4 (length).
pub const HEADER_LEN: usize = 9;

/// Default maximum payload size (§6.3).
pub const DEFAULT_MAX_PAYLOAD: u32 = 4 * 1024 * 1024;

/// HEADERS payload soft cap mentioned in §6.1; not enforced by the codec
/// itself (it is not a wire invariant), only documented here for callers
/// that want to warn.
pub const RECOMMENDED_MAX_HEADERS_PAYLOAD: u32 = 16 * 1024;

bitflags! {
    /// One shared flag byte for every frame kind (§6.1). Unlike HTTP/2,
    /// this wire format multiplexes all frame kinds through a single flags
    /// byte rather than having per-frame-type flag enums.
    pub struct Flags: u8 {
        const HEADERS     = 0x01;
        const DATA        = 0x02;
        const TRAILERS    = 0x04;
        const RST_STREAM  = 0x08;
        const EOS         = 0x10;
        const PING        = 0x20;
        const PONG        = 0x40;
    }
}

/// Stream id 0 is reserved for connection-level control (PING/PONG).
pub const CONTROL_STREAM_ID: u32 = 0;

/// An immutable, decoded transport frame. Lives only between leaving the
/// codec and being handed to the registry or the writer actor (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: Flags,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    #[must_use]
    pub fn new(flags: Flags, stream_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            flags,
            stream_id,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn control(flags: Flags, payload: impl Into<Bytes>) -> Self {
        Self::new(flags, CONTROL_STREAM_ID, payload)
    }

    #[must_use]
    pub fn ping() -> Self {
        Self::control(Flags::PING, Bytes::new())
    }

    #[must_use]
    pub fn pong() -> Self {
        Self::control(Flags::PONG, Bytes::new())
    }

    #[must_use]
    pub fn rst_stream(stream_id: u32, code: crate::status::ResetCode) -> Self {
        Self::new(Flags::RST_STREAM, stream_id, code.to_be_bytes().to_vec())
    }

    /// Encode into a freshly allocated byte buffer: 9-byte header followed
    /// by the payload, exactly per §6.1.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.flags.bits());
        out.extend_from_slice(&self.stream_id.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a frame out of `bytes`, enforcing `declared_length <=
    /// max_payload` and `declared_length <= bytes.len() - HEADER_LEN`
    /// before any payload allocation (§4.1: "the decoder must not allocate
    /// before the size check passes").
    pub fn decode(bytes: &[u8], max_payload: u32) -> Result<Self, FrameDecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameDecodeError::TooSmall { len: bytes.len() });
        }

        let flags_byte = bytes[0];
        let stream_id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let declared_length = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

        if declared_length > max_payload {
            return Err(FrameDecodeError::Oversize {
                declared: declared_length,
                max: max_payload,
            });
        }

        let available = bytes.len() - HEADER_LEN;
        if declared_length as usize > available {
            return Err(FrameDecodeError::Truncated {
                declared: declared_length,
                available,
            });
        }

        let flags = Flags::from_bits_truncate(flags_byte);
        let payload = Bytes::copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + declared_length as usize]);

        Ok(Self {
            flags,
            stream_id,
            payload,
        })
    }
}
