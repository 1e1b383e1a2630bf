//! Canonical gRPC status codes and the `RST_STREAM` error-code set (§6.1).

use num_derive::{FromPrimitive, ToPrimitive};

/// The canonical gRPC status code set, carried by `TRAILERS` as
/// `grpc-status: <code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Code::Ok)
    }
}

impl Default for Code {
    fn default() -> Self {
        Code::Ok
    }
}

/// The 4-byte big-endian `RST_STREAM` payload code set (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ResetCode {
    NoError = 0,
    ProtocolError = 1,
    InternalError = 2,
    FlowControlError = 3,
    StreamClosed = 4,
    FrameSizeError = 5,
    RefusedStream = 6,
    Cancel = 7,
    ResourceExhausted = 8,
    Unavailable = 9,
}

impl ResetCode {
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 4] {
        use num_traits::ToPrimitive;
        self.to_u32().expect("ResetCode is repr(u32)").to_be_bytes()
    }

    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 4]) -> Option<Self> {
        use num_traits::FromPrimitive;
        ResetCode::from_u32(u32::from_be_bytes(bytes))
    }
}

/// A terminal gRPC status: the pair carried by `TRAILERS` or synthesized
/// locally when a stream is reset or the connection is lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
        }
    }

    #[must_use]
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(Code::Cancelled, "cancelled by caller")
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::{FromPrimitive, ToPrimitive};

    #[test]
    fn reset_code_round_trips_through_wire_bytes() {
        for code in [
            ResetCode::NoError,
            ResetCode::ProtocolError,
            ResetCode::Cancel,
            ResetCode::ResourceExhausted,
            ResetCode::Unavailable,
        ] {
            let bytes = code.to_be_bytes();
            assert_eq!(ResetCode::from_be_bytes(bytes), Some(code));
        }
    }

    #[test]
    fn unknown_reset_code_byte_is_none() {
        assert_eq!(ResetCode::from_be_bytes(255u32.to_be_bytes()), None);
    }

    #[test]
    fn status_code_round_trips() {
        assert_eq!(Code::from_i32(Code::Unavailable.to_i32().unwrap()), Some(Code::Unavailable));
    }
}
