//! `Frame::decode` must never panic or over-allocate relative to its
//! inputs, for any byte sequence (§4.1). This is the exhaustive
//! counterpart to `frame.rs`'s small hand-written sweep.
#![no_main]

use grpc_ws_transport::frame::{Frame, DEFAULT_MAX_PAYLOAD};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Frame::decode(data, DEFAULT_MAX_PAYLOAD);
});
