#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

//! A core transport engine that tunnels gRPC call semantics (unary,
//! server-streaming, client-streaming, bidi, metadata, cancellation,
//! status codes) over a single multiplexed WebSocket connection.
//!
//! The wire format, stream lifecycle, and connection management live
//! here; the specific RPC surface (which methods exist, how their
//! payloads are shaped) is supplied by callers through [`marshal::Marshal`]
//! / [`marshal::Unmarshal`] and the [`method::MethodRegistry`].

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod idle;
pub mod marshal;
pub mod metadata;
pub mod method;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod stream_state;
pub mod transport;
pub mod writer;

pub use bytes::Bytes;
pub use client::{Client, ClientError, ClientStream};
pub use config::Config;
pub use frame::{Flags, Frame};
pub use metadata::Metadata;
pub use method::{Handler, MethodKind, MethodRegistry};
pub use server::adapter::ServerStream;
pub use server::Server;
pub use status::{Code, ResetCode, Status};
