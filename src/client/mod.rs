//! The client endpoint (§4.5, §4.7, §4.9).

pub mod adapter;
pub mod client;
pub mod connection;
pub mod keepalive;

pub use adapter::ClientStream;
pub use client::{Client, ClientError};
