//! The client-side public entry point (§4.5, §4.7). Wraps the reconnect
//! loop in `connection.rs` and hands out `ClientStream`s against whatever
//! connection generation is currently live. Grounded on `client.rs`'s
//! top-level `Client::send_request` entry point, generalized from "open a
//! socket per request" to "open streams against one long-lived,
//! transparently-reconnecting socket".

use std::future::Future;
use std::sync::Arc;

use futures_util::{Sink, Stream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::client::adapter::ClientStream;
use crate::client::connection::{self, ConnectionState};
use crate::config::Config;
use crate::error::{StreamIdError, TransportError};
use crate::frame::{Flags, Frame};
use crate::metadata::{self, Metadata};
use crate::registry::StreamEntry;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no connection currently established")]
    NotConnected,
    #[error(transparent)]
    StreamId(#[from] StreamIdError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    HeaderEncode(#[from] crate::error::HeaderEncodeError),
}

pub struct Client {
    current: Arc<RwLock<Option<Arc<ConnectionState>>>>,
    config: Arc<Config>,
    shutdown_ct: CancellationToken,
    connection_task: tokio::task::JoinHandle<()>,
}

impl Client {
    /// Start the reconnect loop in the background. `connector` is called
    /// once per connection attempt (e.g. wrapping
    /// `tokio_tungstenite::connect_async`).
    pub fn connect<C, Fut, S>(connector: C, config: Config) -> Self
    where
        C: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, TransportError>> + Send + 'static,
        S: Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message> + Unpin + Send + 'static,
        <S as Sink<Message>>::Error: std::fmt::Debug,
    {
        let current = Arc::new(RwLock::new(None));
        let shutdown_ct = CancellationToken::new();
        let config = Arc::new(config);
        let task = tokio::spawn(connection::run(
            connector,
            config.clone(),
            current.clone(),
            shutdown_ct.clone(),
        ));
        Self {
            current,
            config,
            shutdown_ct,
            connection_task: task,
        }
    }

    /// Open a new stream against `path`, attaching `metadata` (and the
    /// configured bearer token, if any) to the initial `HEADERS` frame
    /// (§4.5 steps 1-3). Fails with `NotConnected` if no connection
    /// generation is currently live (mid-reconnect, §4.7); fails with
    /// `StreamId` and closes the connection with WS code 4000 if the
    /// client stream-id space is exhausted (§3 invariant 1, §4.5 step 1).
    pub async fn request(&self, path: &str, metadata: Metadata) -> Result<ClientStream, ClientError> {
        let state = self
            .current
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;

        let id = match state.registry.allocate_client_id() {
            Ok(id) => id,
            Err(err) => {
                let _ = state.writer.close(4000, "client stream id space exhausted").await;
                state.ct.cancel();
                return Err(err.into());
            }
        };
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let stream_ct = state.ct.child_token();
        state
            .registry
            .insert_unconditionally(id, StreamEntry::new(tx, stream_ct.clone()));

        let mut headers = Metadata::new();
        headers.insert(metadata::KEY_PATH, path);
        if let Some(token) = &self.config.auth_token {
            headers.insert(metadata::KEY_AUTHORIZATION, format!("Bearer {token}"));
        }
        headers.merge(metadata);
        state
            .writer
            .send(Frame::new(Flags::HEADERS, id, headers.encode()?))
            .await?;

        Ok(ClientStream::new(id, state.writer.clone(), rx, stream_ct, state.registry.clone()))
    }

    /// Cancel the reconnect loop and every in-flight stream, and wait for
    /// the connection task to notice (§4.8's client-side half).
    pub async fn shutdown(self) {
        self.shutdown_ct.cancel();
        let _ = self.connection_task.await;
    }
}
