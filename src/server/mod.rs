//! The server endpoint (§4.4, §4.6, §4.8). `Server` owns the method
//! registry and configuration; `connection::run` drives one accepted
//! socket, and any number of connections can share one `Server`.

pub mod adapter;
pub mod connection;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, Stream};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::config::Config;
use crate::method::{Handler, MethodKind, MethodRegistry};
use crate::server::shutdown::ShutdownCoordinator;

/// Shared server state: the method registry services register against,
/// the configuration every connection inherits, and the coordinator that
/// makes §4.8's graceful shutdown reachable against live connections.
pub struct Server {
    methods: Arc<MethodRegistry>,
    config: Arc<Config>,
    coordinator: ShutdownCoordinator,
}

impl Server {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            methods: Arc::new(MethodRegistry::new()),
            config: Arc::new(config),
            coordinator: ShutdownCoordinator::new(),
        }
    }

    pub async fn register(&self, path: impl Into<String>, kind: MethodKind, handler: Arc<dyn Handler>) {
        self.methods.register(path, kind, handler).await;
    }

    pub async fn register_fn<F, Fut>(&self, path: impl Into<String>, kind: MethodKind, handler: F)
    where
        F: Fn(adapter::ServerStream) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.methods.register_fn(path, kind, handler).await;
    }

    /// Drive one accepted WebSocket connection to completion, tracked by
    /// the shutdown coordinator (§4.8 step 1: new upgrades are refused
    /// once shutdown has started). `Server` itself holds no per-connection
    /// state beyond the coordinator, so connections are otherwise fully
    /// independent (§3).
    pub async fn serve_connection<S>(&self, ws_stream: S)
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message> + Unpin + Send + 'static,
        <S as Sink<Message>>::Error: std::fmt::Debug,
    {
        if self.coordinator.token().is_cancelled() {
            log::warn!("refusing new connection: server is shutting down");
            return;
        }
        let methods = self.methods.clone();
        let config = self.config.clone();
        let shutdown_ct = self.coordinator.token();
        self.coordinator
            .tracker()
            .track_future(connection::run(ws_stream, methods, config, shutdown_ct))
            .await;
    }

    /// Refuse new connections, `RST_STREAM(NO_ERROR)` every active stream
    /// on every live connection, cancel their contexts, and wait up to
    /// `deadline` for the connection tasks to finish draining (§4.8).
    /// Takes `&self` (not `self`) since `Server` is normally shared behind
    /// an `Arc` across accept-loop tasks; `ShutdownCoordinator` is cheap to
    /// clone and owns the actual cancellation/tracker state.
    pub async fn shutdown(&self, deadline: Duration) {
        self.coordinator.clone().shutdown(deadline).await;
    }
}
