//! The server-side method registry (§6.2). Maps `/service/method` to a
//! handler descriptor, populated at startup by generated service
//! registration calls and stable for the lifetime of the server.
//! Read-mostly, guarded by a `RwLock` (§5), generalized from
//! `stream_coordinator.rs`'s map-guarding pattern (there: stream id ->
//! stream state; here: method path -> handler).

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::RwLock;

use crate::server::adapter::ServerStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidi,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The invocation thunk. A handler drives `sendMsg`/`recvMsg` on the
/// stream it owns and must call `stream.finish(status)` before returning
/// (§4.4's completion protocol). If it doesn't - including because it
/// panicked - `ServerStream`'s `Drop` impl sends a fallback `INTERNAL`
/// trailer, so a stream is never left without a terminal frame.
pub trait Handler: Send + Sync {
    fn kind(&self) -> MethodKind;
    fn invoke(&self, stream: ServerStream) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(ServerStream) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn kind(&self) -> MethodKind {
        MethodKind::Bidi
    }

    fn invoke(&self, stream: ServerStream) -> HandlerFuture {
        Box::pin(self(stream))
    }
}

/// A handler plus its declared kind, for registries that want to expose
/// `MethodKind` without relying on the blanket `Fn` impl's default.
pub struct MethodDescriptor {
    pub kind: MethodKind,
    pub handler: Arc<dyn Handler>,
}

#[derive(Default)]
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, MethodDescriptor>>,
}

impl MethodRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, path: impl Into<String>, kind: MethodKind, handler: Arc<dyn Handler>) {
        self.methods
            .write()
            .await
            .insert(path.into(), MethodDescriptor { kind, handler });
    }

    pub async fn register_fn<F, Fut>(&self, path: impl Into<String>, kind: MethodKind, handler: F)
    where
        F: Fn(ServerStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(path, kind, Arc::new(handler)).await;
    }

    /// Unknown method -> `RST_STREAM(REFUSED_STREAM)` at the call site
    /// (§4.4 dispatch rule); this just answers "do we have one".
    pub async fn lookup(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.methods.read().await.get(path).map(|d| d.handler.clone())
    }
}

/// Run one handler invocation to completion. Each handler runs in its own
/// task (§4.4 dispatch rule); this is the body of that task. A panic is
/// caught here purely for logging - the actual fallback trailer is sent by
/// `ServerStream::drop`, since the stream (and whatever partial state it
/// held) is gone by the time `catch_unwind` returns.
pub async fn dispatch(handler: Arc<dyn Handler>, stream: ServerStream) {
    if AssertUnwindSafe(handler.invoke(stream)).catch_unwind().await.is_err() {
        log::error!("handler panicked; stream closed via its drop safety net with INTERNAL");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    #[tokio::test]
    async fn lookup_finds_registered_method_by_exact_path() {
        let registry = MethodRegistry::new();
        registry
            .register_fn("/greeter.Greeter/SayHello", MethodKind::Unary, |mut stream| async move {
                stream.finish(Status::ok()).await;
            })
            .await;

        assert!(registry.lookup("/greeter.Greeter/SayHello").await.is_some());
        assert!(registry.lookup("/greeter.Greeter/Unknown").await.is_none());
    }
}
