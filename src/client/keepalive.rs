//! Client keepalive (§4.9): periodic `PING`, with a watchdog that treats
//! a missing `PONG` as a dead peer, closes the socket with WS code 4000,
//! and tears the connection down so the reconnect loop (§4.7) takes over.
//! Grounded on `connection.rs::spawn_ping_task`'s timer-driven
//! control-frame loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::frame::Frame;
use crate::writer::WriterHandle;

/// Spawn the keepalive task for one connection generation. Cancels `ct`
/// (tearing the connection down) if a `PONG` doesn't arrive within
/// `pong_timeout` of a `PING`, or if the `PING` itself fails to enqueue.
pub fn spawn(
    writer: WriterHandle,
    pong_notify: Arc<Notify>,
    ct: CancellationToken,
    ping_interval: Duration,
    pong_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = ct.cancelled() => break,
                () = tokio::time::sleep(ping_interval) => {
                    if writer.send(Frame::ping()).await.is_err() {
                        log::warn!("keepalive: failed to enqueue PING, connection is gone");
                        ct.cancel();
                        break;
                    }
                    let notified = pong_notify.notified();
                    tokio::pin!(notified);
                    if tokio::time::timeout(pong_timeout, notified).await.is_err() {
                        log::warn!("keepalive: no PONG within {pong_timeout:?}, treating peer as dead");
                        let _ = writer.close(4000, "no pong within timeout").await;
                        ct.cancel();
                        break;
                    }
                }
            }
        }
    })
}
