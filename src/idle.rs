//! The idle-stream sweeper (§4.6 step 7). Grounded on
//! `stream_coordinator.rs`'s periodic cleanup pass, generalized from
//! "sweep dead HTTP/2 streams on connection teardown" to "sweep streams
//! that have seen no activity for `idle_timeout`, on every
//! `idle_check_interval` tick, while the connection is otherwise healthy".

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::registry::StreamRegistry;
use crate::status::ResetCode;
use crate::writer::WriterHandle;

/// Spawn the sweeper task. Runs until `connection_ct` is cancelled.
pub fn spawn(
    registry: Arc<StreamRegistry>,
    writer: WriterHandle,
    idle_timeout: Duration,
    idle_check_interval: Duration,
    connection_ct: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(idle_check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = connection_ct.cancelled() => break,
                _ = ticker.tick() => sweep(&registry, &writer, idle_timeout),
            }
        }
    })
}

fn sweep(registry: &StreamRegistry, writer: &WriterHandle, idle_timeout: Duration) {
    let cutoff = Instant::now() - idle_timeout;
    for id in registry.ids_idle_since(cutoff) {
        log::warn!("stream {id} idle past {idle_timeout:?}, resetting");
        if let Some(entry) = registry_take_cancellation(registry, id) {
            entry.cancel();
        }
        registry.remove(id);
        let _ = writer.try_send(crate::frame::Frame::rst_stream(id, ResetCode::Cancel));
    }
}

fn registry_take_cancellation(registry: &StreamRegistry, id: u32) -> Option<CancellationToken> {
    registry.with_mut(id, |entry| entry.cancellation.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamEntry;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn sweeper_resets_streams_idle_past_timeout() {
        let registry = Arc::new(StreamRegistry::new(10));
        let (tx, _rx) = mpsc::channel(1);
        registry.try_insert(1, StreamEntry::new(tx, CancellationToken::new()));

        let (writer_tx, mut writer_rx) = mpsc::channel(4);
        let writer = WriterHandle::for_test(writer_tx);
        let ct = CancellationToken::new();

        let handle = spawn(
            registry.clone(),
            writer,
            Duration::from_millis(50),
            Duration::from_millis(10),
            ct.clone(),
        );

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        let frame = writer_rx.recv().await.unwrap();
        assert!(frame.flags.contains(crate::frame::Flags::RST_STREAM));
        assert!(!registry.contains(1));

        ct.cancel();
        handle.await.unwrap();
    }
}
