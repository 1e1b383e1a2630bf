//! The per-connection stream registry (C3, §3 invariants 1-2, §4.3, §9).
//! Grounded on `stream_coordinator.rs::StreamCoordinator`: a `DashMap`
//! keyed by stream id plus an atomic id counter, generalized from
//! HTTP/2's always-client-allocates model to this protocol's "client
//! allocates odd ids, server never allocates" rule.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StreamIdError;
use crate::frame::Frame;
use crate::stream_state::StreamState;

/// What the registry stores per stream: enough to route inbound frames to
/// the adapter that owns this id, plus liveness bookkeeping for the idle
/// sweeper (§4.6.7).
pub struct StreamEntry {
    pub state: StreamState,
    /// Inbound `DATA` payloads are pushed here by the connection loop and
    /// drained by the adapter's `recvMsg`/subscriber.
    pub inbound: mpsc::Sender<Frame>,
    /// Child of the connection's cancellation context (§5). Cancelled when
    /// `RST_STREAM` arrives for this id, so the adapter's in-flight
    /// `recvMsg` wakes up instead of hanging on a channel nothing will
    /// ever feed again.
    pub cancellation: CancellationToken,
    pub last_activity: std::time::Instant,
}

impl StreamEntry {
    #[must_use]
    pub fn new(inbound: mpsc::Sender<Frame>, cancellation: CancellationToken) -> Self {
        Self {
            state: StreamState::Idle,
            inbound,
            cancellation,
            last_activity: std::time::Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = std::time::Instant::now();
    }
}

/// Client-initiated ids are odd, starting at 1, incrementing by 2 (§6.1).
/// Server-initiated (even) ids are reserved but never allocated by this
/// registry (Non-goal, §1).
pub struct StreamRegistry {
    next_client_id: AtomicU32,
    streams: DashMap<u32, StreamEntry>,
    max_concurrent_streams: usize,
}

impl StreamRegistry {
    #[must_use]
    pub fn new(max_concurrent_streams: usize) -> Self {
        Self {
            next_client_id: AtomicU32::new(1),
            streams: DashMap::new(),
            max_concurrent_streams,
        }
    }

    /// Allocate the next odd client stream id. Errs on wraparound past
    /// `u32::MAX` (§3 invariant 1, §4.5 step 1).
    pub fn allocate_client_id(&self) -> Result<u32, StreamIdError> {
        loop {
            let current = self.next_client_id.load(Ordering::SeqCst);
            let next = current.checked_add(2).ok_or(StreamIdError::Exhausted)?;
            if self
                .next_client_id
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(current);
            }
        }
    }

    /// Current number of entries — must never exceed
    /// `max_concurrent_streams` (§3 invariant 2).
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.streams.len() >= self.max_concurrent_streams
    }

    /// Insert a new stream entry, enforcing the concurrency cap. Returns
    /// `false` (refuse) if already at capacity, without inserting.
    #[must_use]
    pub fn try_insert(&self, id: u32, entry: StreamEntry) -> bool {
        if self.is_at_capacity() {
            return false;
        }
        self.streams.insert(id, entry);
        true
    }

    /// Used by the client adapter, which allocates its own id and does not
    /// observe a server-side concurrency cap (the cap is server-only,
    /// §4.6 step 4).
    pub fn insert_unconditionally(&self, id: u32, entry: StreamEntry) {
        self.streams.insert(id, entry);
    }

    pub fn with_mut<T>(&self, id: u32, f: impl FnOnce(&mut StreamEntry) -> T) -> Option<T> {
        self.streams.get_mut(&id).map(|mut entry| f(&mut entry))
    }

    /// Remove the stream entry. Receipt of `RST_STREAM` or `TRAILERS`
    /// removes the stream from the registry immediately (§3 invariant 6).
    /// Returns `true` if a stream was actually present (the first call
    /// wins when `RST_STREAM` races with `TRAILERS`, §9).
    pub fn remove(&self, id: u32) -> bool {
        self.streams.remove(&id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.streams.contains_key(&id)
    }

    /// All currently registered stream ids, for shutdown/idle-sweep
    /// fan-out (§4.6 step 7, §4.8 step 2).
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        self.streams.iter().map(|entry| *entry.key()).collect()
    }

    pub fn ids_idle_since(&self, cutoff: std::time::Instant) -> Vec<u32> {
        self.streams
            .iter()
            .filter(|entry| entry.value().last_activity < cutoff)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn clear(&self) {
        self.streams.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_entry() -> StreamEntry {
        let (tx, _rx) = mpsc::channel(1);
        StreamEntry::new(tx, CancellationToken::new())
    }

    #[test]
    fn client_ids_are_strictly_increasing_and_odd() {
        let registry = StreamRegistry::new(100);
        let ids: Vec<u32> = (0..5).map(|_| registry.allocate_client_id().unwrap()).collect();
        assert_eq!(ids, vec![1, 3, 5, 7, 9]);
        assert!(ids.iter().all(|id| id % 2 == 1));
    }

    #[test]
    fn id_allocation_errors_on_wraparound() {
        let registry = StreamRegistry::new(100);
        registry.next_client_id.store(u32::MAX - 1, Ordering::SeqCst);
        assert!(registry.allocate_client_id().is_ok()); // allocates u32::MAX - 1
        assert_eq!(registry.allocate_client_id(), Err(StreamIdError::Exhausted));
    }

    #[test]
    fn registry_never_exceeds_concurrency_cap() {
        let registry = StreamRegistry::new(2);
        assert!(registry.try_insert(1, dummy_entry()));
        assert!(registry.try_insert(3, dummy_entry()));
        assert!(!registry.try_insert(5, dummy_entry()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_is_idempotent_first_writer_wins() {
        let registry = StreamRegistry::new(100);
        registry.try_insert(1, dummy_entry());
        assert!(registry.remove(1));
        assert!(!registry.remove(1)); // second removal (e.g. late RST_STREAM) is a no-op
    }

    #[test]
    fn ids_idle_since_filters_by_last_activity() {
        let registry = StreamRegistry::new(100);
        registry.try_insert(1, dummy_entry());
        let cutoff = std::time::Instant::now() + std::time::Duration::from_secs(1);
        let idle = registry.ids_idle_since(cutoff);
        assert_eq!(idle, vec![1]);
    }
}
