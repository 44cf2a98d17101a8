//! Slot registry - per-key bounded queues of handshake payloads.
//!
//! Maps rendezvous keys to slots. A slot is a bounded mpsc channel whose
//! receiving half sits behind an async mutex, so any number of pullers can
//! wait on one key while each payload still reaches exactly one of them.

use crate::domain::error::{SignalingError, SignalingResult};
use crate::domain::types::{HandshakePayload, RendezvousKey};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Per-key bounded queue
pub struct Slot {
    sender: mpsc::Sender<HandshakePayload>,
    receiver: Mutex<mpsc::Receiver<HandshakePayload>>,
    /// Requests currently holding this slot
    leases: AtomicUsize,
    last_active: SyncMutex<Instant>,
}

impl Slot {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            leases: AtomicUsize::new(0),
            last_active: SyncMutex::new(Instant::now()),
        }
    }

    /// Number of payloads waiting to be pulled
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Number of requests currently holding this slot
    pub fn leases(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }

    fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    /// Only called under the map shard lock, which excludes new leases.
    fn is_evictable(&self, now: Instant, idle_ttl: Duration) -> bool {
        self.leases() == 0
            && self.pending() == 0
            && now.saturating_duration_since(*self.last_active.lock()) >= idle_ttl
    }
}

/// A request's hold on a slot. While any lease exists the slot is not evicted.
pub struct SlotLease {
    slot: Arc<Slot>,
}

impl Deref for SlotLease {
    type Target = Slot;

    fn deref(&self) -> &Slot {
        &self.slot
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        // Touch before release so a sweep never sees zero leases with a stale timestamp
        self.slot.touch();
        self.slot.leases.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Registry statistics
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Slots created
    pub slots_created: AtomicU64,
    /// Slots removed by eviction
    pub slots_evicted: AtomicU64,
    /// Payloads enqueued
    pub published: AtomicU64,
    /// Payloads handed to a puller
    pub delivered: AtomicU64,
    /// Pulls that hit their deadline
    pub pull_timeouts: AtomicU64,
    /// Pushes rejected because the slot stayed full
    pub push_rejections: AtomicU64,
}

impl RegistryStats {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "slots_created": self.slots_created.load(Ordering::Relaxed),
            "slots_evicted": self.slots_evicted.load(Ordering::Relaxed),
            "published": self.published.load(Ordering::Relaxed),
            "delivered": self.delivered.load(Ordering::Relaxed),
            "pull_timeouts": self.pull_timeouts.load(Ordering::Relaxed),
            "push_rejections": self.push_rejections.load(Ordering::Relaxed),
        })
    }
}

/// Registry of rendezvous slots.
///
/// Flow:
/// 1. Push handler calls `publish()`; the payload lands in the key's slot
/// 2. Pull handler calls `subscribe()` and waits for the next payload or its deadline
/// 3. `eviction_task` drops slots that stayed empty and unused for the idle TTL
pub struct SlotRegistry {
    slots: DashMap<RendezvousKey, Arc<Slot>>,
    capacity: usize,
    stats: RegistryStats,
}

impl SlotRegistry {
    /// Create a registry whose slots hold up to `capacity` pending payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            capacity,
            stats: RegistryStats::default(),
        }
    }

    /// Get or create the slot for `key` and take a lease on it.
    ///
    /// Creation and the lease happen under the same shard lock, so concurrent
    /// first accesses share one slot and a sweep cannot remove it in between.
    pub fn acquire(&self, key: &RendezvousKey) -> SlotLease {
        let mut created = false;
        let entry = self.slots.entry(key.clone()).or_insert_with(|| {
            created = true;
            Arc::new(Slot::new(self.capacity))
        });
        entry.leases.fetch_add(1, Ordering::AcqRel);
        let slot = Arc::clone(entry.value());
        drop(entry);

        if created {
            self.stats.slots_created.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, capacity = self.capacity, "Created slot");
        }

        SlotLease { slot }
    }

    /// Enqueue `payload`, waiting at most `wait` for space in a full slot.
    pub async fn publish(
        &self,
        key: &RendezvousKey,
        payload: HandshakePayload,
        wait: Duration,
    ) -> SignalingResult<()> {
        let slot = self.acquire(key);

        let result = match slot.sender.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(payload)) => {
                warn!(key = %key, capacity = slot.capacity(), "Slot full, push waiting for space");
                slot.sender.send_timeout(payload, wait).await
            }
            Err(TrySendError::Closed(payload)) => Err(SendTimeoutError::Closed(payload)),
        };

        match result {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, pending = slot.pending(), "Payload enqueued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.stats.push_rejections.fetch_add(1, Ordering::Relaxed);
                Err(SignalingError::SlotFull {
                    key: key.clone(),
                    capacity: slot.capacity(),
                })
            }
            Err(SendTimeoutError::Closed(_)) => Err(SignalingError::SlotClosed(key.clone())),
        }
    }

    /// Dequeue the next payload for `key`, waiting at most `wait`.
    ///
    /// Cancel-safe: dropping the returned future releases the wait and leaves
    /// any payload in the slot for the next puller.
    pub async fn subscribe(
        &self,
        key: &RendezvousKey,
        wait: Duration,
    ) -> SignalingResult<HandshakePayload> {
        let slot = self.acquire(key);

        let next = async {
            let mut receiver = slot.receiver.lock().await;
            receiver.recv().await
        };

        match tokio::time::timeout(wait, next).await {
            Ok(Some(payload)) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(payload)
            }
            Ok(None) => Err(SignalingError::SlotClosed(key.clone())),
            Err(_) => {
                self.stats.pull_timeouts.fetch_add(1, Ordering::Relaxed);
                Err(SignalingError::Timeout {
                    key: key.clone(),
                    waited: wait,
                })
            }
        }
    }

    /// Remove slots that are empty, unleased and idle for at least `idle_ttl`.
    ///
    /// Returns the number of slots removed.
    pub fn evict_idle(&self, idle_ttl: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.slots.retain(|key, slot| {
            if slot.is_evictable(now, idle_ttl) {
                debug!(key = %key, "Evicting idle slot");
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.stats
                .slots_evicted
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Number of live slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Pending payloads for `key`, `None` when no slot exists
    pub fn pending(&self, key: &RendezvousKey) -> Option<usize> {
        self.slots.get(key).map(|slot| slot.pending())
    }

    /// Per-slot capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

/// Background task that evicts idle slots every `interval`
pub async fn eviction_task(registry: Arc<SlotRegistry>, interval: Duration, idle_ttl: Duration) {
    let mut sweep = tokio::time::interval(interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep.tick().await;
        let removed = registry.evict_idle(idle_ttl);
        if removed > 0 {
            debug!(removed = removed, remaining = registry.slot_count(), "Evicted idle slots");
        }
    }
}
