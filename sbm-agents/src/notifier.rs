//! Best-effort fan-out of slot boundaries.
//!
//! One upstream source (the block-to-slot mapper) feeds an arbitrary number
//! of dynamically registered subscribers. Delivery is strictly increasing
//! and non-blocking: a subscriber whose queue is full silently misses that
//! notification and is expected to track only the latest slot it needs.

use sbm_core::models::{Map, ParticipantId, Slot};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

type Registry = Arc<Mutex<Map<ParticipantId, mpsc::Sender<Slot>>>>;

/// Registration handle, cheap to clone and hand to every agent.
#[derive(Clone)]
pub struct NotifierHandle {
    registry: Registry,
}

impl NotifierHandle {
    /// Register a subscriber queue under `id`.
    ///
    /// Returns `false` if `id` has registered before; the existing
    /// registration is left untouched.
    pub fn register(&self, id: ParticipantId, queue: mpsc::Sender<Slot>) -> bool {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        if registry.contains_key(&id) {
            return false;
        }
        registry.insert(id, queue);
        true
    }
}

/// The fan-out loop.
pub struct SlotNotifier {
    source: mpsc::Receiver<Slot>,
    registry: Registry,
    last_delivered: Option<Slot>,
}

impl SlotNotifier {
    /// Create a notifier reading from `source`, along with its registration
    /// handle.
    pub fn new(source: mpsc::Receiver<Slot>) -> (Self, NotifierHandle) {
        let registry: Registry = Arc::default();
        let handle = NotifierHandle {
            registry: registry.clone(),
        };
        (
            Self {
                source,
                registry,
                last_delivered: None,
            },
            handle,
        )
    }

    /// Run the delivery loop until cancellation or source exhaustion.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let slot = tokio::select! {
                _ = cancel.cancelled() => break,
                slot = self.source.recv() => match slot {
                    Some(slot) => slot,
                    None => break,
                },
            };

            // Duplicate or out-of-order source values are dropped silently.
            if self.last_delivered.is_some_and(|last| slot <= last) {
                trace!(slot = %slot, "ignoring non-increasing slot");
                continue;
            }
            self.last_delivered = Some(slot);

            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.retain(|id, queue| match queue.try_send(slot) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(participant = %id, slot = %slot, "subscriber queue full, dropping notification");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(participant = %id, "subscriber hung up, dropping registration");
                    false
                }
            });
        }
        debug!("slot notifier stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_refused() {
        let (_tx, rx) = mpsc::channel(1);
        let (_notifier, handle) = SlotNotifier::new(rx);

        let id = ParticipantId::random();
        let (queue, _keep) = mpsc::channel(1);
        assert!(handle.register(id, queue));
        let (queue, _keep) = mpsc::channel(1);
        assert!(!handle.register(id, queue));
    }

    #[tokio::test]
    async fn full_subscriber_misses_but_catches_the_next_slot() {
        let (tx, rx) = mpsc::channel(8);
        let (notifier, handle) = SlotNotifier::new(rx);

        let (queue, mut sub) = mpsc::channel(1);
        assert!(handle.register(ParticipantId::random(), queue));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(notifier.run(cancel.clone()));

        // The queue has capacity 1: the first slot fills it, the second is
        // dropped without blocking the notifier, the third lands once the
        // subscriber drains.
        tx.send(Slot(0)).await.unwrap();
        tx.send(Slot(1)).await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(sub.recv().await, Some(Slot(0)));
        tx.send(Slot(2)).await.unwrap();
        assert_eq!(sub.recv().await, Some(Slot(2)));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_subscribers_are_dropped_from_the_registry() {
        let (tx, rx) = mpsc::channel(8);
        let (notifier, handle) = SlotNotifier::new(rx);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(notifier.run(cancel.clone()));

        let id = ParticipantId::random();
        let (queue, sub) = mpsc::channel(1);
        assert!(handle.register(id, queue));
        drop(sub);

        // Delivering to the hung-up subscriber removes its registration.
        tx.send(Slot(0)).await.unwrap();
        tokio::task::yield_now().await;

        let (queue, mut sub) = mpsc::channel(1);
        assert!(handle.register(id, queue));
        tx.send(Slot(1)).await.unwrap();
        assert_eq!(sub.recv().await, Some(Slot(1)));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn non_increasing_slots_are_dropped() {
        let (tx, rx) = mpsc::channel(8);
        let (notifier, handle) = SlotNotifier::new(rx);

        let (queue, mut sub) = mpsc::channel(8);
        assert!(handle.register(ParticipantId::random(), queue));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(notifier.run(cancel.clone()));

        for slot in [3u64, 3, 1, 4] {
            tx.send(Slot(slot)).await.unwrap();
        }
        assert_eq!(sub.recv().await, Some(Slot(3)));
        assert_eq!(sub.recv().await, Some(Slot(4)));

        cancel.cancel();
        task.await.unwrap();
    }
}
