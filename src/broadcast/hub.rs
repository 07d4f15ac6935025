use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use tokio::sync::watch;
use uuid::Uuid;

use crate::telemetry::{LatestStateStore, TelemetrySnapshot};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub type SubscriberId = Uuid;

type SnapshotSender = watch::Sender<Arc<TelemetrySnapshot>>;

struct HubInner {
    store: Arc<LatestStateStore>,
    subscribers: Mutex<HashMap<SubscriberId, SnapshotSender>>,
}

impl HubInner {
    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriberId, SnapshotSender>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn remove(&self, id: &SubscriberId) -> bool {
        self.registry().remove(id).is_some()
    }
}

/// Fans the latest snapshot out to live observers.
///
/// Every subscriber owns a single-slot channel: publishing overwrites whatever the
/// subscriber has not read yet, so a slow reader only ever sees the newest snapshot
/// and can never hold up the publisher or the other subscribers.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new(store: Arc<LatestStateStore>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register an observer. Its first `recv` yields the store's current snapshot.
    /// Joining between a store update and its publish delivers that snapshot twice.
    pub fn subscribe(&self) -> Subscriber {
        let id = Uuid::new_v4();
        let receiver = {
            let mut registry = self.inner.registry();
            // Read under the registry lock so a concurrent publish cannot slip between
            // the read and the insert.
            let (sender, receiver) = watch::channel(self.inner.store.current());
            registry.insert(id, sender);
            receiver
        };

        log_info!("observer {} subscribed", id);

        Subscriber {
            id,
            receiver,
            delivered_initial: false,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `snapshot` to every registered subscriber. Subscribers whose receiving
    /// side is gone are pruned; the rest are unaffected. Returns how many were reached.
    pub fn publish(&self, snapshot: Arc<TelemetrySnapshot>) -> usize {
        let mut registry = self.inner.registry();
        registry.retain(|id, sender| match sender.send(Arc::clone(&snapshot)) {
            Ok(()) => true,
            Err(_) => {
                log_debug!("pruning observer {} after failed delivery", id);
                false
            }
        });
        registry.len()
    }

    /// Safe to call at any time, including for ids that are already gone.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            log_info!("observer {} unsubscribed", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry().len()
    }
}

/// A live observer. Dropping it unsubscribes.
pub struct Subscriber {
    id: SubscriberId,
    receiver: watch::Receiver<Arc<TelemetrySnapshot>>,
    delivered_initial: bool,
    hub: Weak<HubInner>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next snapshot. Returns `None` once the hub has dropped this
    /// subscriber.
    pub async fn recv(&mut self) -> Option<Arc<TelemetrySnapshot>> {
        if !self.delivered_initial {
            self.delivered_initial = true;
            return Some(Arc::clone(&self.receiver.borrow_and_update()));
        }

        self.receiver.changed().await.ok()?;
        Some(Arc::clone(&self.receiver.borrow_and_update()))
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(&self.id) {
                log_debug!("observer {} dropped", self.id);
            }
        }
    }
}
