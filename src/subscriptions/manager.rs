//! Subscription manager for broadcasting change-sets.

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use super::types::{CacheEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId};

/// Internal subscription state.
struct Subscription<T> {
    sender: Sender<CacheEvent<T>>,
}

impl<T> Subscription<T> {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: CacheEvent<T>) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Manages subscriptions and fans change-sets out to them.
///
/// Sends never block: a subscriber whose buffer is full is dropped, so a
/// publisher may broadcast while holding its own write lock.
pub struct SubscriptionManager<T> {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription<T>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl<T> SubscriptionManager<T> {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle<T> {
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        self.register(sender, receiver)
    }

    /// Create a subscription that is never dropped for being slow.
    ///
    /// For in-process stages that must see every change-set.
    pub fn subscribe_unbounded(&self) -> SubscriptionHandle<T> {
        let (sender, receiver) = unbounded();
        self.register(sender, receiver)
    }

    fn register(
        &self,
        sender: Sender<CacheEvent<T>>,
        receiver: crossbeam_channel::Receiver<CacheEvent<T>>,
    ) -> SubscriptionHandle<T> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions
            .write()
            .insert(id, Subscription { sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        match subs.remove(&id) {
            Some(sub) => {
                // Send dropped event (best effort)
                let _ = sub.sender.try_send(CacheEvent::Dropped {
                    reason: DropReason::Unsubscribed,
                });
                true
            }
            None => false,
        }
    }

    /// Terminate one subscription with an error.
    pub fn fail(&self, id: SubscriptionId, message: impl Into<String>) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            let _ = sub.sender.try_send(CacheEvent::Dropped {
                reason: DropReason::Error(message.into()),
            });
        }
    }

    /// Drop every subscription, telling each why.
    pub fn drop_all(&self, reason: DropReason) {
        let mut subs = self.subscriptions.write();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.try_send(CacheEvent::Dropped {
                reason: reason.clone(),
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Send an event directly to a subscription (initial snapshots).
    /// Returns false if the subscription was dropped.
    pub fn send_to(&self, id: SubscriptionId, event: CacheEvent<T>) -> bool {
        let delivered = {
            let subs = self.subscriptions.read();
            match subs.get(&id) {
                Some(sub) => sub.try_send(event),
                None => return false,
            }
        };

        if !delivered {
            self.drop_overflowed(vec![id]);
        }
        delivered
    }

    fn drop_overflowed(&self, ids: Vec<SubscriptionId>) {
        let mut subs = self.subscriptions.write();
        for id in ids {
            if let Some(sub) = subs.remove(&id) {
                warn!(subscription = id.0, "dropping slow subscriber");
                // Try to notify about the drop (might fail, that's ok)
                let _ = sub.sender.try_send(CacheEvent::Dropped {
                    reason: DropReason::BufferOverflow,
                });
            }
        }
    }
}

impl<T: Clone> SubscriptionManager<T> {
    /// Broadcast a change-set to every subscription. Drops subscribers that fail to receive.
    pub fn broadcast(&self, changes: &T) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                let event = CacheEvent::Changes {
                    changes: changes.clone(),
                };
                if !sub.try_send(event) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            self.drop_overflowed(to_remove);
        }
    }
}

impl<T> Default for SubscriptionManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
