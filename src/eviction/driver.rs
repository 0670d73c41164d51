//! Worker that applies an eviction policy to a live source.

use super::size::SizeLimiter;
use super::time::ExpiryTracker;
use crate::changes::ChangeSet;
use crate::subscriptions::{CacheEvent, DropReason, SubscriptionHandle, SubscriptionId};
use crate::types::{CacheKey, CacheValue, Timestamp};
use crossbeam_channel::{after, bounded, never, select, tick, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Decides which keys to remove from a source.
pub trait EvictionPolicy<K, V>: Send + 'static {
    /// Feed an upstream change-set; returns keys to evict now.
    fn observe(&mut self, changes: &ChangeSet<K, V>, now: Timestamp) -> Vec<K>;

    /// Called when the timer fires; returns keys to evict now.
    fn poll(&mut self, _now: Timestamp) -> Vec<K> {
        Vec::new()
    }

    /// When the policy next needs to be polled, if ever.
    fn next_deadline(&self) -> Option<Timestamp> {
        None
    }
}

impl<K: CacheKey, V: CacheValue> EvictionPolicy<K, V> for SizeLimiter<K, V> {
    fn observe(&mut self, changes: &ChangeSet<K, V>, now: Timestamp) -> Vec<K> {
        self.change(changes, now).into_iter().map(|item| item.key).collect()
    }
}

impl<K: CacheKey, V: CacheValue> EvictionPolicy<K, V> for ExpiryTracker<K, V> {
    fn observe(&mut self, changes: &ChangeSet<K, V>, now: Timestamp) -> Vec<K> {
        self.change(changes, now);
        self.poll(now)
    }

    fn poll(&mut self, now: Timestamp) -> Vec<K> {
        self.expired(now).into_iter().map(|item| item.key).collect()
    }

    fn next_deadline(&self) -> Option<Timestamp> {
        self.next_expiry()
    }
}

/// The store an eviction worker removes from.
pub(crate) trait EvictionTarget<K, V>: Send + Sync + 'static {
    /// Remove the keys in one batch and return the published change-set.
    fn evict(&self, keys: &[K]) -> ChangeSet<K, V>;

    /// Drop the worker's upstream subscription.
    fn release(&self, id: SubscriptionId);
}

/// Handle to a running eviction worker.
///
/// Removal change-sets are delivered on the handle; a worker failure arrives
/// as [`CacheEvent::Dropped`], displacing the oldest unread notice if the
/// buffer is full. Dropping the handle stops the worker.
pub struct EvictionHandle<K, V> {
    events: Receiver<CacheEvent<ChangeSet<K, V>>>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<K: CacheKey, V: CacheValue> EvictionHandle<K, V> {
    pub(crate) fn spawn<T, P>(
        target: Weak<T>,
        upstream: SubscriptionHandle<ChangeSet<K, V>>,
        policy: P,
        poll_interval: Option<Duration>,
        buffer_size: usize,
    ) -> Self
    where
        T: EvictionTarget<K, V>,
        P: EvictionPolicy<K, V>,
    {
        let (events_tx, events) = bounded(buffer_size.max(1));
        let backlog = events.clone();
        let (stop, stop_rx) = bounded(0);
        let worker = thread::spawn(move || {
            let outlet = Outlet { events: events_tx, backlog };
            run_eviction(target, upstream, policy, poll_interval, outlet, stop_rx);
        });

        Self {
            events,
            stop: Some(stop),
            worker: Some(worker),
        }
    }

    pub fn recv(&self) -> Result<CacheEvent<ChangeSet<K, V>>, crossbeam_channel::RecvError> {
        self.events.recv()
    }

    pub fn try_recv(&self) -> Result<CacheEvent<ChangeSet<K, V>>, TryRecvError> {
        self.events.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<CacheEvent<ChangeSet<K, V>>, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Stop the worker and wait for it to exit.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<K, V> Drop for EvictionHandle<K, V> {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The worker's side of the handle's buffer.
struct Outlet<T> {
    events: Sender<CacheEvent<T>>,
    /// Lets the worker discard unread notices to make room for its last one.
    backlog: Receiver<CacheEvent<T>>,
}

impl<T> Outlet<T> {
    /// Deliver the final event, discarding the oldest unread notices while
    /// the buffer is full.
    fn close_with(&self, mut event: CacheEvent<T>) {
        loop {
            match self.events.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    event = rejected;
                    let _ = self.backlog.try_recv();
                }
            }
        }
    }
}

enum Step<K, V> {
    Observe(ChangeSet<K, V>),
    Poll,
    Stop(Option<DropReason>),
}

fn run_eviction<K, V, T, P>(
    target: Weak<T>,
    upstream: SubscriptionHandle<ChangeSet<K, V>>,
    mut policy: P,
    poll_interval: Option<Duration>,
    outlet: Outlet<ChangeSet<K, V>>,
    stop: Receiver<()>,
) where
    K: CacheKey,
    V: CacheValue,
    T: EvictionTarget<K, V>,
    P: EvictionPolicy<K, V>,
{
    let ticker = poll_interval.map(tick);

    let failure = loop {
        // Without a fixed interval, sleep until the policy's next deadline.
        let timer = match &ticker {
            Some(ticker) => ticker.clone(),
            None => match policy.next_deadline() {
                Some(deadline) => after(Timestamp::now().until(deadline)),
                None => never(),
            },
        };

        let step = select! {
            recv(stop) -> _ => Step::Stop(None),
            recv(upstream.receiver) -> msg => match msg {
                Ok(CacheEvent::Changes { changes }) => Step::Observe(changes),
                Ok(CacheEvent::Dropped { reason }) => Step::Stop(Some(reason)),
                Err(_) => Step::Stop(Some(DropReason::Disconnected)),
            },
            recv(timer) -> _ => Step::Poll,
        };

        let now = Timestamp::now();
        let keys = match step {
            Step::Observe(changes) => policy.observe(&changes, now),
            Step::Poll => policy.poll(now),
            Step::Stop(reason) => break reason,
        };
        if keys.is_empty() {
            continue;
        }

        let Some(source) = target.upgrade() else {
            break Some(DropReason::Error("source cache was disposed".into()));
        };
        let removed = source.evict(&keys);
        debug!(requested = keys.len(), evicted = removed.len(), "evicted entries");
        if removed.is_empty() {
            continue;
        }
        match outlet.events.try_send(CacheEvent::Changes { changes: removed }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("eviction handle buffer full, dropping notification"),
            Err(TrySendError::Disconnected(_)) => break None,
        }
    };

    if let Some(reason) = failure {
        warn!(?reason, "eviction worker stopped");
        outlet.close_with(CacheEvent::Dropped { reason });
    }
    if let Some(source) = target.upgrade() {
        source.release(upstream.id);
    }
}
