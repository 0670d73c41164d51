//! Live sorted view running on its own worker.
//!
//! Three things can trigger a sort pass: upstream change-sets, comparer
//! changes and explicit re-sort requests. They arrive on separate channels
//! and are merged by one worker thread, which is the only place the sorter
//! is ever mutated.

use super::comparer::KeyValueComparer;
use super::sorter::{SortInput, SortedChangeSet, Sorter};
use crate::changes::ChangeSet;
use crate::config::SortConfig;
use crate::error::{CacheError, Result};
use crate::subscriptions::{
    CacheEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
use crate::types::{CacheKey, CacheValue};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

struct SortedShared<K, V> {
    sorter: Mutex<Sorter<K, V>>,
    subscribers: SubscriptionManager<SortedChangeSet<K, V>>,
}

/// Outcome of one wait on the merged inputs.
enum Step<K, V> {
    Input(SortInput<K, V>),
    Stop(DropReason),
}

/// Handle to a sorted view maintained on a worker thread.
///
/// Dropping the handle stops the worker and drops its subscribers.
pub struct SortedStream<K, V> {
    shared: Arc<SortedShared<K, V>>,
    comparer_tx: Option<Sender<KeyValueComparer<K, V>>>,
    resort_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<K: CacheKey, V: CacheValue> SortedStream<K, V> {
    /// Start sorting the change-sets delivered to `upstream`.
    pub fn spawn(
        upstream: SubscriptionHandle<ChangeSet<K, V>>,
        comparer: Option<KeyValueComparer<K, V>>,
        config: SortConfig,
    ) -> Self {
        let shared = Arc::new(SortedShared {
            sorter: Mutex::new(Sorter::new(comparer, config)),
            subscribers: SubscriptionManager::new(),
        });
        let (comparer_tx, comparer_rx) = unbounded();
        let (resort_tx, resort_rx) = unbounded();

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            run_sorter(worker_shared, upstream, comparer_rx, resort_rx);
        });

        Self {
            shared,
            comparer_tx: Some(comparer_tx),
            resort_tx: Some(resort_tx),
            worker: Some(worker),
        }
    }

    /// Subscribe to sorted change-sets. The current sorted state, if any, is
    /// delivered first.
    pub fn connect(&self, config: SubscriptionConfig) -> SubscriptionHandle<SortedChangeSet<K, V>> {
        // Publication happens under the sorter lock, so nothing can slip in
        // between the snapshot and the subscription.
        let sorter = self.shared.sorter.lock();
        let handle = self.shared.subscribers.subscribe(config);
        if let Some(snapshot) = sorter.snapshot() {
            if !snapshot.changes.is_empty() {
                self.shared.subscribers.send_to(
                    handle.id,
                    CacheEvent::Changes { changes: snapshot },
                );
            }
        }
        handle
    }

    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.unsubscribe(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.subscribers.subscription_count()
    }

    /// Swap the comparer; the worker reorders or rebuilds.
    ///
    /// Fails with [`CacheError::Disposed`] once the worker has stopped.
    pub fn change_comparer(&self, comparer: KeyValueComparer<K, V>) -> Result<()> {
        match &self.comparer_tx {
            Some(tx) => tx.send(comparer).map_err(|_| CacheError::Disposed),
            None => Err(CacheError::Disposed),
        }
    }

    /// Ask the worker to re-sort the held list, e.g. after values mutated in place.
    pub fn resort(&self) -> Result<()> {
        match &self.resort_tx {
            Some(tx) => tx.send(()).map_err(|_| CacheError::Disposed),
            None => Err(CacheError::Disposed),
        }
    }

    /// The most recently published sorted keys.
    pub fn sorted_keys(&self) -> Vec<K> {
        self.shared
            .sorter
            .lock()
            .sorted()
            .map(|sorted| sorted.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Stop the worker and wait for it to exit.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<K, V> Drop for SortedStream<K, V> {
    fn drop(&mut self) {
        // Closing the control channels wakes the worker.
        self.comparer_tx.take();
        self.resort_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_sorter<K: CacheKey, V: CacheValue>(
    shared: Arc<SortedShared<K, V>>,
    upstream: SubscriptionHandle<ChangeSet<K, V>>,
    comparer_rx: Receiver<KeyValueComparer<K, V>>,
    resort_rx: Receiver<()>,
) {
    let reason = loop {
        let step = select! {
            recv(upstream.receiver) -> msg => match msg {
                Ok(CacheEvent::Changes { changes }) => Step::Input(SortInput::Data(changes)),
                Ok(CacheEvent::Dropped { reason }) => Step::Stop(reason),
                Err(_) => Step::Stop(DropReason::Disconnected),
            },
            recv(comparer_rx) -> msg => match msg {
                Ok(comparer) => Step::Input(SortInput::Comparer(comparer)),
                Err(_) => Step::Stop(DropReason::Disconnected),
            },
            recv(resort_rx) -> msg => match msg {
                Ok(()) => Step::Input(SortInput::Resort),
                Err(_) => Step::Stop(DropReason::Disconnected),
            },
        };

        let input = match step {
            Step::Input(input) => input,
            Step::Stop(reason) => break reason,
        };

        let mut sorter = shared.sorter.lock();
        match sorter.sort(input) {
            Ok(Some(sorted)) => shared.subscribers.broadcast(&sorted),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "sort pass failed, stopping sorted stream");
                break DropReason::Error(e.to_string());
            }
        }
    };

    debug!(?reason, "sorted stream stopped");
    shared.subscribers.drop_all(reason);
}
