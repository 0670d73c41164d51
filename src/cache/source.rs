//! The observable source cache.

use super::store::ChangeAwareCache;
use crate::changes::ChangeSet;
use crate::config::{CacheConfig, SortConfig};
use crate::error::{CacheError, Result};
use crate::eviction::{EvictionHandle, EvictionTarget, ExpiryTracker, SizeLimiter};
use crate::sorting::{KeyValueComparer, SortedStream};
use crate::subscriptions::{
    CacheEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
use crate::types::{CacheKey, CacheValue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Derives the key of a value.
pub type KeySelector<K, V> = Arc<dyn Fn(&V) -> K + Send + Sync>;

struct SourceInner<K, V> {
    /// Store plus its pending changes. Held for the whole of a batch,
    /// including its broadcast.
    cache: Mutex<ChangeAwareCache<K, V>>,
    subscribers: SubscriptionManager<ChangeSet<K, V>>,
    key_selector: KeySelector<K, V>,
    config: CacheConfig,
    disposed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> SourceInner<K, V> {
    fn check_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }

    /// Capture the batch and publish it. Caller holds the store lock.
    fn publish(&self, cache: &mut ChangeAwareCache<K, V>) -> ChangeSet<K, V> {
        let changes = cache.capture_changes();
        if !changes.is_empty() {
            trace!(
                changes = changes.len(),
                subscribers = self.subscribers.subscription_count(),
                "publishing change-set"
            );
            self.subscribers.broadcast(&changes);
        }
        changes
    }
}

impl<K: CacheKey, V: CacheValue> EvictionTarget<K, V> for SourceInner<K, V> {
    fn evict(&self, keys: &[K]) -> ChangeSet<K, V> {
        let mut cache = self.cache.lock();
        if self.check_live().is_err() {
            return ChangeSet::new();
        }
        for key in keys {
            cache.remove(key);
        }
        self.publish(&mut cache)
    }

    fn release(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id);
    }
}

impl<K, V> Drop for SourceInner<K, V> {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::Acquire) {
            self.subscribers.drop_all(DropReason::Disconnected);
        }
    }
}

/// A keyed, observable collection.
///
/// Every [`edit`](Self::edit) is one batch: its mutations are captured into
/// a single change-set and broadcast to all subscribers before the next
/// batch can start. Clones share the same store.
pub struct SourceCache<K, V> {
    inner: Arc<SourceInner<K, V>>,
}

impl<K: CacheKey, V: CacheValue> SourceCache<K, V> {
    pub fn new<F>(key_selector: F) -> Self
    where
        F: Fn(&V) -> K + Send + Sync + 'static,
    {
        Self::with_config(key_selector, CacheConfig::default())
    }

    pub fn with_config<F>(key_selector: F, config: CacheConfig) -> Self
    where
        F: Fn(&V) -> K + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SourceInner {
                cache: Mutex::new(ChangeAwareCache::new()),
                subscribers: SubscriptionManager::new(),
                key_selector: Arc::new(key_selector),
                config,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Run a batch of mutations and publish them as one change-set.
    pub fn edit<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut CacheUpdater<'_, K, V>) -> R,
    {
        // Checked under the lock so a concurrent dispose cannot slip in
        // between the check and the mutation.
        let mut cache = self.inner.cache.lock();
        self.inner.check_live()?;
        let result = {
            let mut updater = CacheUpdater {
                cache: &mut *cache,
                key_selector: &self.inner.key_selector,
            };
            f(&mut updater)
        };
        self.inner.publish(&mut cache);
        Ok(result)
    }

    pub fn add_or_update(&self, value: V) -> Result<()> {
        self.edit(|updater| updater.add_or_update(value))
    }

    pub fn add_or_update_many<I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
    {
        self.edit(|updater| {
            for value in values {
                updater.add_or_update(value);
            }
        })
    }

    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        self.edit(|updater| updater.remove(key))
    }

    pub fn remove_keys<'k, I>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = &'k K>,
    {
        self.edit(|updater| updater.remove_keys(keys))
    }

    pub fn refresh(&self, key: &K) -> Result<bool> {
        self.edit(|updater| updater.refresh(key))
    }

    pub fn refresh_all(&self) -> Result<()> {
        self.edit(|updater| updater.refresh_all())
    }

    pub fn clear(&self) -> Result<()> {
        self.edit(|updater| updater.clear())
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.inner.cache.lock().lookup(key).cloned()
    }

    pub fn count(&self) -> usize {
        self.inner.cache.lock().count()
    }

    pub fn key_values(&self) -> Vec<(K, V)> {
        self.inner.cache.lock().key_values()
    }

    pub fn items(&self) -> Vec<V> {
        self.inner
            .cache
            .lock()
            .iter()
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.cache.lock().keys().cloned().collect()
    }

    /// Subscribe to change-sets. The current contents arrive first, as one
    /// change-set of Adds, unless the cache is empty.
    pub fn connect(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle<ChangeSet<K, V>>> {
        self.attach(|subscribers| subscribers.subscribe(config))
    }

    /// Subscription for a stage owned by this crate. It is never dropped for
    /// falling behind, so the stage sees every change-set.
    fn connect_internal(&self) -> Result<SubscriptionHandle<ChangeSet<K, V>>> {
        self.attach(|subscribers| subscribers.subscribe_unbounded())
    }

    fn attach<F>(&self, subscribe: F) -> Result<SubscriptionHandle<ChangeSet<K, V>>>
    where
        F: FnOnce(&SubscriptionManager<ChangeSet<K, V>>) -> SubscriptionHandle<ChangeSet<K, V>>,
    {
        let cache = self.inner.cache.lock();
        self.inner.check_live()?;
        let handle = subscribe(&self.inner.subscribers);
        if !cache.is_empty() {
            self.inner.subscribers.send_to(
                handle.id,
                CacheEvent::Changes {
                    changes: cache.as_initial_changes(),
                },
            );
        }
        Ok(handle)
    }

    /// [`connect`](Self::connect) with the configured subscription defaults.
    pub fn subscribe(&self) -> Result<SubscriptionHandle<ChangeSet<K, V>>> {
        self.connect(self.inner.config.subscription.clone())
    }

    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscribers.subscription_count()
    }

    /// Keep at most `limit` entries, evicting the least recently written.
    pub fn limit_size(&self, limit: usize) -> Result<EvictionHandle<K, V>> {
        let policy = SizeLimiter::new(limit)?;
        debug!(limit, "starting size limiter");
        self.spawn_eviction(policy, None)
    }

    /// Remove entries once the time-to-live chosen by `selector` elapses.
    ///
    /// With a `poll_interval` the worker checks on a fixed tick; without one
    /// it wakes at the earliest pending deadline.
    pub fn expire_after<F>(&self, selector: F, poll_interval: Option<Duration>) -> Result<EvictionHandle<K, V>>
    where
        F: Fn(&V) -> Option<Duration> + Send + Sync + 'static,
    {
        if poll_interval == Some(Duration::ZERO) {
            return Err(CacheError::InvalidArgument(
                "poll interval must be greater than zero".into(),
            ));
        }
        debug!(?poll_interval, "starting expiry tracker");
        self.spawn_eviction(ExpiryTracker::new(selector), poll_interval)
    }

    /// A live sorted view using the configured sort settings.
    pub fn sort(&self, comparer: KeyValueComparer<K, V>) -> Result<SortedStream<K, V>> {
        self.sort_with(Some(comparer), self.inner.config.sort.clone())
    }

    /// A live sorted view. Without a comparer the view buffers data until
    /// one is supplied through [`SortedStream::change_comparer`].
    pub fn sort_with(
        &self,
        comparer: Option<KeyValueComparer<K, V>>,
        config: SortConfig,
    ) -> Result<SortedStream<K, V>> {
        let upstream = self.connect_internal()?;
        Ok(SortedStream::spawn(upstream, comparer, config))
    }

    /// Stop publishing. Subscribers receive `Dropped { Disconnected }` and
    /// further edits fail with [`CacheError::Disposed`].
    pub fn dispose(&self) {
        let _cache = self.inner.cache.lock();
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            debug!("source cache disposed");
            self.inner.subscribers.drop_all(DropReason::Disconnected);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    fn spawn_eviction<P>(&self, policy: P, poll_interval: Option<Duration>) -> Result<EvictionHandle<K, V>>
    where
        P: crate::eviction::EvictionPolicy<K, V>,
    {
        let upstream = self.connect_internal()?;
        Ok(EvictionHandle::spawn(
            Arc::downgrade(&self.inner),
            upstream,
            policy,
            poll_interval,
            self.inner.config.subscription.buffer_size,
        ))
    }
}

impl<K, V> Clone for SourceCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Mutation surface of one [`SourceCache::edit`] batch.
pub struct CacheUpdater<'a, K, V> {
    cache: &'a mut ChangeAwareCache<K, V>,
    key_selector: &'a KeySelector<K, V>,
}

impl<K: CacheKey, V: CacheValue> CacheUpdater<'_, K, V> {
    /// Insert or replace, keyed by the cache's key selector.
    pub fn add_or_update(&mut self, value: V) {
        let key = (self.key_selector)(&value);
        self.cache.add_or_update(key, value);
    }

    pub fn add_or_update_with_key(&mut self, key: K, value: V) {
        self.cache.add_or_update(key, value);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.cache.remove(key)
    }

    pub fn remove_keys<'k, I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = &'k K>,
        K: 'k,
    {
        for key in keys {
            self.cache.remove(key);
        }
    }

    pub fn refresh(&mut self, key: &K) -> bool {
        self.cache.refresh(key)
    }

    pub fn refresh_all(&mut self) {
        self.cache.refresh_all();
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.cache.lookup(key)
    }

    pub fn count(&self) -> usize {
        self.cache.count()
    }
}
