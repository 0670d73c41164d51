//! Subscription types for live change-set streams.

use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    1000
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

/// Events delivered to a subscriber.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent<T> {
    /// The next change-set of the stream.
    Changes { changes: T },

    /// Subscription was dropped. No further events follow.
    Dropped { reason: DropReason },
}

impl<T> CacheEvent<T> {
    /// The carried change-set, if this is not a drop notification.
    pub fn into_changes(self) -> Option<T> {
        match self {
            CacheEvent::Changes { changes } => Some(changes),
            CacheEvent::Dropped { .. } => None,
        }
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// The publishing side went away.
    Disconnected,
    /// Processing failed.
    Error(String),
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// Handle to receive a subscription's events.
pub struct SubscriptionHandle<T> {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<CacheEvent<T>>,
}

impl<T> SubscriptionHandle<T> {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<CacheEvent<T>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<CacheEvent<T>, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive the next change-set, treating a drop notice or a closed
    /// channel as an error.
    pub fn recv_changes(&self) -> crate::error::Result<T> {
        match self.receiver.recv() {
            Ok(CacheEvent::Changes { changes }) => Ok(changes),
            Ok(CacheEvent::Dropped { .. }) | Err(_) => Err(crate::error::CacheError::SubscriptionDropped),
        }
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<CacheEvent<T>, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
