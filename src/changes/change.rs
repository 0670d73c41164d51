//! A single recorded edit.

use serde::{Deserialize, Serialize};

/// Why a change was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// A new key entered the collection.
    Add,
    /// The value under an existing key was replaced.
    Update,
    /// A key left the collection.
    Remove,
    /// The value is unchanged identity-wise but dependents must re-derive.
    Refresh,
    /// Position changed without a value change.
    Moved,
}

/// One atomic edit against a keyed collection.
///
/// Index fields are only populated by order-aware projections; the raw
/// store never assigns them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change<K, V> {
    pub reason: ChangeReason,
    pub key: K,
    pub current: V,
    /// Replaced value (Update only).
    pub previous: Option<V>,
    pub current_index: Option<usize>,
    pub previous_index: Option<usize>,
}

impl<K, V> Change<K, V> {
    fn with_reason(reason: ChangeReason, key: K, current: V) -> Self {
        Self {
            reason,
            key,
            current,
            previous: None,
            current_index: None,
            previous_index: None,
        }
    }

    pub fn add(key: K, current: V) -> Self {
        Self::with_reason(ChangeReason::Add, key, current)
    }

    pub fn update(key: K, current: V, previous: V) -> Self {
        Self {
            previous: Some(previous),
            ..Self::with_reason(ChangeReason::Update, key, current)
        }
    }

    pub fn remove(key: K, current: V) -> Self {
        Self::with_reason(ChangeReason::Remove, key, current)
    }

    pub fn refresh(key: K, current: V) -> Self {
        Self::with_reason(ChangeReason::Refresh, key, current)
    }

    /// A positional move from `previous_index` to `current_index`.
    pub fn moved(key: K, current: V, current_index: usize, previous_index: usize) -> Self {
        Self {
            current_index: Some(current_index),
            previous_index: Some(previous_index),
            ..Self::with_reason(ChangeReason::Moved, key, current)
        }
    }

    /// Attach the resulting position.
    pub fn at(mut self, index: usize) -> Self {
        self.current_index = Some(index);
        self
    }

    /// Attach the position the entry occupied before this change.
    pub fn from_index(mut self, index: usize) -> Self {
        self.previous_index = Some(index);
        self
    }

    /// Same change with positional metadata stripped.
    pub fn unindexed(mut self) -> Self {
        self.current_index = None;
        self.previous_index = None;
        self
    }
}
