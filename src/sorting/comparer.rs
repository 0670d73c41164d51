//! Total order over key/value pairs.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied ordering over values.
pub type ValueComparer<V> = Arc<dyn Fn(&V, &V) -> Ordering + Send + Sync>;

/// Orders `(key, value)` pairs by value first, then by key.
///
/// The key tie-break makes entries with equal values distinguishable, so a
/// binary search for a present entry always lands on exactly that entry.
pub struct KeyValueComparer<K, V> {
    comparer: ValueComparer<V>,
    _key: std::marker::PhantomData<fn(&K)>,
}

impl<K: Ord, V> KeyValueComparer<K, V> {
    pub fn new(comparer: ValueComparer<V>) -> Self {
        Self {
            comparer,
            _key: std::marker::PhantomData,
        }
    }

    pub fn from_fn<F>(compare: F) -> Self
    where
        F: Fn(&V, &V) -> Ordering + Send + Sync + 'static,
    {
        Self::new(Arc::new(compare))
    }

    /// Ascending order on a projected sort key.
    pub fn ascending_by<T, F>(project: F) -> Self
    where
        T: Ord,
        F: Fn(&V) -> T + Send + Sync + 'static,
    {
        Self::from_fn(move |a, b| project(a).cmp(&project(b)))
    }

    /// Descending order on a projected sort key. Keys still tie-break ascending.
    pub fn descending_by<T, F>(project: F) -> Self
    where
        T: Ord,
        F: Fn(&V) -> T + Send + Sync + 'static,
    {
        Self::from_fn(move |a, b| project(b).cmp(&project(a)))
    }

    #[inline]
    pub fn compare(&self, a: (&K, &V), b: (&K, &V)) -> Ordering {
        (self.comparer)(a.1, b.1).then_with(|| a.0.cmp(b.0))
    }

    #[inline]
    pub fn compare_values(&self, a: &V, b: &V) -> Ordering {
        (self.comparer)(a, b)
    }

    /// Sort a list of pairs in place.
    pub fn sort(&self, items: &mut [(K, V)]) {
        items.sort_by(|a, b| self.compare((&a.0, &a.1), (&b.0, &b.1)));
    }

    /// Binary search for an entry in a list sorted by this comparer.
    pub fn search(&self, items: &[(K, V)], key: &K, value: &V) -> SearchResult {
        match items.binary_search_by(|(k, v)| self.compare((k, v), (key, value))) {
            Ok(index) => SearchResult::Found(index),
            Err(index) => SearchResult::InsertAt(index),
        }
    }

    /// First position whose entry orders after the target, scanning from the
    /// front. Works on lists that are not globally sorted.
    pub fn linear_insert_position(&self, items: &[(K, V)], key: &K, value: &V) -> usize {
        items
            .iter()
            .position(|(k, v)| self.compare((key, value), (k, v)) == Ordering::Less)
            .unwrap_or(items.len())
    }
}

impl<K, V> Clone for KeyValueComparer<K, V> {
    fn clone(&self) -> Self {
        Self {
            comparer: Arc::clone(&self.comparer),
            _key: std::marker::PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for KeyValueComparer<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyValueComparer")
    }
}

/// Outcome of a binary search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchResult {
    /// The entry occupies this position.
    Found(usize),
    /// The entry is absent and would be inserted here.
    InsertAt(usize),
}

impl SearchResult {
    pub fn index(self) -> usize {
        match self {
            SearchResult::Found(index) | SearchResult::InsertAt(index) => index,
        }
    }

    pub fn is_found(self) -> bool {
        matches!(self, SearchResult::Found(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_value() -> KeyValueComparer<&'static str, i32> {
        KeyValueComparer::ascending_by(|v: &i32| *v)
    }

    #[test]
    fn test_key_breaks_ties() {
        let comparer = by_value();
        assert_eq!(comparer.compare((&"a", &1), (&"b", &1)), Ordering::Less);
        assert_eq!(comparer.compare((&"b", &1), (&"a", &2)), Ordering::Less);
        assert_eq!(comparer.compare((&"a", &1), (&"a", &1)), Ordering::Equal);
    }

    #[test]
    fn test_search_found_and_insert() {
        let comparer = by_value();
        let items = vec![("a", 10), ("b", 20), ("c", 30)];

        assert_eq!(comparer.search(&items, &"b", &20), SearchResult::Found(1));
        assert_eq!(comparer.search(&items, &"d", &25), SearchResult::InsertAt(2));
        assert_eq!(comparer.search(&items, &"0", &10), SearchResult::InsertAt(0));
        assert_eq!(comparer.search(&items, &"z", &99), SearchResult::InsertAt(3));
    }

    #[test]
    fn test_linear_insert_position_on_unsorted_list() {
        let comparer = by_value();
        let items = vec![("a", 10), ("b", 50), ("c", 30)];
        assert_eq!(comparer.linear_insert_position(&items, &"d", &40), 1);
        assert_eq!(comparer.linear_insert_position(&items, &"e", &60), 3);
    }

    #[test]
    fn test_descending_by() {
        let comparer: KeyValueComparer<&str, i32> = KeyValueComparer::descending_by(|v: &i32| *v);
        let mut items = vec![("a", 1), ("b", 3), ("c", 2)];
        comparer.sort(&mut items);
        assert_eq!(items, vec![("b", 3), ("c", 2), ("a", 1)]);
    }
}
