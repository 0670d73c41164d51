//! Integration tests for the source cache and its derived views.

use livecache::{
    CacheEvent, ChangeReason, ChangeSet, FilteredSorter, GroupManager, KeyValueComparer,
    SortConfig, SortReason, SortedChangeSet, SourceCache, SubscriptionConfig, SubscriptionHandle,
};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq)]
struct Person {
    name: String,
    age: u32,
}

fn person(name: &str, age: u32) -> Person {
    Person {
        name: name.to_string(),
        age,
    }
}

fn people() -> SourceCache<String, Person> {
    SourceCache::new(|p: &Person| p.name.clone())
}

fn by_age() -> KeyValueComparer<String, Person> {
    KeyValueComparer::ascending_by(|p: &Person| p.age)
}

fn next<T>(handle: &SubscriptionHandle<T>) -> T {
    match handle.recv_timeout(TIMEOUT) {
        Ok(CacheEvent::Changes { changes }) => changes,
        Ok(CacheEvent::Dropped { reason }) => panic!("subscription dropped: {:?}", reason),
        Err(e) => panic!("no change-set received: {}", e),
    }
}

fn names(sorted: &SortedChangeSet<String, Person>) -> Vec<&str> {
    sorted.sorted_items.keys().map(String::as_str).collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// --- Sorted views ---

#[test]
fn test_sorted_view_follows_source() {
    init_tracing();
    let cache = people();
    let sorted = cache.sort(by_age()).unwrap();
    let handle = sorted.connect(SubscriptionConfig::default());

    cache
        .edit(|u| {
            u.add_or_update(person("A", 30));
            u.add_or_update(person("B", 20));
            u.add_or_update(person("C", 25));
        })
        .unwrap();

    let first = next(&handle);
    assert_eq!(first.sort_reason(), SortReason::InitialLoad);
    assert_eq!(names(&first), vec!["B", "C", "A"]);

    cache.add_or_update(person("A", 15)).unwrap();

    let second = next(&handle);
    assert_eq!(second.sort_reason(), SortReason::DataChanged);
    assert_eq!(second.changes.len(), 1);
    let update = &second.changes.as_slice()[0];
    assert_eq!(update.reason, ChangeReason::Update);
    assert_eq!(update.previous_index, Some(2));
    assert_eq!(update.current_index, Some(0));
    assert_eq!(names(&second), vec!["A", "B", "C"]);
}

#[test]
fn test_late_connector_receives_snapshot_first() {
    let cache = people();
    let sorted = cache.sort(by_age()).unwrap();
    let early = sorted.connect(SubscriptionConfig::default());

    cache
        .add_or_update_many([person("A", 3), person("B", 1), person("C", 2)])
        .unwrap();
    next(&early);

    let late = sorted.connect(SubscriptionConfig::default());
    let snapshot = next(&late);
    assert_eq!(snapshot.changes.adds(), 3);
    assert_eq!(names(&snapshot), vec!["B", "C", "A"]);
    let indices: Vec<_> = snapshot.changes.iter().map(|c| c.current_index).collect();
    assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);

    cache.remove(&"C".to_string()).unwrap();
    let removal = next(&late);
    assert_eq!(removal.changes.removes(), 1);
    assert_eq!(removal.changes.as_slice()[0].current_index, Some(1));
}

#[test]
fn test_comparer_set_later_releases_buffered_data() {
    let cache = people();
    cache
        .add_or_update_many([person("A", 3), person("B", 1)])
        .unwrap();

    let sorted = cache.sort_with(None, SortConfig::default()).unwrap();
    let handle = sorted.connect(SubscriptionConfig::default());
    assert!(handle.recv_timeout(Duration::from_millis(100)).is_err());

    sorted.change_comparer(by_age()).unwrap();
    let first = next(&handle);
    assert_eq!(first.sort_reason(), SortReason::InitialLoad);
    assert_eq!(names(&first), vec!["B", "A"]);

    sorted
        .change_comparer(KeyValueComparer::descending_by(|p: &Person| p.age))
        .unwrap();
    let reordered = next(&handle);
    assert_eq!(reordered.sort_reason(), SortReason::Reorder);
    assert_eq!(names(&reordered), vec!["A", "B"]);
    assert_eq!(sorted.sorted_keys(), vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn test_large_batch_publishes_reset() {
    let cache = people();
    let config = SortConfig {
        reset_threshold: 10,
        ..Default::default()
    };
    let sorted = cache.sort_with(Some(by_age()), config).unwrap();
    let handle = sorted.connect(SubscriptionConfig::default());

    cache.add_or_update(person("seed", 500)).unwrap();
    next(&handle);

    cache
        .add_or_update_many((0..20).map(|i| person(&format!("p{:02}", i), 100 - i)))
        .unwrap();
    let reset = next(&handle);
    assert_eq!(reset.sort_reason(), SortReason::Reset);
    assert_eq!(reset.sorted_items.len(), 21);
    assert!(reset.changes.iter().all(|c| c.current_index.is_none()));

    let ages: Vec<u32> = reset.sorted_items.values().map(|p| p.age).collect();
    let mut expected = ages.clone();
    expected.sort();
    assert_eq!(ages, expected);
}

#[test]
fn test_dropping_stream_drops_its_subscribers() {
    let cache = people();
    let sorted = cache.sort(by_age()).unwrap();
    let handle = sorted.connect(SubscriptionConfig::default());
    assert_eq!(cache.subscription_count(), 1);

    sorted.dispose();
    match handle.recv_timeout(TIMEOUT).unwrap() {
        CacheEvent::Dropped { .. } => {}
        other => panic!("expected drop, got {:?}", other),
    }
}

#[test]
fn test_refresh_after_in_place_change_moves_item() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Debug)]
    struct Counter {
        name: &'static str,
        score: Arc<AtomicU32>,
    }

    let cache: SourceCache<&'static str, Counter> = SourceCache::new(|c: &Counter| c.name);
    let sorted = cache
        .sort(KeyValueComparer::ascending_by(|c: &Counter| c.score.load(Ordering::SeqCst)))
        .unwrap();
    let handle = sorted.connect(SubscriptionConfig::default());

    let a = Counter {
        name: "a",
        score: Arc::new(AtomicU32::new(1)),
    };
    let b = Counter {
        name: "b",
        score: Arc::new(AtomicU32::new(2)),
    };
    cache.add_or_update_many([a.clone(), b]).unwrap();
    next(&handle);

    a.score.store(10, Ordering::SeqCst);
    cache.refresh(&"a").unwrap();

    let refreshed = next(&handle);
    assert_eq!(refreshed.changes.refreshes(), 1);
    assert_eq!(refreshed.changes.moves(), 1);
    let moved = refreshed
        .changes
        .iter()
        .find(|c| c.reason == ChangeReason::Moved)
        .unwrap();
    assert_eq!((moved.previous_index, moved.current_index), (Some(0), Some(1)));
    let keys: Vec<_> = refreshed.sorted_items.keys().copied().collect();
    assert_eq!(keys, vec!["b", "a"]);
}

// --- Filtering ---

#[test]
fn test_filtered_view_tracks_membership() {
    let cache = people();
    let handle = cache.subscribe().unwrap();
    let mut adults = FilteredSorter::new(|p: &Person| p.age >= 18, by_age());

    cache
        .add_or_update_many([person("A", 30), person("B", 12), person("C", 20)])
        .unwrap();
    let first = adults.process(&next(&handle)).unwrap().unwrap();
    assert_eq!(names(&first), vec!["C", "A"]);

    cache.add_or_update(person("B", 18)).unwrap();
    let second = adults.process(&next(&handle)).unwrap().unwrap();
    assert_eq!(second.changes.adds(), 1);
    assert_eq!(names(&second), vec!["B", "C", "A"]);

    cache.add_or_update(person("A", 17)).unwrap();
    let third = adults.process(&next(&handle)).unwrap().unwrap();
    assert_eq!(third.changes.removes(), 1);
    assert_eq!(names(&third), vec!["B", "C"]);
}

// --- Grouping ---

#[test]
fn test_grouping_by_parity() {
    let cache = people();
    let handle = cache.subscribe().unwrap();
    let mut groups = GroupManager::new(|p: &Person| p.age % 2 == 0);

    cache
        .add_or_update_many([person("A", 2), person("B", 3)])
        .unwrap();
    let first = groups.process(&next(&handle));
    assert_eq!(first.groups.adds(), 2);

    cache.add_or_update(person("A", 5)).unwrap();
    let second = groups.process(&next(&handle));

    assert_eq!(second.groups.removes(), 1);
    assert!(second.groups.as_slice()[0].current.is_disposed());
    assert_eq!(second.members_of(&true).unwrap().removes(), 1);
    assert_eq!(second.members_of(&false).unwrap().adds(), 1);
    assert_eq!(groups.count(), 1);
    assert_eq!(
        groups.lookup(&false).unwrap().keys(),
        vec!["A".to_string(), "B".to_string()]
    );
}

// --- Change-set delivery ---

#[test]
fn test_subscribers_see_batches_in_order() {
    let cache = people();
    let handle = cache.subscribe().unwrap();

    for age in 0..50 {
        cache.add_or_update(person("A", age)).unwrap();
    }

    let mut seen: Vec<ChangeSet<String, Person>> = Vec::new();
    while let Ok(event) = handle.recv_timeout(Duration::from_millis(100)) {
        if let Some(changes) = event.into_changes() {
            seen.push(changes);
        }
    }
    assert_eq!(seen.len(), 50);
    assert_eq!(seen[0].as_slice()[0].reason, ChangeReason::Add);
    for (age, changes) in seen.iter().enumerate().skip(1) {
        let change = &changes.as_slice()[0];
        assert_eq!(change.reason, ChangeReason::Update);
        assert_eq!(change.current.age, age as u32);
        assert_eq!(change.previous.as_ref().map(|p| p.age), Some(age as u32 - 1));
    }
}

#[test]
fn test_concurrent_writers_keep_store_consistent() {
    let cache = people();
    let handle = cache.subscribe().unwrap();

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    cache.add_or_update(person(&format!("w{}-{}", w, i), i)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(cache.count(), 100);
    let mut adds = 0;
    while let Ok(event) = handle.recv_timeout(Duration::from_millis(100)) {
        if let Some(changes) = event.into_changes() {
            adds += changes.adds();
        }
    }
    assert_eq!(adds, 100);
}

// --- Bursts ---

#[test]
fn test_sorted_view_keeps_up_with_burst_of_single_edits() {
    const EDITS: u32 = 10_000;
    let cache: SourceCache<u32, u32> = SourceCache::new(|v: &u32| *v);
    let sorted = cache.sort(KeyValueComparer::ascending_by(|v: &u32| *v)).unwrap();

    for value in (0..EDITS).rev() {
        cache.add_or_update(value).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while sorted.sorted_keys().len() < EDITS as usize && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(sorted.sorted_keys(), (0..EDITS).collect::<Vec<_>>());
    assert_eq!(cache.subscription_count(), 1);
}
