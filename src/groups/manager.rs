//! Group manager implementation.

use super::group::Group;
use crate::changes::{Change, ChangeReason, ChangeSet};
use crate::types::{CacheKey, CacheValue};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Caller-supplied function mapping a value to its group key.
pub type GroupSelector<V, G> = Arc<dyn Fn(&V) -> G + Send + Sync>;

/// Output of one grouping pass.
#[derive(Clone, Debug)]
pub struct GroupChangeSet<K, V, G> {
    /// Group Adds for created groups, group Removes for disposed ones.
    pub groups: ChangeSet<G, Group<K, V, G>>,
    /// Member change-sets, one per group whose membership changed, in the
    /// order the groups were first touched.
    pub members: Vec<(G, ChangeSet<K, V>)>,
}

impl<K, V, G: PartialEq> GroupChangeSet<K, V, G> {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.members.is_empty()
    }

    /// Member changes for one group in this pass.
    pub fn members_of(&self, group: &G) -> Option<&ChangeSet<K, V>> {
        self.members
            .iter()
            .find(|(key, _)| key == group)
            .map(|(_, changes)| changes)
    }
}

/// Partitions a keyed stream into groups by a derived key.
pub struct GroupManager<K, V, G> {
    selector: GroupSelector<V, G>,
    groups: HashMap<G, Group<K, V, G>>,
    /// Current group of every item.
    item_groups: HashMap<K, G>,
}

impl<K: CacheKey, V: CacheValue, G: CacheKey> GroupManager<K, V, G> {
    pub fn new<F>(selector: F) -> Self
    where
        F: Fn(&V) -> G + Send + Sync + 'static,
    {
        Self {
            selector: Arc::new(selector),
            groups: HashMap::new(),
            item_groups: HashMap::new(),
        }
    }

    /// Route one upstream change-set into the groups.
    pub fn process(&mut self, changes: &ChangeSet<K, V>) -> GroupChangeSet<K, V, G> {
        let mut touched: Vec<G> = Vec::new();
        let mut created: HashSet<G> = HashSet::new();

        for change in changes {
            match change.reason {
                ChangeReason::Add | ChangeReason::Update | ChangeReason::Refresh => {
                    let target = (self.selector)(&change.current);
                    let current = self.item_groups.get(&change.key).cloned();

                    match current {
                        Some(group) if group == target => {
                            let refresh = change.reason == ChangeReason::Refresh;
                            self.with_group(&group, &mut touched, &mut created, |cache| {
                                if refresh {
                                    cache.refresh(&change.key);
                                } else {
                                    cache.add_or_update(change.key.clone(), change.current.clone());
                                }
                            });
                        }
                        previous => {
                            if let Some(previous) = previous {
                                trace!(key = ?change.key, from = ?previous, to = ?target, "item changed group");
                                self.with_group(&previous, &mut touched, &mut created, |cache| {
                                    cache.remove(&change.key);
                                });
                            }
                            self.with_group(&target, &mut touched, &mut created, |cache| {
                                cache.add_or_update(change.key.clone(), change.current.clone());
                            });
                            self.item_groups.insert(change.key.clone(), target);
                        }
                    }
                }
                ChangeReason::Remove => {
                    if let Some(group) = self.item_groups.remove(&change.key) {
                        self.with_group(&group, &mut touched, &mut created, |cache| {
                            cache.remove(&change.key);
                        });
                    }
                }
                ChangeReason::Moved => {}
            }
        }

        self.collect(touched, created)
    }

    /// Re-evaluate the group key of every item, e.g. after values were
    /// mutated in place. Only items whose group changed are moved.
    pub fn regroup(&mut self) -> GroupChangeSet<K, V, G> {
        let mut moved: Vec<Change<K, V>> = Vec::new();
        for (key, group) in &self.item_groups {
            let Some(value) = self.groups.get(group).and_then(|g| g.lookup(key)) else {
                continue;
            };
            if (self.selector)(&value) != *group {
                moved.push(Change::refresh(key.clone(), value));
            }
        }
        moved.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(moved = moved.len(), "regrouping");
        self.process(&moved.into())
    }

    pub fn lookup(&self, group: &G) -> Option<Group<K, V, G>> {
        self.groups.get(group).cloned()
    }

    /// All live groups, ordered by group key.
    pub fn groups(&self) -> Vec<Group<K, V, G>> {
        let mut groups: Vec<_> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.key().cmp(b.key()));
        groups
    }

    /// Number of live groups.
    pub fn count(&self) -> usize {
        self.groups.len()
    }

    /// The group an item currently belongs to.
    pub fn group_of(&self, key: &K) -> Option<&G> {
        self.item_groups.get(key)
    }

    fn with_group<F>(
        &mut self,
        key: &G,
        touched: &mut Vec<G>,
        created: &mut HashSet<G>,
        f: F,
    ) where
        F: FnOnce(&mut crate::cache::ChangeAwareCache<K, V>),
    {
        let group = self.groups.entry(key.clone()).or_insert_with(|| {
            created.insert(key.clone());
            Group::new(key.clone())
        });
        if !touched.contains(key) {
            touched.push(key.clone());
        }
        group.update(f);
    }

    fn collect(&mut self, touched: Vec<G>, created: HashSet<G>) -> GroupChangeSet<K, V, G> {
        let mut groups = ChangeSet::new();
        let mut members = Vec::new();

        for key in touched {
            let Some(group) = self.groups.get(&key).cloned() else {
                continue;
            };
            let changes = group.capture_changes();
            let is_new = created.contains(&key);

            if group.is_empty() {
                self.groups.remove(&key);
                group.dispose();
                if is_new {
                    // Created and emptied within the batch.
                    continue;
                }
                groups.push(Change::remove(key.clone(), group));
            } else if is_new {
                groups.push(Change::add(key.clone(), group));
            }

            if !changes.is_empty() {
                members.push((key, changes));
            }
        }

        if !groups.is_empty() {
            debug!(
                added = groups.adds(),
                removed = groups.removes(),
                live = self.groups.len(),
                "group set changed"
            );
        }

        GroupChangeSet { groups, members }
    }
}
