//! Storage-scoped cache of lazily created schema elements.
//!
//! Backends that create tables or maps on first write consult this cache
//! before every access, so existence checks hit memory instead of the
//! engine. The storage owns the committed cache. Each transaction pins the
//! committed version matching its engine snapshot, keeps its own pending
//! additions and publishes them on commit.

use crate::types::AttributeKind;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One lazily created schema element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaItem {
    /// Entity table of a type.
    Entities(u32),
    /// Attribute storage of `(type_id, kind, name)`.
    Attribute(u32, AttributeKind, String),
    /// Link storage between a source and a target type.
    LinkTable {
        /// Source type id.
        source: u32,
        /// Target type id.
        target: u32,
        /// Link name.
        name: String,
    },
}

/// A set of known schema elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCache {
    items: BTreeSet<SchemaItem>,
}

impl SchemaCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the element is known.
    #[must_use]
    pub fn contains(&self, item: &SchemaItem) -> bool {
        self.items.contains(item)
    }

    /// Whether the cache holds no element.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Records an element. Returns true if it was new.
    pub fn insert(&mut self, item: SchemaItem) -> bool {
        self.items.insert(item)
    }

    /// Attribute names of a type, sorted.
    #[must_use]
    pub fn names(&self, type_id: u32, kind: AttributeKind) -> BTreeSet<String> {
        self.items
            .iter()
            .filter_map(|item| match item {
                SchemaItem::Attribute(t, k, name) if *t == type_id && *k == kind => {
                    Some(name.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Target types that have link storage for `(source, name)`.
    #[must_use]
    pub fn link_targets(&self, source: u32, name: &str) -> Vec<u32> {
        self.items
            .iter()
            .filter_map(|item| match item {
                SchemaItem::LinkTable {
                    source: s,
                    target,
                    name: n,
                } if *s == source && n == name => Some(*target),
                _ => None,
            })
            .collect()
    }

    /// Iterates all elements.
    pub fn iter(&self) -> impl Iterator<Item = &SchemaItem> {
        self.items.iter()
    }

    /// Adds every element of `other`.
    pub fn extend(&mut self, other: SchemaCache) {
        self.items.extend(other.items);
    }

    /// Forgets every element.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// A transaction's view of the schema: the committed cache pinned at begin
/// plus pending additions that become visible to others on commit.
#[derive(Debug, Default)]
pub(crate) struct SchemaView {
    base: Arc<SchemaCache>,
    pending: RefCell<SchemaCache>,
    reset: Cell<bool>,
}

impl SchemaView {
    /// A view over `base`. Callers pin `base` under the same lock that
    /// orders engine commits, so it matches the engine snapshot.
    pub(crate) fn new(base: Arc<SchemaCache>) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub(crate) fn contains(&self, item: &SchemaItem) -> bool {
        self.pending.borrow().contains(item) || (!self.reset.get() && self.base.contains(item))
    }

    pub(crate) fn record(&self, item: SchemaItem) {
        self.pending.borrow_mut().insert(item);
    }

    /// Merged view of pinned and pending elements.
    pub(crate) fn snapshot(&self) -> SchemaCache {
        let mut merged = if self.reset.get() {
            SchemaCache::new()
        } else {
            self.base.as_ref().clone()
        };
        merged.extend(self.pending.borrow().clone());
        merged
    }

    /// Forgets everything, including pinned elements, for this transaction.
    pub(crate) fn reset(&self) {
        self.reset.set(true);
        self.pending.borrow_mut().clear();
    }

    /// Publishes pending changes into the latest committed cache.
    pub(crate) fn publish(&self, committed: &mut Arc<SchemaCache>) {
        let pending = self.pending.take();
        if !self.reset.get() && pending.is_empty() {
            return;
        }
        let cache = Arc::make_mut(committed);
        if self.reset.get() {
            cache.clear();
        }
        cache.extend(pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(t: u32, name: &str) -> SchemaItem {
        SchemaItem::Attribute(t, AttributeKind::Property, name.to_string())
    }

    #[test]
    fn names_are_sorted_and_scoped() {
        let mut cache = SchemaCache::new();
        cache.insert(prop(1, "login"));
        cache.insert(prop(1, "age"));
        cache.insert(prop(2, "other"));
        cache.insert(SchemaItem::Attribute(1, AttributeKind::Blob, "avatar".into()));

        let names: Vec<_> = cache.names(1, AttributeKind::Property).into_iter().collect();
        assert_eq!(names, vec!["age", "login"]);
    }

    #[test]
    fn pending_items_publish_on_commit() {
        let mut committed = Arc::new(SchemaCache::new());
        let view = SchemaView::new(Arc::clone(&committed));
        view.record(prop(1, "age"));
        assert!(view.contains(&prop(1, "age")));
        assert!(!committed.contains(&prop(1, "age")));

        view.publish(&mut committed);
        assert!(committed.contains(&prop(1, "age")));
    }

    #[test]
    fn views_keep_the_version_they_pinned() {
        let mut committed = Arc::new(SchemaCache::new());
        let reader = SchemaView::new(Arc::clone(&committed));

        let writer = SchemaView::new(Arc::clone(&committed));
        writer.record(prop(1, "email"));
        writer.publish(&mut committed);

        assert!(committed.contains(&prop(1, "email")));
        assert!(!reader.contains(&prop(1, "email")));
        assert!(reader.snapshot().names(1, AttributeKind::Property).is_empty());
    }

    #[test]
    fn reset_hides_committed_items() {
        let mut cache = SchemaCache::new();
        cache.insert(prop(1, "age"));
        let mut committed = Arc::new(cache);

        let view = SchemaView::new(Arc::clone(&committed));
        view.reset();
        assert!(!view.contains(&prop(1, "age")));
        view.record(prop(1, "height"));
        view.publish(&mut committed);

        assert!(!committed.contains(&prop(1, "age")));
        assert!(committed.contains(&prop(1, "height")));
    }

    #[test]
    fn link_targets_follow_tables() {
        let mut cache = SchemaCache::new();
        cache.insert(SchemaItem::LinkTable {
            source: 1,
            target: 2,
            name: "user".into(),
        });
        cache.insert(SchemaItem::LinkTable {
            source: 1,
            target: 3,
            name: "user".into(),
        });
        assert_eq!(cache.link_targets(1, "user"), vec![2, 3]);
        assert!(cache.link_targets(1, "owner").is_empty());
    }
}
