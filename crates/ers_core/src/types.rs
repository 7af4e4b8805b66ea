//! Core identifiers and query options.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an entity: its type id and a per-storage instance id.
///
/// Instance ids come from a single per-storage counter and are never
/// reused, even after the entity is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    /// Type id, resolved from the type name on first use.
    pub type_id: u32,
    /// Instance id.
    pub instance_id: u64,
}

impl EntityId {
    /// Creates an id from its parts.
    #[must_use]
    pub const fn new(type_id: u32, instance_id: u64) -> Self {
        Self {
            type_id,
            instance_id,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_id, self.instance_id)
    }
}

/// Comparison applied by a property lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindOption {
    /// `value == v`
    Eq,
    /// `value < v`
    Lt,
    /// `value <= v`
    EqOrLt,
    /// `value > v`
    Gt,
    /// `value >= v`
    EqOrGt,
}

impl FindOption {
    /// Whether `stored` satisfies the option against `target` (bytewise).
    #[must_use]
    pub fn matches(self, stored: &[u8], target: &[u8]) -> bool {
        match self {
            FindOption::Eq => stored == target,
            FindOption::Lt => stored < target,
            FindOption::EqOrLt => stored <= target,
            FindOption::Gt => stored > target,
            FindOption::EqOrGt => stored >= target,
        }
    }
}

/// The three attribute namespaces of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKind {
    /// Searchable single values.
    Property,
    /// Opaque payloads.
    Blob,
    /// Multi-valued edges.
    Link,
}

impl AttributeKind {
    /// Short stable tag, used in persisted schema records.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            AttributeKind::Property => "p",
            AttributeKind::Blob => "b",
            AttributeKind::Link => "l",
        }
    }

    /// Parses a tag produced by [`AttributeKind::tag`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "p" => Some(AttributeKind::Property),
            "b" => Some(AttributeKind::Blob),
            "l" => Some(AttributeKind::Link),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_by_type_then_instance() {
        let mut ids = vec![EntityId::new(2, 1), EntityId::new(1, 9), EntityId::new(1, 3)];
        ids.sort();
        assert_eq!(
            ids,
            vec![EntityId::new(1, 3), EntityId::new(1, 9), EntityId::new(2, 1)]
        );
    }

    #[test]
    fn find_options_compare_unsigned_bytes() {
        assert!(FindOption::Lt.matches(&[0x7f], &[0x80]));
        assert!(FindOption::Gt.matches(&[1, 0], &[1]));
        assert!(FindOption::EqOrGt.matches(&[5], &[5]));
        assert!(!FindOption::Lt.matches(&[5], &[5]));
    }

    #[test]
    fn attribute_tags_roundtrip() {
        for kind in [AttributeKind::Property, AttributeKind::Blob, AttributeKind::Link] {
            assert_eq!(AttributeKind::from_tag(kind.tag()), Some(kind));
        }
    }
}
