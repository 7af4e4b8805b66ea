//! Lazily evaluated entity collections with set algebra.
//!
//! An [`EntityIterable`] is a query description bound to a transaction. It
//! is evaluated on every use, so it always reflects the transaction's
//! latest writes. Results have set semantics: no entity appears twice.
//!
//! Ordering:
//! - `all` yields entities by instance id (creation order)
//! - `find*` yields entities by `(value, instance id)`
//! - links yield targets by id
//! - `a + b` yields `a` followed by the members of `b` not in `a`
//! - `a * b` and `a - b` keep the order of `a`

use crate::entity::Entity;
use crate::error::{ErsError, ErsResult};
use crate::transaction::Transaction;
use crate::types::{EntityId, FindOption};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone)]
pub(crate) enum Query {
    All {
        type_name: String,
    },
    Find {
        type_name: String,
        property: String,
        value: Vec<u8>,
        option: FindOption,
    },
    Links {
        source: EntityId,
        name: String,
    },
    Union(Box<Query>, Box<Query>),
    Intersect(Box<Query>, Box<Query>),
    Minus(Box<Query>, Box<Query>),
    /// Operands came from different transactions.
    Mismatch,
}

impl Query {
    fn evaluate(&self, txn: &Transaction<'_>) -> ErsResult<Vec<EntityId>> {
        let backend = txn.backend()?;
        match self {
            Query::All { type_name } => match backend.type_id(type_name)? {
                Some(type_id) => backend.all(type_id),
                None => Ok(Vec::new()),
            },
            Query::Find {
                type_name,
                property,
                value,
                option,
            } => match backend.type_id(type_name)? {
                Some(type_id) => backend.find(type_id, property, value, *option),
                None => Ok(Vec::new()),
            },
            Query::Links { source, name } => backend.links(*source, name),
            Query::Union(left, right) => {
                let mut ids = left.evaluate(txn)?;
                let mut seen: BTreeSet<EntityId> = ids.iter().copied().collect();
                for id in right.evaluate(txn)? {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
                Ok(ids)
            }
            Query::Intersect(left, right) => {
                let keep: BTreeSet<EntityId> = right.evaluate(txn)?.into_iter().collect();
                let mut ids = left.evaluate(txn)?;
                ids.retain(|id| keep.contains(id));
                Ok(ids)
            }
            Query::Minus(left, right) => {
                let drop: BTreeSet<EntityId> = right.evaluate(txn)?.into_iter().collect();
                let mut ids = left.evaluate(txn)?;
                ids.retain(|id| !drop.contains(id));
                Ok(ids)
            }
            Query::Mismatch => Err(ErsError::consistency(
                "cannot combine entity iterables of different transactions",
            )),
        }
    }
}

/// A lazily evaluated collection of entities.
///
/// ```rust
/// use ers_core::EntityRelationshipStorage;
///
/// let storage = EntityRelationshipStorage::ram();
/// storage
///     .transactional(false, |txn| {
///         for age in 0..10i32 {
///             txn.new_entity("User")?.set("age", age)?;
///         }
///         let young = txn.find_lt("User", "age", 3)?;
///         let old = txn.find_gt("User", "age", 7)?;
///         assert_eq!((young + old).size()?, 5);
///         Ok(())
///     })
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct EntityIterable<'t> {
    txn: &'t Transaction<'t>,
    query: Query,
}

impl<'t> EntityIterable<'t> {
    pub(crate) fn new(txn: &'t Transaction<'t>, query: Query) -> Self {
        Self { txn, query }
    }

    fn combine(&self, other: &Self, op: fn(Box<Query>, Box<Query>) -> Query) -> Self {
        let query = if std::ptr::eq(self.txn, other.txn) {
            op(Box::new(self.query.clone()), Box::new(other.query.clone()))
        } else {
            Query::Mismatch
        };
        Self::new(self.txn, query)
    }

    /// Entities in either collection.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.combine(other, Query::Union)
    }

    /// Entities in both collections.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        self.combine(other, Query::Intersect)
    }

    /// Entities in this collection but not in `other`.
    #[must_use]
    pub fn minus(&self, other: &Self) -> Self {
        self.combine(other, Query::Minus)
    }

    /// Evaluates the query to ids.
    pub fn ids(&self) -> ErsResult<Vec<EntityId>> {
        self.query.evaluate(self.txn)
    }

    /// Evaluates the query to entity handles.
    pub fn iter(&self) -> ErsResult<impl Iterator<Item = Entity<'t>> + 't> {
        let txn = self.txn;
        Ok(self.ids()?.into_iter().map(move |id| Entity::new(txn, id)))
    }

    /// Number of entities.
    pub fn size(&self) -> ErsResult<usize> {
        Ok(self.ids()?.len())
    }

    /// Whether there are no entities.
    pub fn is_empty(&self) -> ErsResult<bool> {
        Ok(self.ids()?.is_empty())
    }

    /// Whether the entity is a member.
    pub fn contains(&self, id: impl Into<EntityId>) -> ErsResult<bool> {
        let id = id.into();
        Ok(self.ids()?.contains(&id))
    }

    /// The first entity in iteration order.
    pub fn first(&self) -> ErsResult<Option<Entity<'t>>> {
        Ok(self
            .ids()?
            .first()
            .map(|id| Entity::new(self.txn, *id)))
    }

    /// The only entity, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// [`ErsError::ConsistencyViolation`] if there are several.
    pub fn exact_single_or_none(&self) -> ErsResult<Option<Entity<'t>>> {
        let ids = self.ids()?;
        match ids.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(Entity::new(self.txn, *id))),
            many => Err(ErsError::consistency(format!(
                "expected at most one entity, found {}",
                many.len()
            ))),
        }
    }

    /// Deletes every member. Returns how many were deleted.
    pub fn delete_all(&self) -> ErsResult<usize> {
        let ids = self.ids()?;
        let backend = self.txn.backend_mut()?;
        let mut deleted = 0;
        for id in ids {
            if backend.delete_entity(id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

impl<'t> Add for EntityIterable<'t> {
    type Output = EntityIterable<'t>;

    fn add(self, rhs: Self) -> Self::Output {
        self.union(&rhs)
    }
}

impl<'t> Mul for EntityIterable<'t> {
    type Output = EntityIterable<'t>;

    fn mul(self, rhs: Self) -> Self::Output {
        self.intersect(&rhs)
    }
}

impl<'t> Sub for EntityIterable<'t> {
    type Output = EntityIterable<'t>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.minus(&rhs)
    }
}

impl fmt::Debug for EntityIterable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityIterable")
            .field("query", &self.query)
            .finish()
    }
}
