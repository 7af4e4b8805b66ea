//! Typed entity descriptors.
//!
//! An entity type is a marker implementing [`ErsType`]. Its attributes are
//! `const` descriptors, so the value type and the target type of every
//! access are checked at compile time:
//!
//! ```rust
//! use ers_core::typed::{ErsLink, ErsProperty, ErsType};
//! use ers_core::EntityRelationshipStorage;
//!
//! struct Person;
//!
//! impl ErsType for Person {
//!     const TYPE_NAME: &'static str = "Person";
//! }
//!
//! impl Person {
//!     const NAME: ErsProperty<Person, String> = ErsProperty::searchable("name");
//!     const AGE: ErsProperty<Person, i32> = ErsProperty::searchable("age").compressed();
//!     const NOTES: ErsProperty<Person, String> = ErsProperty::non_searchable("notes");
//!     const FRIEND: ErsLink<Person, Person> = ErsLink::new("friend");
//! }
//!
//! let storage = EntityRelationshipStorage::ram();
//! storage.transactional(false, |txn| {
//!     let alice = txn.new_typed::<Person>()?;
//!     alice.set(Person::NAME, &"alice".to_string())?;
//!     alice.set(Person::AGE, &31)?;
//!     let bob = txn.new_typed::<Person>()?;
//!     bob.set(Person::AGE, &27)?;
//!     alice.add_link(Person::FRIEND, &bob)?;
//!
//!     assert_eq!(txn.find_typed(Person::AGE, &31)?.size()?, 1);
//!     assert_eq!(alice.links(Person::FRIEND)?.ids()?, vec![bob.id()]);
//!     Ok(())
//! })?;
//! # Ok::<(), ers_core::ErsError>(())
//! ```

use crate::entity::Entity;
use crate::error::{ErsError, ErsResult};
use crate::iterable::EntityIterable;
use crate::transaction::Transaction;
use crate::types::{EntityId, FindOption};
use ers_codec::Binding;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Mul, Sub};

/// A user-defined entity type.
pub trait ErsType: 'static {
    /// Type name the entities are stored under.
    const TYPE_NAME: &'static str;
}

/// Whether a property can be looked up by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Searchability {
    /// Stored as a property and indexed.
    Searchable,
    /// Stored as a blob.
    NonSearchable,
}

/// A property of entities of type `E` holding values of type `V`.
pub struct ErsProperty<E, V> {
    name: &'static str,
    searchability: Searchability,
    compressed: bool,
    marker: PhantomData<fn() -> (E, V)>,
}

impl<E: ErsType, V: Binding> ErsProperty<E, V> {
    /// A property that supports lookups by value.
    #[must_use]
    pub const fn searchable(name: &'static str) -> Self {
        Self::with(name, Searchability::Searchable)
    }

    /// A property stored as a blob.
    #[must_use]
    pub const fn non_searchable(name: &'static str) -> Self {
        Self::with(name, Searchability::NonSearchable)
    }

    const fn with(name: &'static str, searchability: Searchability) -> Self {
        Self {
            name,
            searchability,
            compressed: false,
            marker: PhantomData,
        }
    }

    /// Stores values with the compact encoding.
    #[must_use]
    pub const fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    /// Attribute name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether lookups by value are possible.
    #[must_use]
    pub const fn searchability(&self) -> Searchability {
        self.searchability
    }

    fn encode(&self, value: &V) -> ErsResult<Vec<u8>> {
        if self.compressed {
            Ok(value.encode_compressed()?)
        } else {
            Ok(value.encode())
        }
    }

    fn decode(&self, bytes: &[u8]) -> ErsResult<V> {
        if self.compressed {
            Ok(V::decode_compressed(bytes)?)
        } else {
            Ok(V::decode(bytes)?)
        }
    }
}

impl<E, V> Clone for ErsProperty<E, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, V> Copy for ErsProperty<E, V> {}

impl<E: ErsType, V: Binding> fmt::Debug for ErsProperty<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErsProperty")
            .field("owner", &E::TYPE_NAME)
            .field("name", &self.name)
            .field("value", &V::TYPE_NAME)
            .field("searchability", &self.searchability)
            .field("compressed", &self.compressed)
            .finish()
    }
}

/// A link from entities of type `S` to entities of type `T`.
pub struct ErsLink<S, T> {
    name: &'static str,
    marker: PhantomData<fn() -> (S, T)>,
}

impl<S: ErsType, T: ErsType> ErsLink<S, T> {
    /// Declares a link named `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            marker: PhantomData,
        }
    }

    /// Link name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Type name of the link targets.
    #[must_use]
    pub const fn target_type_name(&self) -> &'static str {
        T::TYPE_NAME
    }
}

impl<S, T> Clone for ErsLink<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, T> Copy for ErsLink<S, T> {}

impl<S: ErsType, T: ErsType> fmt::Debug for ErsLink<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErsLink({} -{}-> {})", S::TYPE_NAME, self.name, T::TYPE_NAME)
    }
}

/// An entity id known to belong to type `E`.
pub struct TypedEntityId<E> {
    id: EntityId,
    marker: PhantomData<fn() -> E>,
}

impl<E> TypedEntityId<E> {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            marker: PhantomData,
        }
    }

    /// The untyped id.
    #[must_use]
    pub fn untyped(&self) -> EntityId {
        self.id
    }
}

impl<E> Clone for TypedEntityId<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for TypedEntityId<E> {}

impl<E> PartialEq for TypedEntityId<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for TypedEntityId<E> {}

impl<E: ErsType> fmt::Debug for TypedEntityId<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", E::TYPE_NAME, self.id)
    }
}

impl<E> From<TypedEntityId<E>> for EntityId {
    fn from(id: TypedEntityId<E>) -> Self {
        id.id
    }
}

impl<E> From<&TypedEntity<'_, E>> for TypedEntityId<E> {
    fn from(entity: &TypedEntity<'_, E>) -> Self {
        entity.id()
    }
}

/// An entity of type `E`.
pub struct TypedEntity<'t, E> {
    entity: Entity<'t>,
    marker: PhantomData<fn() -> E>,
}

impl<'t, E> TypedEntity<'t, E> {
    fn new(entity: Entity<'t>) -> Self {
        Self {
            entity,
            marker: PhantomData,
        }
    }

    /// The typed id.
    #[must_use]
    pub fn id(&self) -> TypedEntityId<E> {
        TypedEntityId::new(self.entity.id())
    }

    /// The untyped handle.
    #[must_use]
    pub fn untyped(&self) -> Entity<'t> {
        self.entity
    }

    /// Deletes the entity with its attributes and outgoing links.
    pub fn delete(&self) -> ErsResult<()> {
        self.entity.delete()
    }
}

impl<'t, E: ErsType> TypedEntity<'t, E> {
    /// Wraps `entity` if it is of type `E`.
    pub fn cast(entity: Entity<'t>) -> ErsResult<Option<Self>> {
        let type_id = entity.transaction().get_type_id(E::TYPE_NAME)?;
        Ok((type_id == Some(entity.id().type_id)).then(|| Self::new(entity)))
    }

    /// Reads a property.
    pub fn get<V: Binding>(&self, property: ErsProperty<E, V>) -> ErsResult<Option<V>> {
        let bytes = match property.searchability {
            Searchability::Searchable => self.entity.get_raw_property(property.name)?,
            Searchability::NonSearchable => self.entity.get_raw_blob(property.name)?,
        };
        bytes.map(|bytes| property.decode(&bytes)).transpose()
    }

    /// Writes a property.
    pub fn set<V: Binding>(&self, property: ErsProperty<E, V>, value: &V) -> ErsResult<()> {
        let bytes = property.encode(value)?;
        self.write(property, Some(&bytes))
    }

    /// Removes a property.
    pub fn remove<V: Binding>(&self, property: ErsProperty<E, V>) -> ErsResult<()> {
        self.write(property, None)
    }

    fn write<V: Binding>(
        &self,
        property: ErsProperty<E, V>,
        bytes: Option<&[u8]>,
    ) -> ErsResult<()> {
        match property.searchability {
            Searchability::Searchable => self.entity.set_raw_property(property.name, bytes),
            Searchability::NonSearchable => self.entity.set_raw_blob(property.name, bytes),
        }
    }

    /// Live targets of a link.
    pub fn links<T: ErsType>(&self, link: ErsLink<E, T>) -> ErsResult<TypedEntityIterable<'t, T>> {
        Ok(TypedEntityIterable::new(self.entity.get_links(link.name)?))
    }

    /// Adds a link. Returns false if it was already present.
    pub fn add_link<T: ErsType>(
        &self,
        link: ErsLink<E, T>,
        target: impl Into<TypedEntityId<T>>,
    ) -> ErsResult<bool> {
        let target: TypedEntityId<T> = target.into();
        self.entity.add_link(link.name, target)
    }

    /// Removes a link. Returns false if it was absent.
    pub fn delete_link<T: ErsType>(
        &self,
        link: ErsLink<E, T>,
        target: impl Into<TypedEntityId<T>>,
    ) -> ErsResult<bool> {
        let target: TypedEntityId<T> = target.into();
        self.entity.delete_link(link.name, target)
    }
}

impl<E> Clone for TypedEntity<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for TypedEntity<'_, E> {}

impl<E: ErsType> fmt::Debug for TypedEntity<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", E::TYPE_NAME, self.entity.id())
    }
}

/// A lazily evaluated collection of entities of type `E`.
pub struct TypedEntityIterable<'t, E> {
    iterable: EntityIterable<'t>,
    marker: PhantomData<fn() -> E>,
}

impl<'t, E> TypedEntityIterable<'t, E> {
    fn new(iterable: EntityIterable<'t>) -> Self {
        Self {
            iterable,
            marker: PhantomData,
        }
    }

    /// The untyped collection.
    #[must_use]
    pub fn untyped(&self) -> &EntityIterable<'t> {
        &self.iterable
    }

    /// Evaluates the query to typed ids.
    pub fn ids(&self) -> ErsResult<Vec<TypedEntityId<E>>> {
        Ok(self
            .iterable
            .ids()?
            .into_iter()
            .map(TypedEntityId::new)
            .collect())
    }

    /// Evaluates the query to typed handles.
    pub fn iter(&self) -> ErsResult<impl Iterator<Item = TypedEntity<'t, E>> + 't>
    where
        E: 't,
    {
        Ok(self.iterable.iter()?.map(TypedEntity::new))
    }

    /// Number of entities.
    pub fn size(&self) -> ErsResult<usize> {
        self.iterable.size()
    }

    /// Whether there are no entities.
    pub fn is_empty(&self) -> ErsResult<bool> {
        self.iterable.is_empty()
    }

    /// Whether the entity is a member.
    pub fn contains(&self, id: impl Into<TypedEntityId<E>>) -> ErsResult<bool> {
        let id: TypedEntityId<E> = id.into();
        self.iterable.contains(id)
    }

    /// The first entity in iteration order.
    pub fn first(&self) -> ErsResult<Option<TypedEntity<'t, E>>> {
        Ok(self.iterable.first()?.map(TypedEntity::new))
    }

    /// The only entity, or `None` if there is none.
    pub fn exact_single_or_none(&self) -> ErsResult<Option<TypedEntity<'t, E>>> {
        Ok(self.iterable.exact_single_or_none()?.map(TypedEntity::new))
    }

    /// Entities in either collection.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.iterable.union(&other.iterable))
    }

    /// Entities in both collections.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self::new(self.iterable.intersect(&other.iterable))
    }

    /// Entities in this collection but not in `other`.
    #[must_use]
    pub fn minus(&self, other: &Self) -> Self {
        Self::new(self.iterable.minus(&other.iterable))
    }

    /// Deletes every member. Returns how many were deleted.
    pub fn delete_all(&self) -> ErsResult<usize> {
        self.iterable.delete_all()
    }
}

impl<E> Clone for TypedEntityIterable<'_, E> {
    fn clone(&self) -> Self {
        Self::new(self.iterable.clone())
    }
}

impl<'t, E> Add for TypedEntityIterable<'t, E> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.union(&rhs)
    }
}

impl<'t, E> Mul for TypedEntityIterable<'t, E> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.intersect(&rhs)
    }
}

impl<'t, E> Sub for TypedEntityIterable<'t, E> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.minus(&rhs)
    }
}

impl<E: ErsType> fmt::Debug for TypedEntityIterable<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedEntityIterable")
            .field(&E::TYPE_NAME)
            .field(&self.iterable)
            .finish()
    }
}

impl Transaction<'_> {
    /// Creates an entity of type `E`.
    pub fn new_typed<E: ErsType>(&self) -> ErsResult<TypedEntity<'_, E>> {
        Ok(TypedEntity::new(self.new_entity(E::TYPE_NAME)?))
    }

    /// Returns the entity if it exists.
    pub fn get_typed<E: ErsType>(
        &self,
        id: TypedEntityId<E>,
    ) -> ErsResult<Option<TypedEntity<'_, E>>> {
        Ok(self.get_entity_or_none(id.id)?.map(TypedEntity::new))
    }

    /// All entities of type `E`.
    pub fn all_typed<E: ErsType>(&self) -> ErsResult<TypedEntityIterable<'_, E>> {
        Ok(TypedEntityIterable::new(self.all(E::TYPE_NAME)?))
    }

    /// Entities whose property equals `value`.
    pub fn find_typed<E: ErsType, V: Binding>(
        &self,
        property: ErsProperty<E, V>,
        value: &V,
    ) -> ErsResult<TypedEntityIterable<'_, E>> {
        self.find_typed_with(property, value, FindOption::Eq)
    }

    /// Entities whose property compares to `value` as `option` says.
    ///
    /// # Errors
    ///
    /// [`ErsError::Unsupported`] for non-searchable properties.
    pub fn find_typed_with<E: ErsType, V: Binding>(
        &self,
        property: ErsProperty<E, V>,
        value: &V,
        option: FindOption,
    ) -> ErsResult<TypedEntityIterable<'_, E>> {
        if property.searchability == Searchability::NonSearchable {
            return Err(ErsError::unsupported(format!(
                "lookup by non-searchable property {}.{}",
                E::TYPE_NAME,
                property.name
            )));
        }
        let bytes = property.encode(value)?;
        Ok(TypedEntityIterable::new(self.find_raw(
            E::TYPE_NAME,
            property.name,
            &bytes,
            option,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EntityRelationshipStorage;

    struct Person;

    impl ErsType for Person {
        const TYPE_NAME: &'static str = "Person";
    }

    impl Person {
        const NAME: ErsProperty<Person, String> = ErsProperty::searchable("name");
        const AGE: ErsProperty<Person, i32> = ErsProperty::searchable("age").compressed();
        const BIO: ErsProperty<Person, String> = ErsProperty::non_searchable("bio");
        const EMPLOYER: ErsLink<Person, Company> = ErsLink::new("employer");
    }

    struct Company;

    impl ErsType for Company {
        const TYPE_NAME: &'static str = "Company";
    }

    impl Company {
        const TITLE: ErsProperty<Company, String> = ErsProperty::searchable("title");
    }

    #[test]
    fn properties_follow_their_searchability() {
        let storage = EntityRelationshipStorage::ram();
        storage
            .transactional(false, |txn| {
                let person = txn.new_typed::<Person>()?;
                person.set(Person::NAME, &"ada".to_string())?;
                person.set(Person::BIO, &"mathematician".to_string())?;
                person.set(Person::AGE, &36)?;

                assert_eq!(person.get(Person::NAME)?.as_deref(), Some("ada"));
                assert_eq!(person.get(Person::AGE)?, Some(36));
                assert_eq!(person.untyped().get_raw_property("bio")?, None);
                assert!(person.untyped().get_raw_blob("bio")?.is_some());
                assert_eq!(person.untyped().get_compressed::<i32>("age")?, Some(36));

                person.remove(Person::BIO)?;
                assert_eq!(person.get(Person::BIO)?, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn typed_lookups_encode_like_the_descriptor() {
        let storage = EntityRelationshipStorage::ram();
        storage
            .transactional(false, |txn| {
                for age in [20, 30, 40] {
                    txn.new_typed::<Person>()?.set(Person::AGE, &age)?;
                }
                assert_eq!(txn.find_typed(Person::AGE, &30)?.size()?, 1);
                let older = txn.find_typed_with(Person::AGE, &30, FindOption::Gt)?;
                let ages: Vec<_> = older
                    .iter()?
                    .map(|p| p.get(Person::AGE))
                    .collect::<ErsResult<_>>()?;
                assert_eq!(ages, vec![Some(40)]);
                assert!(matches!(
                    txn.find_typed(Person::BIO, &String::new()),
                    Err(ErsError::Unsupported { .. })
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn links_carry_the_target_type() {
        let storage = EntityRelationshipStorage::ram();
        storage
            .transactional(false, |txn| {
                let company = txn.new_typed::<Company>()?;
                company.set(Company::TITLE, &"acme".to_string())?;
                let person = txn.new_typed::<Person>()?;
                assert!(person.add_link(Person::EMPLOYER, &company)?);
                assert!(!person.add_link(Person::EMPLOYER, company.id())?);

                let employers = person.links(Person::EMPLOYER)?;
                let employer = employers.exact_single_or_none()?.map(|c| c.id());
                assert_eq!(employer, Some(company.id()));
                assert_eq!(Person::EMPLOYER.target_type_name(), "Company");

                assert!(person.delete_link(Person::EMPLOYER, &company)?);
                assert!(person.links(Person::EMPLOYER)?.is_empty()?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn cast_checks_the_entity_type() {
        let storage = EntityRelationshipStorage::ram();
        storage
            .transactional(false, |txn| {
                let person = txn.new_typed::<Person>()?;
                let company = txn.new_typed::<Company>()?;
                assert!(TypedEntity::<Person>::cast(person.untyped())?.is_some());
                assert!(TypedEntity::<Person>::cast(company.untyped())?.is_none());

                let everyone = txn.all_typed::<Person>()?;
                assert!(everyone.contains(&person)?);
                assert_eq!(txn.get_typed(person.id())?.map(|p| p.id()), Some(person.id()));
                person.delete()?;
                assert!(txn.get_typed(person.id())?.is_none());
                assert!(everyone.is_empty()?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn typed_collections_combine() {
        let storage = EntityRelationshipStorage::ram();
        storage
            .transactional(false, |txn| {
                for age in 0..10 {
                    txn.new_typed::<Person>()?.set(Person::AGE, &age)?;
                }
                let young = txn.find_typed_with(Person::AGE, &3, FindOption::Lt)?;
                let old = txn.find_typed_with(Person::AGE, &7, FindOption::Gt)?;
                assert_eq!((young.clone() + old.clone()).size()?, 5);
                assert!((young.clone() * old).is_empty()?);
                let all = txn.all_typed::<Person>()?;
                assert_eq!((all - young).delete_all()?, 7);
                assert_eq!(txn.all_typed::<Person>()?.size()?, 3);
                Ok(())
            })
            .unwrap();
    }
}
