//! Populated storages with known query answers.

use ers_core::{EntityId, EntityRelationshipStorage, ErsError, ErsResult, Transaction, ValueExt};
use std::collections::BTreeMap;

/// Entity type of the users.
pub const USER_TYPE: &str = "User";
/// Entity type of the group linking every user.
pub const GROUP_TYPE: &str = "UserGroup";
/// Link name from the group to its users.
pub const USER_LINK: &str = "user";
/// Number of users in the standard scenario.
pub const USER_COUNT: usize = 100;
/// Searchable property names of a user, sorted.
pub const USER_PROPERTIES: [&str; 5] = ["age", "dozen", "height", "login", "password"];
/// Blob names of a user.
pub const USER_BLOBS: [&str; 1] = ["avatar"];

/// Ids created by [`populate_users`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserScenario {
    /// The group entity.
    pub group: EntityId,
    /// Users in creation order.
    pub users: Vec<EntityId>,
}

/// Age of user `i`, stored compressed.
#[must_use]
pub const fn age(i: i32) -> i32 {
    20 + i / 10
}

/// Height of user `i`, stored compressed.
#[must_use]
pub const fn height(i: i32) -> i32 {
    180 - i / 10
}

/// `dozen` of user `i`, stored with the general encoding.
#[must_use]
pub const fn dozen(i: i32) -> i32 {
    12 * i
}

/// Avatar of user `i`, stored as a non-searchable blob.
#[must_use]
pub fn avatar(i: i32) -> String {
    format!("!@#%^&{i}")
}

/// Creates `count` users and one group linking all of them, in one
/// transaction.
///
/// # Errors
///
/// Returns the storage's error, or a consistency error if `count` does not
/// fit an `i32`.
pub fn populate_users(
    storage: &EntityRelationshipStorage,
    count: usize,
) -> ErsResult<UserScenario> {
    let count = i32::try_from(count)
        .map_err(|_| ErsError::consistency(format!("too many users: {count}")))?;
    storage.transactional(false, |txn| {
        let group = txn.new_entity(GROUP_TYPE)?;
        let mut users = Vec::new();
        for i in 0..count {
            let user = txn.new_entity(USER_TYPE)?;
            user.set("login", format!("login{i}"))?;
            user.set("password", format!("password{i}"))?;
            user.set("avatar", avatar(i).non_searchable())?;
            user.set("age", age(i).compressed())?;
            user.set("height", height(i).compressed())?;
            user.set("dozen", dozen(i))?;
            group.add_link(USER_LINK, &user)?;
            users.push(user.id());
        }
        Ok(UserScenario {
            group: group.id(),
            users,
        })
    })
}

/// Everything a transaction can see, in a form comparable across backends.
///
/// Attribute names are not recorded: backends may keep the name of an
/// attribute whose last value was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageSnapshot {
    /// Type ids by name.
    pub types: BTreeMap<String, u32>,
    /// Live entities by type name.
    pub entities: BTreeMap<String, Vec<EntityId>>,
    /// Property values by entity and name.
    pub properties: BTreeMap<(EntityId, String), Vec<u8>>,
    /// Blob values by entity and name.
    pub blobs: BTreeMap<(EntityId, String), Vec<u8>>,
    /// Non-empty link targets by source and name.
    pub links: BTreeMap<(EntityId, String), Vec<EntityId>>,
}

impl StorageSnapshot {
    /// Reads every visible entity, attribute and link.
    ///
    /// # Errors
    ///
    /// Returns the storage's error.
    pub fn capture(txn: &Transaction<'_>) -> ErsResult<Self> {
        let mut snapshot = Self {
            types: txn.get_types()?,
            ..Self::default()
        };
        for type_name in snapshot.types.keys() {
            let ids = txn.all(type_name)?.ids()?;
            let properties = txn.get_property_names(type_name)?;
            let blobs = txn.get_blob_names(type_name)?;
            let links = txn.get_link_names(type_name)?;
            for id in &ids {
                let entity = txn.get_entity_unsafe(*id);
                for name in &properties {
                    if let Some(value) = entity.get_raw_property(name)? {
                        snapshot.properties.insert((*id, name.clone()), value);
                    }
                }
                for name in &blobs {
                    if let Some(value) = entity.get_raw_blob(name)? {
                        snapshot.blobs.insert((*id, name.clone()), value);
                    }
                }
                for name in &links {
                    let targets = entity.get_links(name)?.ids()?;
                    if !targets.is_empty() {
                        snapshot.links.insert((*id, name.clone()), targets);
                    }
                }
            }
            snapshot.entities.insert(type_name.clone(), ids);
        }
        Ok(snapshot)
    }

    /// Number of live entities across all types.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }
}
