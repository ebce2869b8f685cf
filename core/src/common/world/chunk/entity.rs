use crate::common::world::Error;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type EntityId = u64;

/// An entity owned by a chunk column.
///
/// Gameplay behavior is out of scope; the chunk only stores the stable id, the type id,
/// the position which decides ownership, and an opaque state blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
	pub id: EntityId,
	pub kind: u16,
	pub position: Point3<f64>,
	pub state: Vec<u8>,
}

impl Entity {
	pub fn new(id: EntityId, kind: u16, position: Point3<f64>) -> Self {
		Self {
			id,
			kind,
			position,
			state: Vec::new(),
		}
	}
}

/// The secondary index of entity-id to entity for a single chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityMap(BTreeMap<EntityId, Entity>);

impl EntityMap {
	/// An id may only be owned by one chunk, so inserting one which is already present is rejected.
	pub fn insert(&mut self, entity: Entity) -> Result<(), Error> {
		if self.0.contains_key(&entity.id) {
			return Err(Error::DuplicateEntity(entity.id));
		}
		self.0.insert(entity.id, entity);
		Ok(())
	}

	pub fn remove(&mut self, id: EntityId) -> Result<Entity, Error> {
		self.0.remove(&id).ok_or(Error::MissingEntity(id))
	}

	pub fn get(&self, id: EntityId) -> Option<&Entity> {
		self.0.get(&id)
	}

	pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
		self.0.get_mut(&id)
	}

	pub fn contains(&self, id: EntityId) -> bool {
		self.0.contains_key(&id)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Entities in ascending id order.
	pub fn iter(&self) -> impl Iterator<Item = &Entity> {
		self.0.values()
	}
}

impl FromIterator<Entity> for EntityMap {
	fn from_iter<T: IntoIterator<Item = Entity>>(iter: T) -> Self {
		Self(iter.into_iter().map(|entity| (entity.id, entity)).collect())
	}
}

#[cfg(test)]
mod entity_map {
	use super::*;

	#[test]
	fn duplicate_insert_is_rejected() {
		let mut map = EntityMap::default();
		map.insert(Entity::new(7, 1, Point3::origin())).unwrap();
		let result = map.insert(Entity::new(7, 2, Point3::new(1.0, 0.0, 0.0)));
		assert!(matches!(result, Err(Error::DuplicateEntity(7))));
		assert_eq!(map.get(7).map(|e| e.kind), Some(1));
	}

	#[test]
	fn remove_missing() {
		let mut map = EntityMap::default();
		assert!(matches!(map.remove(3), Err(Error::MissingEntity(3))));
	}
}
