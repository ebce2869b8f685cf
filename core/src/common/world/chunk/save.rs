use super::{ChunkData, DelayedUpdate, Entity, State};
use crate::{
	block::LookupId,
	common::world::{ColumnCoord, Error},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The serialized form of a chunk, used both for persistence and as the `SendChunk` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
	pub coordinate: ColumnCoord,
	/// Whether population already ran; populated chunks resume at [`State::Populated`].
	pub populated: bool,
	pub height: usize,
	pub ids: Vec<LookupId>,
	pub data: Vec<u8>,
	pub light: Vec<u8>,
	pub metadata: BTreeMap<String, String>,
	/// Ascending by entity id.
	pub entities: Vec<Entity>,
	pub updates: Vec<DelayedUpdate>,
}

impl SaveData {
	pub fn new(
		coordinate: ColumnCoord,
		state: State,
		data: &ChunkData,
		updates: Vec<DelayedUpdate>,
	) -> Self {
		Self {
			coordinate,
			populated: state.is_populated(),
			height: data.height(),
			ids: data.ids().to_vec(),
			data: data.data_values().to_vec(),
			light: data.light().to_vec(),
			metadata: data.metadata.clone(),
			entities: data.entities.iter().cloned().collect(),
			updates,
		}
	}

	/// The state a chunk restored from this data starts in.
	pub fn state(&self) -> State {
		match self.populated {
			true => State::Populated,
			false => State::New,
		}
	}

	pub fn encode(&self) -> Result<Vec<u8>, Error> {
		bincode::serialize(self).map_err(Error::Encode)
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
		bincode::deserialize(bytes).map_err(Error::Decode)
	}

	/// Splits the save into the chunk's voxel data and its pending updates.
	pub fn into_data(self) -> Result<(ChunkData, Vec<DelayedUpdate>), Error> {
		let data = ChunkData::from_parts(
			self.height,
			self.ids,
			self.data,
			self.light,
			self.metadata,
			self.entities.into_iter().collect(),
		)?;
		Ok((data, self.updates))
	}
}

#[cfg(test)]
mod save_data {
	use super::*;
	use crate::{
		block::{Block, Lookup},
		common::world::BlockPoint,
	};
	use nalgebra::Point3;

	fn populated_chunk() -> ChunkData {
		let lookup = Lookup::classic();
		let mut data = ChunkData::new(32);
		{
			let mut buffers = data.buffers();
			for x in 0..16 {
				for y in 0..16 {
					buffers.set(x, y, 0, Block::new(1));
					buffers.set(x, y, 1, Block::with_data(3, (x + y) as u8));
				}
			}
		}
		data.set(&BlockPoint::new(8, 8, 2), Block::new(5)).unwrap();
		data.recompute_sunlight(&lookup);
		data.metadata.insert("biome".to_owned(), "plains".to_owned());
		data.entities
			.insert(Entity {
				id: 42,
				kind: 3,
				position: Point3::new(1.5, 2.5, 3.0),
				state: vec![1, 2, 3],
			})
			.unwrap();
		data.entities.insert(Entity::new(7, 1, Point3::new(9.0, 9.0, 2.0))).unwrap();
		data
	}

	#[test]
	fn round_trip_reproduces_chunk() {
		let data = populated_chunk();
		let updates = vec![
			DelayedUpdate::new(BlockPoint::new(3, 4, 5), 10, 2),
			DelayedUpdate::new(BlockPoint::new(-1, 4, 0), 1, 9),
		];
		let save = SaveData::new(ColumnCoord::new(3, 4), State::Sendable, &data, updates.clone());
		let bytes = save.encode().unwrap();
		let decoded = SaveData::decode(&bytes).unwrap();
		assert_eq!(decoded, save);
		assert_eq!(decoded.state(), State::Populated);

		let (restored, restored_updates) = decoded.into_data().unwrap();
		assert_eq!(restored.ids(), data.ids());
		assert_eq!(restored.data_values(), data.data_values());
		assert_eq!(restored.light(), data.light());
		assert_eq!(restored.entities, data.entities);
		assert_eq!(restored.metadata, data.metadata);
		assert_eq!(restored_updates, updates);
		assert_eq!(restored.height_at(8, 8), 3);
	}

	#[test]
	fn unpopulated_restarts_as_new() {
		let save = SaveData::new(ColumnCoord::new(0, 0), State::ShouldPopulate, &ChunkData::new(16), vec![]);
		assert_eq!(save.state(), State::New);
	}

	#[test]
	fn truncated_bytes_fail() {
		let save = SaveData::new(ColumnCoord::new(0, 0), State::New, &ChunkData::new(16), vec![]);
		let bytes = save.encode().unwrap();
		assert!(matches!(SaveData::decode(&bytes[..bytes.len() / 2]), Err(Error::Decode(_))));
	}
}
