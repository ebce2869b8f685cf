use super::EntityMap;
use crate::{
	block::{Block, Lookup, LookupId, AIR},
	common::world::{BlockPoint, Error, CHUNK_SIZE, SECTION_HEIGHT},
};
use std::collections::{BTreeMap, VecDeque};

/// Brightest light level; what open sky provides.
pub const MAX_LIGHT: u8 = 15;

const LAYER: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Dense voxel arrays for one column, indexed `x + y * 16 + z * 256`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkData {
	height: usize,
	ids: Vec<LookupId>,
	data: Vec<u8>,
	light: Vec<u8>,
	/// Per `(x, y)`: one above the highest non-air block, 0 for an empty column.
	height_map: Vec<u16>,
	/// Free-form per-chunk values persisted alongside the voxels.
	pub metadata: BTreeMap<String, String>,
	pub entities: EntityMap,
}

/// The mutable id/data arrays handed to a world generator.
pub struct Buffers<'a> {
	height: usize,
	ids: &'a mut [LookupId],
	data: &'a mut [u8],
}

impl<'a> Buffers<'a> {
	pub fn height(&self) -> usize {
		self.height
	}

	/// Writes a block at a local offset, returning false if the offset is outside the column.
	pub fn set(&mut self, x: usize, y: usize, z: usize, block: Block) -> bool {
		match index(self.height, x, y, z) {
			Some(i) => {
				self.ids[i] = block.id;
				self.data[i] = block.data;
				true
			}
			None => false,
		}
	}

	pub fn get(&self, x: usize, y: usize, z: usize) -> Block {
		match index(self.height, x, y, z) {
			Some(i) => Block::with_data(self.ids[i], self.data[i]),
			None => Block::AIR,
		}
	}
}

fn index(height: usize, x: usize, y: usize, z: usize) -> Option<usize> {
	(x < CHUNK_SIZE && y < CHUNK_SIZE && z < height).then(|| x + y * CHUNK_SIZE + z * LAYER)
}

fn local_index(height: usize, point: &BlockPoint) -> Result<usize, Error> {
	if point.x < 0 || point.y < 0 || point.z < 0 {
		return Err(Error::PointOutOfBounds(*point));
	}
	index(height, point.x as usize, point.y as usize, point.z as usize)
		.ok_or(Error::PointOutOfBounds(*point))
}

impl ChunkData {
	/// An all-air column. The height is rounded up to a whole number of sections.
	pub fn new(height: usize) -> Self {
		let sections = ((height + SECTION_HEIGHT - 1) / SECTION_HEIGHT).max(1);
		let height = sections * SECTION_HEIGHT;
		let volume = LAYER * height;
		Self {
			height,
			ids: vec![AIR; volume],
			data: vec![0; volume],
			light: vec![0; volume],
			height_map: vec![0; LAYER],
			metadata: BTreeMap::new(),
			entities: EntityMap::default(),
		}
	}

	/// Rebuilds a column from its serialized arrays, validating their sizes.
	pub fn from_parts(
		height: usize,
		ids: Vec<LookupId>,
		data: Vec<u8>,
		light: Vec<u8>,
		metadata: BTreeMap<String, String>,
		entities: EntityMap,
	) -> Result<Self, Error> {
		if height == 0 || height % SECTION_HEIGHT != 0 {
			return Err(Error::MalformedSaveData(format!(
				"height {} is not a whole number of sections",
				height
			)));
		}
		let volume = LAYER * height;
		for (name, len) in [("ids", ids.len()), ("data", data.len()), ("light", light.len())] {
			if len != volume {
				return Err(Error::MalformedSaveData(format!(
					"{} has {} entries, expected {}",
					name, len, volume
				)));
			}
		}
		let mut chunk = Self {
			height,
			ids,
			data,
			light,
			height_map: vec![0; LAYER],
			metadata,
			entities,
		};
		chunk.recompute_height_map();
		Ok(chunk)
	}

	pub fn height(&self) -> usize {
		self.height
	}

	pub fn section_count(&self) -> usize {
		self.height / SECTION_HEIGHT
	}

	pub fn ids(&self) -> &[LookupId] {
		&self.ids
	}

	pub fn data_values(&self) -> &[u8] {
		&self.data
	}

	pub fn light(&self) -> &[u8] {
		&self.light
	}

	pub fn buffers(&mut self) -> Buffers<'_> {
		Buffers {
			height: self.height,
			ids: &mut self.ids,
			data: &mut self.data,
		}
	}

	pub fn block_at(&self, local: &BlockPoint) -> Result<Block, Error> {
		let i = local_index(self.height, local)?;
		Ok(Block::with_data(self.ids[i], self.data[i]))
	}

	/// Unchecked-by-error lookup for hot loops; anything outside the column reads as air.
	pub fn block(&self, x: usize, y: usize, z: usize) -> Block {
		match index(self.height, x, y, z) {
			Some(i) => Block::with_data(self.ids[i], self.data[i]),
			None => Block::AIR,
		}
	}

	pub fn light_at(&self, x: usize, y: usize, z: usize) -> u8 {
		match index(self.height, x, y, z) {
			Some(i) => self.light[i],
			None if z >= self.height => MAX_LIGHT,
			None => 0,
		}
	}

	pub fn height_at(&self, x: usize, y: usize) -> u16 {
		self.height_map.get(x + y * CHUNK_SIZE).copied().unwrap_or(0)
	}

	/// Writes a block at a local offset, returning the block it replaced.
	/// The height map for the column is kept current.
	pub fn set(&mut self, local: &BlockPoint, block: Block) -> Result<Block, Error> {
		let i = local_index(self.height, local)?;
		let previous = Block::with_data(self.ids[i], self.data[i]);
		self.ids[i] = block.id;
		self.data[i] = block.data;
		self.recompute_height_column(local.x as usize, local.y as usize);
		Ok(previous)
	}

	/// True when every block in the section is opaque.
	pub fn is_section_solid(&self, section: usize, lookup: &Lookup) -> bool {
		self.section_ids(section)
			.map(|ids| ids.iter().all(|id| lookup.is_opaque(*id)))
			.unwrap_or(false)
	}

	/// True when the section holds nothing but air (or does not exist).
	pub fn is_section_empty(&self, section: usize) -> bool {
		self.section_ids(section)
			.map(|ids| ids.iter().all(|id| *id == AIR))
			.unwrap_or(true)
	}

	fn section_ids(&self, section: usize) -> Option<&[LookupId]> {
		let start = section * SECTION_HEIGHT * LAYER;
		let end = start + SECTION_HEIGHT * LAYER;
		self.ids.get(start..end)
	}

	pub fn recompute_height_map(&mut self) {
		for y in 0..CHUNK_SIZE {
			for x in 0..CHUNK_SIZE {
				self.recompute_height_column(x, y);
			}
		}
	}

	fn recompute_height_column(&mut self, x: usize, y: usize) {
		let top = (0..self.height)
			.rev()
			.find(|&z| self.ids[x + y * CHUNK_SIZE + z * LAYER] != AIR)
			.map(|z| z + 1)
			.unwrap_or(0);
		self.height_map[x + y * CHUNK_SIZE] = top as u16;
	}

	/// Recomputes sky light for the column: every block with open sky above it is fully lit,
	/// then light spreads to non-opaque blocks losing one level per step.
	///
	/// Light does not cross column borders.
	#[profiling::function]
	pub fn recompute_sunlight(&mut self, lookup: &Lookup) {
		self.light.iter_mut().for_each(|light| *light = 0);

		let mut queue = VecDeque::new();
		for y in 0..CHUNK_SIZE {
			for x in 0..CHUNK_SIZE {
				for z in (0..self.height).rev() {
					let i = x + y * CHUNK_SIZE + z * LAYER;
					if lookup.is_opaque(self.ids[i]) {
						break;
					}
					self.light[i] = MAX_LIGHT;
					queue.push_back((x, y, z));
				}
			}
		}

		while let Some((x, y, z)) = queue.pop_front() {
			let level = self.light[x + y * CHUNK_SIZE + z * LAYER];
			if level <= 1 {
				continue;
			}
			let steps = [
				(x.wrapping_sub(1), y, z),
				(x + 1, y, z),
				(x, y.wrapping_sub(1), z),
				(x, y + 1, z),
				(x, y, z.wrapping_sub(1)),
				(x, y, z + 1),
			];
			for (nx, ny, nz) in steps {
				let i = match index(self.height, nx, ny, nz) {
					Some(i) => i,
					None => continue,
				};
				if lookup.is_opaque(self.ids[i]) || self.light[i] >= level - 1 {
					continue;
				}
				self.light[i] = level - 1;
				queue.push_back((nx, ny, nz));
			}
		}
	}
}

#[cfg(test)]
mod chunk_data {
	use super::*;

	fn floor(height: usize, floor_z: usize, id: LookupId) -> ChunkData {
		let mut chunk = ChunkData::new(height);
		let mut buffers = chunk.buffers();
		for y in 0..CHUNK_SIZE {
			for x in 0..CHUNK_SIZE {
				for z in 0..=floor_z {
					buffers.set(x, y, z, Block::new(id));
				}
			}
		}
		chunk.recompute_height_map();
		chunk
	}

	#[test]
	fn height_rounds_to_sections() {
		assert_eq!(ChunkData::new(20).height(), 32);
		assert_eq!(ChunkData::new(0).height(), 16);
		assert_eq!(ChunkData::new(48).section_count(), 3);
	}

	#[test]
	fn set_returns_previous_and_tracks_height() {
		let mut chunk = ChunkData::new(32);
		let point = BlockPoint::new(3, 4, 20);
		assert_eq!(chunk.set(&point, Block::with_data(5, 2)).unwrap(), Block::AIR);
		assert_eq!(chunk.height_at(3, 4), 21);
		assert_eq!(chunk.set(&point, Block::AIR).unwrap(), Block::with_data(5, 2));
		assert_eq!(chunk.height_at(3, 4), 0);
	}

	#[test]
	fn out_of_bounds() {
		let mut chunk = ChunkData::new(16);
		assert!(chunk.set(&BlockPoint::new(16, 0, 0), Block::new(1)).is_err());
		assert!(chunk.block_at(&BlockPoint::new(0, -1, 0)).is_err());
		assert_eq!(chunk.block(0, 0, 99), Block::AIR);
	}

	#[test]
	fn section_solidity() {
		let lookup = Lookup::classic();
		let stone = lookup.lookup_value("stone").unwrap();
		let chunk = floor(32, 15, stone);
		assert!(chunk.is_section_solid(0, &lookup));
		assert!(!chunk.is_section_solid(1, &lookup));
		assert!(chunk.is_section_empty(1));
		assert!(!chunk.is_section_empty(0));
	}

	#[test]
	fn sunlight_stops_at_opaque() {
		let lookup = Lookup::classic();
		let stone = lookup.lookup_value("stone").unwrap();
		let mut chunk = floor(32, 4, stone);
		chunk.recompute_sunlight(&lookup);
		assert_eq!(chunk.light_at(0, 0, 5), MAX_LIGHT);
		assert_eq!(chunk.light_at(0, 0, 31), MAX_LIGHT);
		assert_eq!(chunk.light_at(0, 0, 4), 0);
	}

	#[test]
	fn sunlight_spreads_under_overhang() {
		let lookup = Lookup::classic();
		let stone = lookup.lookup_value("stone").unwrap();
		let mut chunk = floor(32, 0, stone);
		// roof over x in 0..8 at z = 10
		for y in 0..CHUNK_SIZE {
			for x in 0..8 {
				chunk.set(&BlockPoint::new(x, y as i64, 10), Block::new(stone)).unwrap();
			}
		}
		chunk.recompute_sunlight(&lookup);
		assert_eq!(chunk.light_at(8, 0, 5), MAX_LIGHT);
		assert_eq!(chunk.light_at(7, 0, 5), MAX_LIGHT - 1);
		assert_eq!(chunk.light_at(5, 0, 5), MAX_LIGHT - 3);
	}

	#[test]
	fn from_parts_validates() {
		let chunk = ChunkData::new(16);
		let rebuilt = ChunkData::from_parts(
			16,
			chunk.ids().to_vec(),
			chunk.data_values().to_vec(),
			chunk.light().to_vec(),
			BTreeMap::new(),
			EntityMap::default(),
		)
		.unwrap();
		assert_eq!(rebuilt, chunk);
		let short = ChunkData::from_parts(
			16,
			vec![0; 10],
			chunk.data_values().to_vec(),
			chunk.light().to_vec(),
			BTreeMap::new(),
			EntityMap::default(),
		);
		assert!(matches!(short, Err(Error::MalformedSaveData(_))));
	}
}
