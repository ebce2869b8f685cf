use crate::{
	block::{Block, Lookup},
	common::world::{chunk::ChunkData, ColumnCoord, CHUNK_SIZE, SECTION_HEIGHT},
	graphics::voxel::{Face, Lod, SectionKey},
};
use enumset::EnumSet;
use nalgebra::{Point3, Vector3};

/// Edge length of a snapshot: one section plus a one-block border on every side.
const PADDED: usize = CHUNK_SIZE + 2;
const PADDED_LAYER: usize = PADDED * PADDED;

/// A single emitted block face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quad {
	/// World-space block coordinate the face belongs to.
	pub position: Point3<i64>,
	pub face: Face,
	pub block: Block,
	/// Light level of the cell the face looks into.
	pub light: u8,
}

/// Axis-aligned world-space box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
	pub min: Point3<f32>,
	pub max: Point3<f32>,
}

impl Bounds {
	fn of_block(position: &Point3<i64>) -> Self {
		let min = position.map(|v| v as f32);
		Self {
			min,
			max: min + Vector3::new(1.0, 1.0, 1.0),
		}
	}

	fn include(&mut self, other: &Bounds) {
		self.min = self.min.inf(&other.min);
		self.max = self.max.sup(&other.max);
	}

	pub fn center(&self) -> Point3<f32> {
		nalgebra::center(&self.min, &self.max)
	}
}

/// Faces of one render pass, with the box enclosing all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
	pub quads: Vec<Quad>,
	pub bounds: Option<Bounds>,
}

impl Batch {
	fn push(&mut self, quad: Quad) {
		let bounds = Bounds::of_block(&quad.position);
		match &mut self.bounds {
			Some(existing) => existing.include(&bounds),
			None => self.bounds = Some(bounds),
		}
		self.quads.push(quad);
	}

	pub fn is_empty(&self) -> bool {
		self.quads.is_empty()
	}

	pub fn len(&self) -> usize {
		self.quads.len()
	}
}

/// The geometry for one section at one level of detail.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMesh {
	pub key: SectionKey,
	pub lod: Lod,
	pub opaque: Batch,
	/// Translucent faces, drawn after every opaque batch.
	pub translucent: Batch,
}

impl SectionMesh {
	pub fn empty(key: SectionKey, lod: Lod) -> Self {
		Self {
			key,
			lod,
			opaque: Batch::default(),
			translucent: Batch::default(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.opaque.is_empty() && self.translucent.is_empty()
	}

	pub fn quad_count(&self) -> usize {
		self.opaque.len() + self.translucent.len()
	}
}

/// A copy of one section's blocks plus the one-block border around it,
/// taken under the chunk read locks so meshing can run without holding any.
#[derive(Clone)]
pub struct Snapshot {
	key: SectionKey,
	/// `None` marks cells below z = 0.
	blocks: Vec<Option<Block>>,
	light: Vec<u8>,
}

impl std::fmt::Debug for Snapshot {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "Snapshot({:?})", self.key)
	}
}

fn padded_index(x: i64, y: i64, z: i64) -> usize {
	(x + 1) as usize + (y + 1) as usize * PADDED + (z + 1) as usize * PADDED_LAYER
}

impl Snapshot {
	/// Copies the section from `chunks`, which should hold the section's column and its neighbours.
	/// Cells in columns that are not provided read as air.
	#[profiling::function]
	pub fn capture(key: SectionKey, chunks: &[(ColumnCoord, &ChunkData)]) -> Self {
		let mut blocks = vec![Some(Block::AIR); PADDED_LAYER * PADDED];
		let mut light = vec![0; PADDED_LAYER * PADDED];
		let size = CHUNK_SIZE as i64;
		let base_z = key.z * SECTION_HEIGHT as i64;
		for (column, data) in chunks.iter() {
			let offset_x = (column.x - key.x) * size;
			let offset_y = (column.y - key.y) * size;
			if offset_x.abs() > size || offset_y.abs() > size {
				continue;
			}
			for z in -1..=(SECTION_HEIGHT as i64) {
				let world_z = base_z + z;
				for y in -1..=size {
					let local_y = y - offset_y;
					if local_y < 0 || local_y >= size {
						continue;
					}
					for x in -1..=size {
						let local_x = x - offset_x;
						if local_x < 0 || local_x >= size {
							continue;
						}
						let i = padded_index(x, y, z);
						if world_z < 0 {
							blocks[i] = None;
							continue;
						}
						let (lx, ly, lz) = (local_x as usize, local_y as usize, world_z as usize);
						blocks[i] = Some(data.block(lx, ly, lz));
						light[i] = data.light_at(lx, ly, lz);
					}
				}
			}
		}
		if base_z == 0 {
			for i in 0..PADDED_LAYER {
				blocks[i] = None;
			}
		}
		Self { key, blocks, light }
	}

	pub fn key(&self) -> &SectionKey {
		&self.key
	}

	/// The block at a section-local offset, each axis in `-1..=16`.
	/// `None` marks the void below the world.
	pub fn block(&self, x: i64, y: i64, z: i64) -> Option<Block> {
		self.blocks[padded_index(x, y, z)]
	}

	pub fn light(&self, x: i64, y: i64, z: i64) -> u8 {
		self.light[padded_index(x, y, z)]
	}
}

/// Per-worker scratch space for building section meshes.
/// Each build sizes the next one's output after its own.
#[derive(Default)]
pub struct MeshBuilder {
	opaque: Batch,
	translucent: Batch,
}

impl MeshBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Walks every voxel of the section and emits each face whose neighbour has a strictly lower
	/// connect stage. Far meshes leave out detail blocks, which then also stop hiding faces.
	#[profiling::function]
	pub fn build(&mut self, snapshot: &Snapshot, lookup: &Lookup, lod: Lod) -> SectionMesh {
		let key = snapshot.key;
		let origin = Point3::new(
			key.x * CHUNK_SIZE as i64,
			key.y * CHUNK_SIZE as i64,
			key.z * SECTION_HEIGHT as i64,
		);
		let stage_of = |block: &Block| {
			let material = lookup.material(block.id);
			match lod == Lod::Far && material.detail {
				true => 0,
				false => material.connect_stage,
			}
		};

		for z in 0..SECTION_HEIGHT as i64 {
			for y in 0..CHUNK_SIZE as i64 {
				for x in 0..CHUNK_SIZE as i64 {
					let block = match snapshot.block(x, y, z) {
						Some(block) if !block.is_air() => block,
						_ => continue,
					};
					let material = lookup.material(block.id);
					if lod == Lod::Far && material.detail {
						continue;
					}
					let stage = stage_of(&block);
					let position = origin + Vector3::new(x, y, z);
					for face in EnumSet::<Face>::all().iter() {
						let step = face.direction();
						let (nx, ny, nz) = (x + step.x, y + step.y, z + step.z);
						let neighbor = match snapshot.block(nx, ny, nz) {
							Some(neighbor) => neighbor,
							None => continue,
						};
						if stage_of(&neighbor) >= stage {
							continue;
						}
						let quad = Quad {
							position,
							face,
							block,
							light: snapshot.light(nx, ny, nz),
						};
						match material.translucent {
							true => self.translucent.push(quad),
							false => self.opaque.push(quad),
						}
					}
				}
			}
		}

		SectionMesh {
			key,
			lod,
			opaque: take_batch(&mut self.opaque),
			translucent: take_batch(&mut self.translucent),
		}
	}
}

fn take_batch(batch: &mut Batch) -> Batch {
	let capacity = batch.quads.len();
	Batch {
		quads: std::mem::replace(&mut batch.quads, Vec::with_capacity(capacity)),
		bounds: batch.bounds.take(),
	}
}

#[cfg(test)]
mod mesh_builder {
	use super::*;

	fn column(fill: impl Fn(&mut ChunkData)) -> ChunkData {
		let mut data = ChunkData::new(32);
		fill(&mut data);
		data
	}

	fn set(data: &mut ChunkData, x: i64, y: i64, z: i64, block: Block) {
		data.set(&Point3::new(x, y, z), block).unwrap();
	}

	fn build(data: &ChunkData, section: i64, lod: Lod) -> SectionMesh {
		let key = SectionKey::new(&ColumnCoord::new(0, 0), section);
		let snapshot = Snapshot::capture(key, &[(ColumnCoord::new(0, 0), data)]);
		MeshBuilder::new().build(&snapshot, &Lookup::classic(), lod)
	}

	#[test]
	fn lone_block_has_five_faces_at_floor() {
		let lookup = Lookup::classic();
		let stone = Block::new(lookup.lookup_value("stone").unwrap());
		let data = column(|data| set(data, 4, 4, 0, stone));
		let mesh = build(&data, 0, Lod::Near);
		// the face towards the void below the world is skipped
		assert_eq!(mesh.opaque.len(), 5);
		assert!(mesh.translucent.is_empty());
		let bounds = mesh.opaque.bounds.unwrap();
		assert_eq!(bounds.min, Point3::new(4.0, 4.0, 0.0));
		assert_eq!(bounds.max, Point3::new(5.0, 5.0, 1.0));
	}

	#[test]
	fn shared_faces_between_opaque_blocks_are_culled() {
		let lookup = Lookup::classic();
		let stone = Block::new(lookup.lookup_value("stone").unwrap());
		let data = column(|data| {
			set(data, 4, 4, 3, stone);
			set(data, 5, 4, 3, stone);
		});
		assert_eq!(build(&data, 0, Lod::Near).opaque.len(), 10);
	}

	#[test]
	fn equal_translucent_stages_hide_each_other() {
		let lookup = Lookup::classic();
		let stone = Block::new(lookup.lookup_value("stone").unwrap());
		let glass = Block::new(lookup.lookup_value("glass").unwrap());
		let data = column(|data| {
			set(data, 4, 4, 3, glass);
			set(data, 5, 4, 3, glass);
			set(data, 4, 5, 3, stone);
		});
		let mesh = build(&data, 0, Lod::Near);
		// glass emits against air only; the stone emits towards the glass
		assert_eq!(mesh.translucent.len(), 9);
		assert_eq!(mesh.opaque.len(), 6);
	}

	#[test]
	fn far_meshes_drop_detail() {
		let lookup = Lookup::classic();
		let flower = Block::new(lookup.lookup_value("flower").unwrap());
		let data = column(|data| set(data, 4, 4, 20, flower));
		assert_eq!(build(&data, 1, Lod::Near).opaque.len(), 6);
		assert!(build(&data, 1, Lod::Far).is_empty());
	}

	#[test]
	fn border_blocks_read_from_the_next_section() {
		let lookup = Lookup::classic();
		let stone = Block::new(lookup.lookup_value("stone").unwrap());
		let data = column(|data| {
			set(data, 4, 4, 15, stone);
			set(data, 4, 4, 16, stone);
		});
		assert_eq!(build(&data, 0, Lod::Near).opaque.len(), 5);
		assert_eq!(build(&data, 1, Lod::Near).opaque.len(), 5);
	}

	#[test]
	fn neighbor_column_hides_border_face() {
		let lookup = Lookup::classic();
		let stone = Block::new(lookup.lookup_value("stone").unwrap());
		let center = column(|data| set(data, 15, 4, 3, stone));
		let east = column(|data| set(data, 0, 4, 3, stone));
		let key = SectionKey::new(&ColumnCoord::new(0, 0), 0);
		let snapshot = Snapshot::capture(
			key,
			&[
				(ColumnCoord::new(0, 0), &center),
				(ColumnCoord::new(1, 0), &east),
			],
		);
		let mesh = MeshBuilder::new().build(&snapshot, &lookup, Lod::Near);
		assert_eq!(mesh.opaque.len(), 5);
		assert!(mesh.opaque.quads.iter().all(|quad| quad.face != Face::Right));
	}
}
