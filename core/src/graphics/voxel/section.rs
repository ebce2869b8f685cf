use crate::{
	common::world::{ColumnCoord, CHUNK_SIZE, SECTION_HEIGHT},
	graphics::voxel::SectionMesh,
};
use nalgebra::Point3;
use std::sync::Arc;

/// Identifies one 16-block-tall slice of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionKey {
	pub x: i64,
	pub y: i64,
	/// Section index counting up from z = 0.
	pub z: i64,
}

impl SectionKey {
	pub fn new(column: &ColumnCoord, section: i64) -> Self {
		Self {
			x: column.x,
			y: column.y,
			z: section,
		}
	}

	/// The section containing a world-space position.
	pub fn containing(position: &Point3<f64>) -> Self {
		let size = CHUNK_SIZE as f64;
		Self {
			x: (position.x / size).floor() as i64,
			y: (position.y / size).floor() as i64,
			z: (position.z / SECTION_HEIGHT as f64).floor() as i64,
		}
	}

	pub fn column(&self) -> ColumnCoord {
		ColumnCoord::new(self.x, self.y)
	}

	pub fn offset(&self, x: i64, y: i64, z: i64) -> Self {
		Self {
			x: self.x + x,
			y: self.y + y,
			z: self.z + z,
		}
	}

	/// World-space center of the section.
	pub fn center(&self) -> Point3<f64> {
		let size = CHUNK_SIZE as f64;
		let height = SECTION_HEIGHT as f64;
		Point3::new(
			(self.x as f64 + 0.5) * size,
			(self.y as f64 + 0.5) * size,
			(self.z as f64 + 0.5) * height,
		)
	}
}

/// Level of detail a section mesh was built at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lod {
	Near,
	/// Detail blocks (decorations) are left out.
	Far,
}

impl Lod {
	pub fn for_distance(distance: f64, threshold: f64) -> Self {
		match distance <= threshold {
			true => Self::Near,
			false => Self::Far,
		}
	}
}

/// Render bookkeeping for a single section.
#[derive(Debug, Clone)]
pub struct SectionState {
	pub mesh: Option<Arc<SectionMesh>>,
	/// The mesh (if any) no longer matches the voxels.
	pub dirty: bool,
	/// Every block in the section is opaque.
	pub solid: bool,
	/// Reached by the last visibility flood fill.
	pub visible: bool,
	/// Holds nothing but air, so there is nothing to mesh.
	pub culled: bool,
	pub lod: Lod,
	/// Bumped on every change to the section's voxels; a build started at an older version is stale.
	pub version: u64,
	/// A mesh build for this section has been handed to a worker and not yet published.
	pub in_flight: bool,
}

impl Default for SectionState {
	fn default() -> Self {
		Self {
			mesh: None,
			dirty: true,
			solid: false,
			visible: false,
			culled: false,
			lod: Lod::Near,
			version: 0,
			in_flight: false,
		}
	}
}

impl SectionState {
	fn discard(&mut self) {
		self.mesh = None;
		self.dirty = true;
	}
}

/// Per-section mesh cache and dirty tracking for one client chunk.
///
/// A section's mesh is dropped whenever its solidity, visibility or level of detail flips,
/// and is only rebuilt once the renderer next needs it.
#[derive(Debug, Clone, Default)]
pub struct RenderChunk {
	sections: Vec<SectionState>,
	/// Solidity/emptiness flags need recomputing from the voxels.
	pub flags_stale: bool,
}

impl RenderChunk {
	pub fn new(section_count: usize) -> Self {
		Self {
			sections: vec![SectionState::default(); section_count],
			flags_stale: true,
		}
	}

	pub fn section_count(&self) -> usize {
		self.sections.len()
	}

	pub fn section(&self, section: usize) -> Option<&SectionState> {
		self.sections.get(section)
	}

	pub fn sections(&self) -> impl Iterator<Item = (usize, &SectionState)> {
		self.sections.iter().enumerate()
	}

	/// The voxels of a section changed.
	pub fn mark_dirty(&mut self, section: usize) {
		if let Some(state) = self.sections.get_mut(section) {
			state.dirty = true;
			state.version += 1;
		}
		self.flags_stale = true;
	}

	pub fn mark_all_dirty(&mut self) {
		for section in 0..self.sections.len() {
			self.mark_dirty(section);
		}
	}

	/// Returns true if the solidity flipped.
	pub fn set_solid(&mut self, section: usize, solid: bool) -> bool {
		match self.sections.get_mut(section) {
			Some(state) if state.solid != solid => {
				state.solid = solid;
				state.discard();
				true
			}
			_ => false,
		}
	}

	pub fn set_culled(&mut self, section: usize, culled: bool) {
		if let Some(state) = self.sections.get_mut(section) {
			state.culled = culled;
		}
	}

	/// Returns true if the visibility flipped.
	pub fn set_visible(&mut self, section: usize, visible: bool) -> bool {
		match self.sections.get_mut(section) {
			Some(state) if state.visible != visible => {
				state.visible = visible;
				state.discard();
				true
			}
			_ => false,
		}
	}

	/// Returns true if the level of detail flipped.
	pub fn set_lod(&mut self, section: usize, lod: Lod) -> bool {
		match self.sections.get_mut(section) {
			Some(state) if state.lod != lod => {
				state.lod = lod;
				state.discard();
				true
			}
			_ => false,
		}
	}

	/// True when the section should be handed to a mesh worker.
	pub fn needs_build(&self, section: usize) -> bool {
		self.sections
			.get(section)
			.map(|state| state.visible && !state.culled && state.dirty && !state.in_flight)
			.unwrap_or(false)
	}

	/// Marks a build as started, returning the version it is being built against.
	pub fn begin_build(&mut self, section: usize) -> Option<(u64, Lod)> {
		let state = self.sections.get_mut(section)?;
		state.in_flight = true;
		Some((state.version, state.lod))
	}

	/// Publishes a finished mesh. A mesh built against an older version (or another level of detail)
	/// is thrown away and the section stays dirty; returns whether the mesh was kept.
	pub fn publish(&mut self, section: usize, version: u64, mesh: SectionMesh) -> bool {
		let state = match self.sections.get_mut(section) {
			Some(state) => state,
			None => return false,
		};
		state.in_flight = false;
		if state.version != version || state.lod != mesh.lod || !state.visible {
			state.dirty = true;
			return false;
		}
		state.mesh = Some(Arc::new(mesh));
		state.dirty = false;
		true
	}
}
